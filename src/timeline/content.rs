// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Timeline content payloads.
//!
//! Content is discriminated by its `type` field. HTTP request content uses
//! the method name as the discriminator (`GET`, `POST`, `PUT`, `DELETE`);
//! video-server clips use `QUANTEL_CLIP`.

use serde::{Deserialize, Serialize};

use crate::http::HttpMethod;

/// Content payload of a resolved timeline object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TimelineContent {
    /// An HTTP GET request.
    #[serde(rename = "GET")]
    Get(HttpRequestContent),
    /// An HTTP POST request.
    #[serde(rename = "POST")]
    Post(HttpRequestContent),
    /// An HTTP PUT request.
    #[serde(rename = "PUT")]
    Put(HttpRequestContent),
    /// An HTTP DELETE request.
    #[serde(rename = "DELETE")]
    Delete(HttpRequestContent),
    /// A clip on a video-server port.
    #[serde(rename = "QUANTEL_CLIP")]
    QuantelClip(QuantelClipContent),
}

impl TimelineContent {
    /// Returns the HTTP method and request content, if this is HTTP content.
    #[must_use]
    pub fn http_request(&self) -> Option<(HttpMethod, &HttpRequestContent)> {
        match self {
            Self::Get(c) => Some((HttpMethod::Get, c)),
            Self::Post(c) => Some((HttpMethod::Post, c)),
            Self::Put(c) => Some((HttpMethod::Put, c)),
            Self::Delete(c) => Some((HttpMethod::Delete, c)),
            Self::QuantelClip(_) => None,
        }
    }

    /// Returns the clip content, if this is video-server content.
    #[must_use]
    pub fn quantel_clip(&self) -> Option<&QuantelClipContent> {
        match self {
            Self::QuantelClip(c) => Some(c),
            _ => None,
        }
    }
}

/// An HTTP request to fire when the layer becomes active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestContent {
    /// The request URL.
    pub url: String,
    /// JSON parameters: query string for GET/DELETE, body for POST/PUT.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Dispatch ordering bias within one transition; lower fires first.
    #[serde(default)]
    pub temporal_priority: Option<i64>,
    /// Serialization group: requests sharing a queue id fire in order.
    #[serde(default)]
    pub queue_id: Option<String>,
}

impl HttpRequestContent {
    /// Creates request content for a URL with no parameters.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: serde_json::Value::Null,
            temporal_priority: None,
            queue_id: None,
        }
    }

    /// Sets the JSON parameters.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Sets the temporal priority.
    #[must_use]
    pub fn with_temporal_priority(mut self, priority: i64) -> Self {
        self.temporal_priority = Some(priority);
        self
    }

    /// Sets the serialization queue id.
    #[must_use]
    pub fn with_queue_id(mut self, queue_id: impl Into<String>) -> Self {
        self.queue_id = Some(queue_id.into());
        self
    }
}

/// A clip scheduled onto a video-server port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantelClipContent {
    /// Clip title, resolved to a clip id on the server.
    #[serde(default)]
    pub title: Option<String>,
    /// Clip GUID, resolved to a clip id on the server.
    #[serde(default)]
    pub guid: Option<String>,
    /// Whether the clip plays or holds its frame.
    #[serde(default)]
    pub playing: bool,
    /// Playback origin override; defaults to the object's resolved start.
    #[serde(default)]
    pub play_time: Option<i64>,
    /// When a paused clip was paused, in milliseconds.
    #[serde(default)]
    pub pause_time: Option<i64>,
    /// In point within the clip, in milliseconds.
    #[serde(default)]
    pub in_point: Option<i64>,
    /// Out point within the clip, in milliseconds.
    #[serde(default)]
    pub out_point: Option<i64>,
    /// Playback rate override, frames per second.
    #[serde(default)]
    pub fps: Option<f64>,
}

impl QuantelClipContent {
    /// Creates clip content referenced by title.
    #[must_use]
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            guid: None,
            playing: false,
            play_time: None,
            pause_time: None,
            in_point: None,
            out_point: None,
            fps: None,
        }
    }

    /// Creates clip content referenced by GUID.
    #[must_use]
    pub fn with_guid(guid: impl Into<String>) -> Self {
        Self {
            title: None,
            guid: Some(guid.into()),
            playing: false,
            play_time: None,
            pause_time: None,
            in_point: None,
            out_point: None,
            fps: None,
        }
    }

    /// Returns the clip reference, preferring the GUID when both are set.
    #[must_use]
    pub fn reference(&self) -> Option<ClipRef> {
        if let Some(guid) = &self.guid {
            return Some(ClipRef::Guid(guid.clone()));
        }
        self.title.clone().map(ClipRef::Title)
    }
}

/// How a clip is identified on the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClipRef {
    /// Lookup by clip title.
    Title(String),
    /// Lookup by clip GUID.
    Guid(String),
}

impl std::fmt::Display for ClipRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Title(t) => write!(f, "title:{t}"),
            Self::Guid(g) => write!(f, "guid:{g}"),
        }
    }
}

/// Control-mode selector for video-server transitions.
///
/// Quality stages jumps ahead of time for clean transitions; Speed issues
/// immediate jumps for minimum latency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    /// Bias toward clean transitions (staged soft jumps).
    #[default]
    Quality,
    /// Bias toward minimum latency (immediate hard jumps).
    Speed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_content_discriminated_by_method() {
        let json = r#"{ "type": "GET", "url": "http://host/a" }"#;
        let content: TimelineContent = serde_json::from_str(json).unwrap();
        let (method, request) = content.http_request().unwrap();
        assert_eq!(method, HttpMethod::Get);
        assert_eq!(request.url, "http://host/a");
        assert!(request.params.is_null());
    }

    #[test]
    fn clip_content_discriminated_by_type() {
        let json = r#"{ "type": "QUANTEL_CLIP", "title": "NEWS", "playing": true }"#;
        let content: TimelineContent = serde_json::from_str(json).unwrap();
        let clip = content.quantel_clip().unwrap();
        assert_eq!(clip.title.as_deref(), Some("NEWS"));
        assert!(clip.playing);
        assert!(content.http_request().is_none());
    }

    #[test]
    fn clip_reference_prefers_guid() {
        let mut clip = QuantelClipContent::with_title("NEWS");
        clip.guid = Some("abc-123".to_string());
        assert_eq!(clip.reference(), Some(ClipRef::Guid("abc-123".to_string())));
    }

    #[test]
    fn clip_without_identity_has_no_reference() {
        let mut clip = QuantelClipContent::with_title("NEWS");
        clip.title = None;
        assert!(clip.reference().is_none());
    }

    #[test]
    fn content_roundtrips_through_json() {
        let content = TimelineContent::Post(
            HttpRequestContent::new("http://host/cue")
                .with_params(serde_json::json!({ "take": 1 }))
                .with_queue_id("main"),
        );

        let json = serde_json::to_string(&content).unwrap();
        let back: TimelineContent = serde_json::from_str(&json).unwrap();
        assert_eq!(content, back);
    }
}
