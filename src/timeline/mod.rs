// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resolved timeline snapshots and layer mappings.
//!
//! A [`TimelineSnapshot`] is the engine's input: the state of all timeline
//! layers at one absolute time, as produced by an upstream resolver. The
//! snapshot is device-agnostic; each device projects only the layers whose
//! [`Mapping`](mapping::Mapping) points at it.

mod content;
pub mod mapping;

pub use content::{ClipRef, ControlMode, HttpRequestContent, QuantelClipContent, TimelineContent};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The resolved state of all timeline layers at one point in time.
///
/// Layer iteration order is deterministic (sorted by layer id), which keeps
/// projection and diffing deterministic across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSnapshot {
    /// The absolute time this snapshot describes, in milliseconds.
    pub time: i64,
    /// Content per layer id.
    pub layers: BTreeMap<String, ResolvedObject>,
    /// Upcoming change points, soonest first.
    #[serde(default)]
    pub next_events: Vec<NextEvent>,
}

impl TimelineSnapshot {
    /// Creates an empty snapshot at the given time.
    #[must_use]
    pub fn empty(time: i64) -> Self {
        Self {
            time,
            layers: BTreeMap::new(),
            next_events: Vec::new(),
        }
    }
}

/// A timeline object resolved onto a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedObject {
    /// The timeline object id.
    pub id: String,
    /// The resolved time window.
    pub instance: Instance,
    /// The content payload, discriminated by its `type` field.
    pub content: TimelineContent,
    /// Whether this object is a lookahead (preview-next) for another layer.
    #[serde(default)]
    pub is_lookahead: bool,
    /// The layer this lookahead previews, when [`is_lookahead`](Self::is_lookahead) is set.
    #[serde(default)]
    pub lookahead_for_layer: Option<String>,
}

/// The resolved start/end of a timeline object instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Start time in milliseconds.
    pub start: i64,
    /// End time in milliseconds, `None` for open-ended objects.
    #[serde(default)]
    pub end: Option<i64>,
}

/// A future point at which the timeline changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextEvent {
    /// When the change happens, in milliseconds.
    pub time: i64,
    /// Whether an object starts or ends.
    pub kind: NextEventKind,
    /// The object that changes.
    pub obj_id: String,
}

/// The kind of change a [`NextEvent`] announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextEventKind {
    /// An object becomes active.
    Start,
    /// An object stops being active.
    End,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_has_no_layers() {
        let snapshot = TimelineSnapshot::empty(1000);
        assert_eq!(snapshot.time, 1000);
        assert!(snapshot.layers.is_empty());
        assert!(snapshot.next_events.is_empty());
    }

    #[test]
    fn resolved_object_deserializes_http_content() {
        let json = r#"{
            "id": "o1",
            "instance": { "start": 1000 },
            "content": { "type": "POST", "url": "http://x", "params": { "a": 1 } }
        }"#;

        let obj: ResolvedObject = serde_json::from_str(json).unwrap();
        assert_eq!(obj.id, "o1");
        assert_eq!(obj.instance.start, 1000);
        assert!(!obj.is_lookahead);
        let (_, content) = obj.content.http_request().unwrap();
        assert_eq!(content.url, "http://x");
    }

    #[test]
    fn layer_iteration_is_sorted() {
        let mut snapshot = TimelineSnapshot::empty(0);
        for id in ["zeta", "alpha", "mid"] {
            snapshot.layers.insert(
                id.to_string(),
                ResolvedObject {
                    id: format!("obj_{id}"),
                    instance: Instance {
                        start: 0,
                        end: None,
                    },
                    content: TimelineContent::Get(HttpRequestContent::new("http://x")),
                    is_lookahead: false,
                    lookahead_for_layer: None,
                },
            );
        }

        let order: Vec<&str> = snapshot.layers.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["alpha", "mid", "zeta"]);
    }
}
