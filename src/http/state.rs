// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State shape, projection and diffing for the HTTP send device.
//!
//! The device state is simply the set of requests that should have been
//! fired for the currently-active layers. The differ emits a command per
//! added or changed layer; a removed layer only clears the executor's
//! fingerprint, nothing is sent.

use std::collections::BTreeMap;

use crate::error::ProjectionError;
use crate::event::CommandReport;
use crate::resolve::{temporal_order, TimedCommand};
use crate::timeline::mapping::{DeviceKind, MappingTable};
use crate::timeline::{HttpRequestContent, TimelineSnapshot};

use super::HttpMethod;

/// Projected state of the HTTP send device: one request per active layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpSendState {
    /// Requests keyed by layer id.
    pub layers: BTreeMap<String, HttpSendLayer>,
}

/// The request one layer wants fired.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSendLayer {
    /// The request method.
    pub method: HttpMethod,
    /// The request content.
    pub content: HttpRequestContent,
    /// The timeline object that put it there.
    pub timeline_obj_id: String,
}

/// What a command does to its layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpCommandKind {
    /// The layer is new; fire its request.
    Added,
    /// The layer's request changed; fire the new one.
    Changed,
    /// The layer disappeared; forget its fingerprint.
    Removed,
}

impl std::fmt::Display for HttpCommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// A scheduled request dispatch.
#[derive(Debug, Clone)]
pub struct HttpCommand {
    /// What this command does to its layer.
    pub kind: HttpCommandKind,
    /// The layer the command belongs to.
    pub layer: String,
    /// The request method.
    pub method: HttpMethod,
    /// The request content.
    pub content: HttpRequestContent,
    /// When the command fires, in milliseconds.
    pub execute_at: i64,
    /// The timeline object the command was derived from.
    pub timeline_obj_id: String,
}

impl TimedCommand for HttpCommand {
    fn execute_at(&self) -> i64 {
        self.execute_at
    }

    fn queue_key(&self) -> Option<&str> {
        self.content.queue_id.as_deref()
    }

    fn report(&self) -> CommandReport {
        CommandReport {
            timeline_obj_id: self.timeline_obj_id.clone(),
            context: format!("{}: {} {} ({})", self.kind, self.method, self.content.url, self.layer),
        }
    }
}

/// Projects the timeline snapshot onto the send device's state.
///
/// Only layers mapped to this device participate. Lookahead objects are
/// skipped: a fire-once request has no preview semantic.
///
/// # Errors
///
/// Returns [`ProjectionError::ContentMismatch`] when a mapped layer carries
/// non-HTTP content.
pub fn project(
    snapshot: &TimelineSnapshot,
    mappings: &MappingTable,
    device_id: &str,
) -> Result<HttpSendState, ProjectionError> {
    let mut layers = BTreeMap::new();

    for (layer_id, object) in &snapshot.layers {
        if object.is_lookahead {
            continue;
        }
        let Some(mapping) = mappings.get(layer_id) else {
            continue;
        };
        if !mapping.matches(DeviceKind::HttpSend, device_id) {
            continue;
        }

        let Some((method, content)) = object.content.http_request() else {
            return Err(ProjectionError::ContentMismatch {
                layer: layer_id.clone(),
            });
        };

        layers.insert(
            layer_id.clone(),
            HttpSendLayer {
                method,
                content: content.clone(),
                timeline_obj_id: object.id.clone(),
            },
        );
    }

    Ok(HttpSendState { layers })
}

/// Diffs two device states into the commands that transform one into the
/// other at `transition_time`.
///
/// Commands are ordered by temporal priority (lower first, absent means 0),
/// then layer name, so dispatch order is deterministic.
#[must_use]
pub fn diff(
    old: &HttpSendState,
    new: &HttpSendState,
    transition_time: i64,
) -> Vec<HttpCommand> {
    let mut commands = Vec::new();

    for (layer, entry) in &new.layers {
        let kind = match old.layers.get(layer) {
            None => HttpCommandKind::Added,
            Some(previous)
                if previous.method != entry.method || previous.content != entry.content =>
            {
                HttpCommandKind::Changed
            }
            Some(_) => continue,
        };
        commands.push(HttpCommand {
            kind,
            layer: layer.clone(),
            method: entry.method,
            content: entry.content.clone(),
            execute_at: transition_time,
            timeline_obj_id: entry.timeline_obj_id.clone(),
        });
    }

    for (layer, entry) in &old.layers {
        if new.layers.contains_key(layer) {
            continue;
        }
        commands.push(HttpCommand {
            kind: HttpCommandKind::Removed,
            layer: layer.clone(),
            method: entry.method,
            content: entry.content.clone(),
            execute_at: transition_time,
            timeline_obj_id: entry.timeline_obj_id.clone(),
        });
    }

    commands.sort_by_key(|c| temporal_order(c.content.temporal_priority, &c.layer));
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::mapping;
    use crate::timeline::{Instance, ResolvedObject, TimelineContent};

    fn object(id: &str, content: TimelineContent) -> ResolvedObject {
        ResolvedObject {
            id: id.to_string(),
            instance: Instance {
                start: 1000,
                end: None,
            },
            content,
            is_lookahead: false,
            lookahead_for_layer: None,
        }
    }

    fn mappings_for(layers: &[&str]) -> MappingTable {
        layers
            .iter()
            .map(|l| ((*l).to_string(), mapping::http_send("http0")))
            .collect::<MappingTable>()
    }

    fn snapshot_with(layers: Vec<(&str, ResolvedObject)>) -> TimelineSnapshot {
        let mut snapshot = TimelineSnapshot::empty(1000);
        for (layer, object) in layers {
            snapshot.layers.insert(layer.to_string(), object);
        }
        snapshot
    }

    #[test]
    fn projects_only_mapped_layers() {
        let snapshot = snapshot_with(vec![
            (
                "L1",
                object(
                    "o1",
                    TimelineContent::Post(HttpRequestContent::new("http://x")),
                ),
            ),
            (
                "unmapped",
                object(
                    "o2",
                    TimelineContent::Post(HttpRequestContent::new("http://y")),
                ),
            ),
        ]);
        let mappings = mappings_for(&["L1"]);

        let state = project(&snapshot, &mappings, "http0").unwrap();
        assert_eq!(state.layers.len(), 1);
        assert!(state.layers.contains_key("L1"));
    }

    #[test]
    fn projection_ignores_other_devices() {
        let snapshot = snapshot_with(vec![(
            "L1",
            object(
                "o1",
                TimelineContent::Get(HttpRequestContent::new("http://x")),
            ),
        )]);
        let mappings = mappings_for(&["L1"]);

        let state = project(&snapshot, &mappings, "http1").unwrap();
        assert!(state.layers.is_empty());
    }

    #[test]
    fn projection_rejects_foreign_content() {
        use crate::timeline::QuantelClipContent;

        let snapshot = snapshot_with(vec![(
            "L1",
            object(
                "o1",
                TimelineContent::QuantelClip(QuantelClipContent::with_title("NEWS")),
            ),
        )]);
        let mappings = mappings_for(&["L1"]);

        let err = project(&snapshot, &mappings, "http0").unwrap_err();
        assert!(matches!(err, ProjectionError::ContentMismatch { layer } if layer == "L1"));
    }

    #[test]
    fn empty_to_single_layer_emits_one_added_command() {
        let old = HttpSendState::default();
        let mut new = HttpSendState::default();
        new.layers.insert(
            "L1".to_string(),
            HttpSendLayer {
                method: HttpMethod::Post,
                content: HttpRequestContent::new("http://x")
                    .with_params(serde_json::json!({ "a": 1 })),
                timeline_obj_id: "o1".to_string(),
            },
        );

        let commands = diff(&old, &new, 1000);

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].kind, HttpCommandKind::Added);
        assert_eq!(commands[0].execute_at, 1000);
        assert!(commands[0].queue_key().is_none());
    }

    #[test]
    fn unchanged_content_emits_nothing() {
        let mut state = HttpSendState::default();
        state.layers.insert(
            "L1".to_string(),
            HttpSendLayer {
                method: HttpMethod::Get,
                content: HttpRequestContent::new("http://x"),
                timeline_obj_id: "o1".to_string(),
            },
        );

        assert!(diff(&state, &state.clone(), 2000).is_empty());
    }

    #[test]
    fn changed_content_emits_changed_command() {
        let mut old = HttpSendState::default();
        old.layers.insert(
            "L1".to_string(),
            HttpSendLayer {
                method: HttpMethod::Get,
                content: HttpRequestContent::new("http://x"),
                timeline_obj_id: "o1".to_string(),
            },
        );
        let mut new = old.clone();
        new.layers.get_mut("L1").unwrap().content =
            HttpRequestContent::new("http://x").with_params(serde_json::json!({ "a": 2 }));

        let commands = diff(&old, &new, 2000);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].kind, HttpCommandKind::Changed);
    }

    #[test]
    fn removed_layer_emits_removed_command() {
        let mut old = HttpSendState::default();
        old.layers.insert(
            "L1".to_string(),
            HttpSendLayer {
                method: HttpMethod::Get,
                content: HttpRequestContent::new("http://x"),
                timeline_obj_id: "o1".to_string(),
            },
        );

        let commands = diff(&old, &HttpSendState::default(), 2000);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].kind, HttpCommandKind::Removed);
    }

    #[test]
    fn lower_temporal_priority_fires_first() {
        let mut new = HttpSendState::default();
        new.layers.insert(
            "L1".to_string(),
            HttpSendLayer {
                method: HttpMethod::Post,
                content: HttpRequestContent::new("http://one").with_temporal_priority(2),
                timeline_obj_id: "o1".to_string(),
            },
        );
        new.layers.insert(
            "L2".to_string(),
            HttpSendLayer {
                method: HttpMethod::Post,
                content: HttpRequestContent::new("http://two").with_temporal_priority(0),
                timeline_obj_id: "o2".to_string(),
            },
        );

        let commands = diff(&HttpSendState::default(), &new, 1000);
        let layers: Vec<&str> = commands.iter().map(|c| c.layer.as_str()).collect();
        assert_eq!(layers, vec!["L2", "L1"]);
    }

    #[test]
    fn lookahead_objects_are_skipped() {
        let mut lookahead = object(
            "o1",
            TimelineContent::Get(HttpRequestContent::new("http://x")),
        );
        lookahead.is_lookahead = true;
        lookahead.lookahead_for_layer = Some("L1".to_string());

        let snapshot = snapshot_with(vec![("L1_lookahead", lookahead)]);
        let mut mappings = mappings_for(&["L1"]);
        mappings.insert("L1_lookahead".to_string(), mapping::http_send("http0"));

        let state = project(&snapshot, &mappings, "http0").unwrap();
        assert!(state.layers.is_empty());
    }

    #[test]
    fn queue_key_comes_from_content_queue_id() {
        let command = HttpCommand {
            kind: HttpCommandKind::Added,
            layer: "L1".to_string(),
            method: HttpMethod::Post,
            content: HttpRequestContent::new("http://x").with_queue_id("main"),
            execute_at: 1000,
            timeline_obj_id: "o1".to_string(),
        };
        assert_eq!(command.queue_key(), Some("main"));
    }
}
