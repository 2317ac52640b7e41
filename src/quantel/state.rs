// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State shape, projection and diffing for the video-server device.
//!
//! The device state is port-keyed: each port binds a channel, carries an
//! optional foreground clip and an optional next-up clip staged by a
//! lookahead layer. The differ turns state changes into prepare-ahead and
//! transition commands per port.

use std::collections::BTreeMap;

use crate::error::ProjectionError;
use crate::event::CommandReport;
use crate::resolve::{prepare_time, TimedCommand};
use crate::timeline::mapping::{DeviceKind, MappingSpec, MappingTable};
use crate::timeline::{ClipRef, ControlMode, QuantelClipContent, ResolvedObject, TimelineSnapshot};

/// Projected state of the video-server device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantelState {
    /// Ports keyed by port id.
    pub ports: BTreeMap<String, QuantelStatePort>,
}

/// Desired state of one port.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantelStatePort {
    /// The timeline object driving the foreground clip, if any.
    pub timeline_obj_id: String,
    /// The SDI channel the port plays out on.
    pub channel: u16,
    /// Control mode for transitions on this port.
    pub mode: ControlMode,
    /// The clip on air, `None` for an idle port.
    pub clip: Option<QuantelStateClip>,
    /// The clip staged next by a lookahead layer.
    pub next_up: Option<QuantelStateClip>,
}

impl QuantelStatePort {
    fn empty(channel: u16, mode: ControlMode) -> Self {
        Self {
            timeline_obj_id: String::new(),
            channel,
            mode,
            clip: None,
            next_up: None,
        }
    }
}

/// A clip as placed on a port.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantelStateClip {
    /// How the clip is identified on the server.
    pub reference: ClipRef,
    /// Whether the clip plays or holds its frame.
    pub playing: bool,
    /// When playback (notionally) started, in milliseconds.
    pub play_time: i64,
    /// When a paused clip was paused, in milliseconds.
    pub pause_time: Option<i64>,
    /// In point within the clip, in milliseconds.
    pub in_point: Option<i64>,
    /// Out point within the clip, in milliseconds.
    pub out_point: Option<i64>,
    /// Playback rate override, frames per second.
    pub fps: Option<f64>,
}

impl QuantelStateClip {
    /// Returns `true` if both clips resolve to the same loaded fragments.
    #[must_use]
    pub fn same_fragments(&self, other: &Self) -> bool {
        self.reference == other.reference
            && self.in_point == other.in_point
            && self.out_point == other.out_point
            && self.fps == other.fps
    }
}

/// A scheduled operation on one port.
#[derive(Debug, Clone)]
pub struct QuantelCommand {
    /// The port the command operates on.
    pub port_id: String,
    /// What to do.
    pub payload: QuantelCommandPayload,
    /// When the command fires, in milliseconds.
    pub execute_at: i64,
    /// The timeline object the command was derived from.
    pub timeline_obj_id: String,
}

/// The operations the differ emits.
#[derive(Debug, Clone)]
pub enum QuantelCommandPayload {
    /// Bind the port to a channel, releasing any previous binding.
    SetupPort {
        /// The channel to bind.
        channel: u16,
    },
    /// Load the clip's fragments onto the port ahead of its play time.
    LoadFragments {
        /// The clip to load.
        clip: QuantelStateClip,
        /// When the clip is expected to start playing.
        time_of_play: i64,
    },
    /// Jump to the clip position and start playback.
    PlayClip {
        /// The clip to play.
        clip: QuantelStateClip,
        /// Transition control mode.
        mode: ControlMode,
    },
    /// Jump to the clip position and hold the frame.
    PauseClip {
        /// The clip to pause on.
        clip: QuantelStateClip,
        /// Transition control mode.
        mode: ControlMode,
    },
    /// Remove the clip from the port.
    ClearClip,
    /// Release the port entirely.
    ReleasePort,
}

impl QuantelCommandPayload {
    fn name(&self) -> &'static str {
        match self {
            Self::SetupPort { .. } => "setup port",
            Self::LoadFragments { .. } => "load fragments",
            Self::PlayClip { .. } => "play clip",
            Self::PauseClip { .. } => "pause clip",
            Self::ClearClip => "clear clip",
            Self::ReleasePort => "release port",
        }
    }
}

impl TimedCommand for QuantelCommand {
    fn execute_at(&self) -> i64 {
        self.execute_at
    }

    fn queue_key(&self) -> Option<&str> {
        Some(&self.port_id)
    }

    fn report(&self) -> CommandReport {
        CommandReport {
            timeline_obj_id: self.timeline_obj_id.clone(),
            context: format!("{} ({})", self.payload.name(), self.port_id),
        }
    }
}

/// Projects the timeline snapshot onto the video-server state.
///
/// A lookahead layer stages its clip into the target port's next-up slot;
/// when no foreground layer exists for that port, an empty foreground port
/// is synthesized to carry the slot.
///
/// # Errors
///
/// Returns [`ProjectionError`] when a mapped layer has no usable port
/// binding or carries non-clip content.
pub fn project(
    snapshot: &TimelineSnapshot,
    mappings: &MappingTable,
    device_id: &str,
) -> Result<QuantelState, ProjectionError> {
    let mut ports: BTreeMap<String, QuantelStatePort> = BTreeMap::new();

    for (layer_id, object) in &snapshot.layers {
        let mapping_layer = if object.is_lookahead {
            object.lookahead_for_layer.as_deref().unwrap_or(layer_id)
        } else {
            layer_id
        };
        let Some(mapping) = mappings.get(mapping_layer) else {
            continue;
        };
        if !mapping.matches(DeviceKind::Quantel, device_id) {
            continue;
        }
        let MappingSpec::Quantel(spec) = &mapping.spec else {
            return Err(ProjectionError::InvalidMapping {
                layer: layer_id.clone(),
                reason: "mapping carries no port binding".to_string(),
            });
        };
        if spec.port_id.is_empty() {
            return Err(ProjectionError::InvalidMapping {
                layer: layer_id.clone(),
                reason: "mapping names no port".to_string(),
            });
        }
        // Only the first channel of a multi-channel port is used.
        let Some(channel) = spec.channel_ids.first().copied() else {
            return Err(ProjectionError::InvalidMapping {
                layer: layer_id.clone(),
                reason: "no channel bound to port".to_string(),
            });
        };

        let Some(content) = object.content.quantel_clip() else {
            return Err(ProjectionError::ContentMismatch {
                layer: layer_id.clone(),
            });
        };
        let clip = build_clip(layer_id, object, content)?;

        let mode = spec.mode.unwrap_or_default();
        let port = ports
            .entry(spec.port_id.clone())
            .or_insert_with(|| QuantelStatePort::empty(channel, mode));

        if object.is_lookahead {
            port.next_up = Some(clip);
        } else {
            port.timeline_obj_id = object.id.clone();
            port.clip = Some(clip);
        }
    }

    Ok(QuantelState { ports })
}

fn build_clip(
    layer_id: &str,
    object: &ResolvedObject,
    content: &QuantelClipContent,
) -> Result<QuantelStateClip, ProjectionError> {
    let Some(reference) = content.reference() else {
        return Err(ProjectionError::InvalidMapping {
            layer: layer_id.to_string(),
            reason: "clip has neither title nor guid".to_string(),
        });
    };

    Ok(QuantelStateClip {
        reference,
        playing: content.playing,
        play_time: content.play_time.unwrap_or(object.instance.start),
        pause_time: content.pause_time,
        in_point: content.in_point,
        out_point: content.out_point,
        fps: content.fps,
    })
}

/// Diffs two device states into the commands that transform one into the
/// other at `transition_time`.
///
/// Prepare-ahead commands (port setup, fragment loads) fire at
/// [`prepare_time`]; transitions (play, pause, clear, release) fire at the
/// transition itself. Commands sharing a port serialize on the queue, in
/// emission order for equal fire times.
#[must_use]
pub fn diff(
    old: &QuantelState,
    old_time: i64,
    new: &QuantelState,
    transition_time: i64,
) -> Vec<QuantelCommand> {
    let prepare_at = prepare_time(old_time, transition_time);
    let mut commands = Vec::new();

    for (port_id, new_port) in &new.ports {
        let old_port = old.ports.get(port_id);
        let channel_changed = old_port.map_or(true, |o| o.channel != new_port.channel);

        if channel_changed {
            commands.push(QuantelCommand {
                port_id: port_id.clone(),
                payload: QuantelCommandPayload::SetupPort {
                    channel: new_port.channel,
                },
                execute_at: prepare_at,
                timeline_obj_id: new_port.timeline_obj_id.clone(),
            });
        }

        // A rebound port has nothing loaded, whatever the old state said.
        let old_clip = if channel_changed {
            None
        } else {
            old_port.and_then(|o| o.clip.as_ref())
        };

        match (&new_port.clip, old_clip) {
            (Some(new_clip), old_clip) => {
                let needs_load =
                    old_clip.map_or(true, |oc| !oc.same_fragments(new_clip));
                let needs_transport = needs_load
                    || old_clip.map_or(true, |oc| {
                        oc.playing != new_clip.playing
                            || oc.play_time != new_clip.play_time
                            || oc.pause_time != new_clip.pause_time
                    });

                if needs_load {
                    commands.push(QuantelCommand {
                        port_id: port_id.clone(),
                        payload: QuantelCommandPayload::LoadFragments {
                            clip: new_clip.clone(),
                            time_of_play: new_clip.play_time,
                        },
                        execute_at: prepare_at,
                        timeline_obj_id: new_port.timeline_obj_id.clone(),
                    });
                }
                if needs_transport {
                    let payload = if new_clip.playing {
                        QuantelCommandPayload::PlayClip {
                            clip: new_clip.clone(),
                            mode: new_port.mode,
                        }
                    } else {
                        QuantelCommandPayload::PauseClip {
                            clip: new_clip.clone(),
                            mode: new_port.mode,
                        }
                    };
                    commands.push(QuantelCommand {
                        port_id: port_id.clone(),
                        payload,
                        execute_at: transition_time,
                        timeline_obj_id: new_port.timeline_obj_id.clone(),
                    });
                }
            }
            (None, Some(_)) => {
                commands.push(QuantelCommand {
                    port_id: port_id.clone(),
                    payload: QuantelCommandPayload::ClearClip,
                    execute_at: transition_time,
                    timeline_obj_id: new_port.timeline_obj_id.clone(),
                });
            }
            (None, None) => {}
        }

        // Preload the lookahead clip so the cut lands on staged data.
        if let Some(next_up) = &new_port.next_up {
            let old_next = if channel_changed {
                None
            } else {
                old_port.and_then(|o| o.next_up.as_ref())
            };
            let changed = old_next.map_or(true, |on| !on.same_fragments(next_up));
            if changed {
                commands.push(QuantelCommand {
                    port_id: port_id.clone(),
                    payload: QuantelCommandPayload::LoadFragments {
                        clip: next_up.clone(),
                        time_of_play: next_up.play_time,
                    },
                    execute_at: prepare_at,
                    timeline_obj_id: new_port.timeline_obj_id.clone(),
                });
            }
        }
    }

    for (port_id, old_port) in &old.ports {
        if new.ports.contains_key(port_id) {
            continue;
        }
        commands.push(QuantelCommand {
            port_id: port_id.clone(),
            payload: QuantelCommandPayload::ReleasePort,
            execute_at: transition_time,
            timeline_obj_id: old_port.timeline_obj_id.clone(),
        });
    }

    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::mapping::{self, QuantelMapping};
    use crate::timeline::{Instance, TimelineContent};

    fn clip(reference: &str, playing: bool, play_time: i64) -> QuantelStateClip {
        QuantelStateClip {
            reference: ClipRef::Title(reference.to_string()),
            playing,
            play_time,
            pause_time: None,
            in_point: None,
            out_point: None,
            fps: None,
        }
    }

    fn port_with_clip(channel: u16, clip: Option<QuantelStateClip>) -> QuantelStatePort {
        QuantelStatePort {
            timeline_obj_id: "o1".to_string(),
            channel,
            mode: ControlMode::Quality,
            clip,
            next_up: None,
        }
    }

    fn clip_object(id: &str, title: &str, playing: bool, start: i64) -> ResolvedObject {
        let mut content = QuantelClipContent::with_title(title);
        content.playing = playing;
        ResolvedObject {
            id: id.to_string(),
            instance: Instance { start, end: None },
            content: TimelineContent::QuantelClip(content),
            is_lookahead: false,
            lookahead_for_layer: None,
        }
    }

    fn quantel_mappings(layer: &str, port: &str, channel: u16) -> MappingTable {
        let mut mappings = MappingTable::new();
        mappings.insert(
            layer.to_string(),
            mapping::quantel("q0", QuantelMapping::new(port, channel)),
        );
        mappings
    }

    #[test]
    fn projects_foreground_clip_onto_port() {
        let mut snapshot = TimelineSnapshot::empty(10_000);
        snapshot
            .layers
            .insert("V1".to_string(), clip_object("o1", "NEWS", true, 10_000));
        let mappings = quantel_mappings("V1", "P1", 1);

        let state = project(&snapshot, &mappings, "q0").unwrap();
        let port = &state.ports["P1"];
        assert_eq!(port.channel, 1);
        let clip = port.clip.as_ref().unwrap();
        assert_eq!(clip.reference, ClipRef::Title("NEWS".to_string()));
        assert!(clip.playing);
        assert_eq!(clip.play_time, 10_000);
        assert!(port.next_up.is_none());
    }

    #[test]
    fn lookahead_without_foreground_synthesizes_empty_port() {
        let mut object = clip_object("o2", "NEXT", false, 20_000);
        object.is_lookahead = true;
        object.lookahead_for_layer = Some("V1".to_string());

        let mut snapshot = TimelineSnapshot::empty(10_000);
        snapshot.layers.insert("V1_lookahead".to_string(), object);
        let mappings = quantel_mappings("V1", "P1", 1);

        let state = project(&snapshot, &mappings, "q0").unwrap();
        let port = &state.ports["P1"];
        assert!(port.clip.is_none());
        let next_up = port.next_up.as_ref().unwrap();
        assert_eq!(next_up.reference, ClipRef::Title("NEXT".to_string()));
    }

    #[test]
    fn projection_fails_without_channel() {
        let mut snapshot = TimelineSnapshot::empty(0);
        snapshot
            .layers
            .insert("V1".to_string(), clip_object("o1", "NEWS", true, 0));

        let mut mappings = MappingTable::new();
        let mut spec = QuantelMapping::new("P1", 1);
        spec.channel_ids.clear();
        mappings.insert("V1".to_string(), mapping::quantel("q0", spec));

        let err = project(&snapshot, &mappings, "q0").unwrap_err();
        assert!(matches!(err, ProjectionError::InvalidMapping { .. }));
    }

    #[test]
    fn projection_fails_without_clip_identity() {
        let mut content = QuantelClipContent::with_title("X");
        content.title = None;
        let object = ResolvedObject {
            id: "o1".to_string(),
            instance: Instance { start: 0, end: None },
            content: TimelineContent::QuantelClip(content),
            is_lookahead: false,
            lookahead_for_layer: None,
        };
        let mut snapshot = TimelineSnapshot::empty(0);
        snapshot.layers.insert("V1".to_string(), object);
        let mappings = quantel_mappings("V1", "P1", 1);

        assert!(project(&snapshot, &mappings, "q0").is_err());
    }

    #[test]
    fn new_port_emits_setup_load_play_in_order() {
        let mut new = QuantelState::default();
        new.ports
            .insert("P1".to_string(), port_with_clip(1, Some(clip("NEWS", true, 10_000))));

        let commands = diff(&QuantelState::default(), 0, &new, 10_000);

        assert_eq!(commands.len(), 3);
        assert!(matches!(
            commands[0].payload,
            QuantelCommandPayload::SetupPort { channel: 1 }
        ));
        assert!(matches!(
            commands[1].payload,
            QuantelCommandPayload::LoadFragments { .. }
        ));
        assert!(matches!(commands[2].payload, QuantelCommandPayload::PlayClip { .. }));

        // Prepare commands lead the transition by the ideal margin.
        assert_eq!(commands[0].execute_at, 9000);
        assert_eq!(commands[1].execute_at, 9000);
        assert_eq!(commands[2].execute_at, 10_000);
    }

    #[test]
    fn identical_states_emit_nothing() {
        let mut state = QuantelState::default();
        state
            .ports
            .insert("P1".to_string(), port_with_clip(1, Some(clip("NEWS", true, 0))));

        assert!(diff(&state, 0, &state.clone(), 5000).is_empty());
    }

    #[test]
    fn pause_flip_emits_transport_without_reload() {
        let mut old = QuantelState::default();
        old.ports
            .insert("P1".to_string(), port_with_clip(1, Some(clip("NEWS", true, 0))));
        let mut new = old.clone();
        let new_clip = new.ports.get_mut("P1").unwrap().clip.as_mut().unwrap();
        new_clip.playing = false;
        new_clip.pause_time = Some(4000);

        let commands = diff(&old, 0, &new, 5000);
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            commands[0].payload,
            QuantelCommandPayload::PauseClip { .. }
        ));
        assert_eq!(commands[0].execute_at, 5000);
    }

    #[test]
    fn removed_clip_emits_clear() {
        let mut old = QuantelState::default();
        old.ports
            .insert("P1".to_string(), port_with_clip(1, Some(clip("NEWS", false, 0))));
        let mut new = old.clone();
        new.ports.get_mut("P1").unwrap().clip = None;

        let commands = diff(&old, 0, &new, 5000);
        assert_eq!(commands.len(), 1);
        assert!(matches!(commands[0].payload, QuantelCommandPayload::ClearClip));
    }

    #[test]
    fn removed_port_emits_release() {
        let mut old = QuantelState::default();
        old.ports
            .insert("P1".to_string(), port_with_clip(1, None));

        let commands = diff(&old, 0, &QuantelState::default(), 5000);
        assert_eq!(commands.len(), 1);
        assert!(matches!(commands[0].payload, QuantelCommandPayload::ReleasePort));
        assert_eq!(commands[0].queue_key(), Some("P1"));
    }

    #[test]
    fn channel_change_rebinds_and_reloads() {
        let mut old = QuantelState::default();
        old.ports
            .insert("P1".to_string(), port_with_clip(1, Some(clip("NEWS", true, 0))));
        let mut new = old.clone();
        new.ports.get_mut("P1").unwrap().channel = 2;

        let commands = diff(&old, 0, &new, 5000);
        let names: Vec<&str> = commands.iter().map(|c| c.payload.name()).collect();
        assert_eq!(names, vec!["setup port", "load fragments", "play clip"]);
    }

    #[test]
    fn lookahead_change_emits_preload_only() {
        let mut old = QuantelState::default();
        old.ports
            .insert("P1".to_string(), port_with_clip(1, None));
        let mut new = old.clone();
        new.ports.get_mut("P1").unwrap().next_up = Some(clip("NEXT", false, 20_000));

        let commands = diff(&old, 0, &new, 5000);
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            commands[0].payload,
            QuantelCommandPayload::LoadFragments { .. }
        ));
        // No play or pause until a real foreground appears.
    }

    #[test]
    fn prepare_waits_for_a_recent_old_state() {
        let mut new = QuantelState::default();
        new.ports
            .insert("P1".to_string(), port_with_clip(1, Some(clip("NEWS", true, 5100))));

        let commands = diff(&QuantelState::default(), 5000, &new, 5100);
        // Old state at 5000: prepare cannot run before 5050.
        assert_eq!(commands[0].execute_at, 5050);
    }
}
