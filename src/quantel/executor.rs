// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tracked-state executor for the video-server device.
//!
//! The [`PortManager`] owns the engine's beliefs about the server: which
//! ports exist, what fragments are loaded where, and which jumps are
//! staged. Beliefs are updated only after a gateway operation succeeds, so
//! a failed command leaves the model unchanged and a later pass converges.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::error::{Result, TrackedStateError, TransportError};
use crate::queue::{CommandExecutor, CommandFuture};
use crate::timeline::{ClipRef, ControlMode};

use super::api::{ClipInfo, QuantelGateway};
use super::state::{QuantelCommand, QuantelCommandPayload, QuantelStateClip};

/// Playback rate assumed when neither the clip nor the server names one.
pub const DEFAULT_FPS: f64 = 50.0;

/// Staged jumps further than this many frames from the wanted position are
/// discarded and re-staged.
const JUMP_ERROR_MARGIN: i64 = 5;

/// How long the server gets to stage a soft jump before it is triggered.
const SOFT_JUMP_WAIT: Duration = Duration::from_millis(100);

/// How long resolved clip ids stay valid.
const CLIP_ID_TTL_MS: i64 = 30_000;

/// Converts milliseconds into frames at the given rate.
#[must_use]
pub fn frames(ms: i64, fps: f64) -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    let frames = (ms as f64 * fps / 1000.0).round() as i64;
    frames
}

/// One contiguous fragment range loaded onto a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedRange {
    /// First frame of the range on the port timeline.
    pub port_in_point: i64,
    /// Last frame of the range on the port timeline.
    pub port_out_point: i64,
}

/// The executor's belief about one port.
#[derive(Debug, Clone)]
pub struct TrackedPort {
    /// The channel the port is bound to.
    pub channel: u16,
    /// Loaded fragment ranges, keyed by clip id and frame window.
    pub loaded_fragments: HashMap<String, LoadedRange>,
    /// The port cursor as last commanded.
    pub offset: i64,
    /// Whether the port is playing.
    pub playing: bool,
    /// A staged soft-jump target, if any.
    pub jump_offset: Option<i64>,
    /// A scheduled stop frame, if any.
    pub scheduled_stop: Option<i64>,
}

impl TrackedPort {
    fn new(channel: u16) -> Self {
        Self {
            channel,
            loaded_fragments: HashMap::new(),
            offset: 0,
            playing: false,
            jump_offset: None,
            scheduled_stop: None,
        }
    }
}

fn fragment_key(clip_id: i32, in_frames: i64, out_frames: i64) -> String {
    format!("{clip_id}:{in_frames}:{out_frames}")
}

/// Executor for video-server commands.
#[derive(Debug)]
pub struct PortManager<G> {
    gateway: G,
    clock: Arc<dyn Clock>,
    ports: Mutex<HashMap<String, TrackedPort>>,
    clip_ids: TtlCache<ClipRef, i32>,
}

impl<G: QuantelGateway> PortManager<G> {
    /// Creates the manager around a gateway client.
    #[must_use]
    pub fn new(gateway: G, clock: Arc<dyn Clock>) -> Self {
        let clip_ids = TtlCache::new(CLIP_ID_TTL_MS, Arc::clone(&clock));
        Self {
            gateway,
            clock,
            ports: Mutex::new(HashMap::new()),
            clip_ids,
        }
    }

    /// Returns the gateway client.
    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Returns a copy of the tracked model for one port.
    pub async fn tracked_port(&self, port_id: &str) -> Option<TrackedPort> {
        self.ports.lock().await.get(port_id).cloned()
    }

    /// Drops all tracked ports and cached clip ids, forcing the next diff
    /// to rebuild everything from the server.
    pub async fn reset(&self) {
        self.ports.lock().await.clear();
        self.clip_ids.clear().await;
    }

    /// Resolves a clip reference to its server id, through the TTL cache.
    async fn resolve_clip_id(&self, reference: &ClipRef) -> Result<i32> {
        self.clip_ids
            .get_set(reference.clone(), || async {
                let clips = self.gateway.search_clip(reference).await?;
                clips
                    .first()
                    .map(|c| c.clip_id)
                    .ok_or_else(|| TrackedStateError::ClipNotFound(reference.to_string()).into())
            })
            .await
    }

    /// Resolves the clip and validates it is playable by the server.
    async fn resolve_clip(&self, clip: &QuantelStateClip) -> Result<ClipInfo> {
        let clip_id = self.resolve_clip_id(&clip.reference).await?;
        let info = self.gateway.get_clip(clip_id).await?;

        let server = self.gateway.get_server().await?;
        if !server.pools.contains(&info.pool_id) {
            return Err(TrackedStateError::ClipNotAccessible {
                clip: clip.reference.to_string(),
                pool: info.pool_id,
            }
            .into());
        }
        Ok(info)
    }

    /// The frame window a clip occupies, derived from its in/out points.
    fn frame_window(clip: &QuantelStateClip, info: &ClipInfo) -> (i64, i64, f64) {
        let fps = clip.fps.or(info.fps).unwrap_or(DEFAULT_FPS);
        let in_frames = clip.in_point.map_or(0, |ms| frames(ms, fps));
        let out_frames = clip.out_point.map_or(info.frames, |ms| frames(ms, fps));
        (in_frames, out_frames, fps)
    }

    async fn setup_port(&self, port_id: &str, channel: u16) -> Result<()> {
        {
            let ports = self.ports.lock().await;
            if ports.get(port_id).map(|p| p.channel) == Some(channel) {
                tracing::debug!(port = %port_id, channel, "port already bound, skipping setup");
                return Ok(());
            }
        }

        if self.gateway.get_port(port_id).await?.is_some() {
            self.gateway.release_port(port_id).await?;
        }
        self.gateway.create_port(port_id, channel).await?;

        self.ports
            .lock()
            .await
            .insert(port_id.to_string(), TrackedPort::new(channel));
        tracing::debug!(port = %port_id, channel, "port created");
        Ok(())
    }

    async fn load_fragments(
        &self,
        port_id: &str,
        clip: &QuantelStateClip,
        time_of_play: i64,
    ) -> Result<()> {
        let info = self.resolve_clip(clip).await?;
        let (in_frames, out_frames, _fps) = Self::frame_window(clip, &info);
        let key = fragment_key(info.clip_id, in_frames, out_frames);

        let already_loaded = {
            let ports = self.ports.lock().await;
            let tracked = ports
                .get(port_id)
                .ok_or_else(|| TrackedStateError::UnknownPort(port_id.to_string()))?;
            tracked.loaded_fragments.get(&key).cloned()
        };

        let range = match already_loaded {
            Some(range) => {
                tracing::debug!(port = %port_id, %key, "fragments already on port, reusing");
                range
            }
            None => {
                let fragments = self
                    .gateway
                    .get_clip_fragments(info.clip_id, in_frames, out_frames)
                    .await?;
                let status = self
                    .gateway
                    .get_port(port_id)
                    .await?
                    .ok_or_else(|| TrackedStateError::UnknownPort(port_id.to_string()))?;
                let offset = status.end_of_data;
                self.gateway
                    .load_fragments_onto_port(port_id, &fragments, offset)
                    .await?;

                let range = LoadedRange {
                    port_in_point: offset,
                    port_out_point: offset + (out_frames - in_frames - 1).max(0),
                };
                let mut ports = self.ports.lock().await;
                let tracked = ports
                    .get_mut(port_id)
                    .ok_or_else(|| TrackedStateError::UnknownPort(port_id.to_string()))?;
                tracked.loaded_fragments.insert(key, range.clone());
                tracked.offset = range.port_out_point + 1;
                range
            }
        };

        // For a future play time, contain whatever is currently loaded and
        // stage the jump onto the fresh data.
        if time_of_play > self.clock.now_ms() {
            if range.port_in_point > 0 {
                self.gateway
                    .port_stop(port_id, Some(range.port_in_point - 1))
                    .await?;
                if let Some(tracked) = self.ports.lock().await.get_mut(port_id) {
                    tracked.scheduled_stop = Some(range.port_in_point - 1);
                }
            }
            self.gateway
                .port_prepare_jump(port_id, range.port_in_point)
                .await?;
            if let Some(tracked) = self.ports.lock().await.get_mut(port_id) {
                tracked.jump_offset = Some(range.port_in_point);
            }
        }
        Ok(())
    }

    async fn transport_clip(
        &self,
        port_id: &str,
        clip: &QuantelStateClip,
        mode: ControlMode,
        play: bool,
    ) -> Result<()> {
        let info = self.resolve_clip(clip).await?;
        let (in_frames, out_frames, fps) = Self::frame_window(clip, &info);
        let key = fragment_key(info.clip_id, in_frames, out_frames);

        let (range, jump_to, staged_jump) = {
            let mut ports = self.ports.lock().await;
            let tracked = ports
                .get_mut(port_id)
                .ok_or_else(|| TrackedStateError::UnknownPort(port_id.to_string()))?;
            let range = tracked
                .loaded_fragments
                .get(&key)
                .cloned()
                .ok_or_else(|| TrackedStateError::FragmentsNotLoaded {
                    port: port_id.to_string(),
                    clip: clip.reference.to_string(),
                })?;

            // Position within the clip: where playback stands now, or stood
            // when it was paused.
            let reference_point = clip.pause_time.unwrap_or_else(|| self.clock.now_ms());
            let elapsed_ms = (reference_point - clip.play_time).max(0);
            #[allow(clippy::cast_possible_truncation)]
            let jump_to =
                range.port_in_point + (elapsed_ms as f64 * fps / 1000.0).floor() as i64;

            // A staged jump that drifted too far is useless.
            if let Some(staged) = tracked.jump_offset {
                if (staged - jump_to).abs() > JUMP_ERROR_MARGIN {
                    tracing::debug!(
                        port = %port_id,
                        staged,
                        wanted = jump_to,
                        "staged jump too far off, discarding"
                    );
                    tracked.jump_offset = None;
                }
            }
            (range, jump_to, tracked.jump_offset)
        };

        if staged_jump.is_some() {
            if !play {
                self.gateway.port_stop(port_id, None).await?;
            }
            self.gateway.port_trigger_jump(port_id).await?;
        } else {
            match mode {
                ControlMode::Quality => {
                    self.gateway.port_prepare_jump(port_id, jump_to).await?;
                    // The server needs a moment to stage the jump.
                    tokio::time::sleep(SOFT_JUMP_WAIT).await;
                    if !play {
                        self.gateway.port_stop(port_id, None).await?;
                    }
                    self.gateway.port_trigger_jump(port_id).await?;
                }
                ControlMode::Speed => {
                    if !play {
                        self.gateway.port_stop(port_id, None).await?;
                    }
                    self.gateway.port_hard_jump(port_id, jump_to).await?;
                }
            }
        }

        if play {
            self.gateway.port_play(port_id).await?;
            self.gateway
                .port_stop(port_id, Some(range.port_out_point))
                .await?;
        }

        let mut ports = self.ports.lock().await;
        if let Some(tracked) = ports.get_mut(port_id) {
            tracked.playing = play;
            tracked.offset = jump_to;
            tracked.jump_offset = None;
            if play {
                tracked.scheduled_stop = Some(range.port_out_point);
            }
        }
        Ok(())
    }

    async fn clear_clip(&self, port_id: &str) -> Result<()> {
        {
            let ports = self.ports.lock().await;
            if !ports.contains_key(port_id) {
                return Err(TrackedStateError::UnknownPort(port_id.to_string()).into());
            }
        }
        self.gateway.port_clear(port_id).await?;

        let mut ports = self.ports.lock().await;
        if let Some(tracked) = ports.get_mut(port_id) {
            tracked.loaded_fragments.clear();
            tracked.jump_offset = None;
            tracked.scheduled_stop = None;
            tracked.playing = false;
            tracked.offset = 0;
        }
        Ok(())
    }

    async fn release_port(&self, port_id: &str) -> Result<()> {
        match self.gateway.release_port(port_id).await {
            Ok(()) => {}
            Err(TransportError::NotFound(_)) => {
                // Already gone remotely; dropping the belief is enough.
                tracing::debug!(port = %port_id, "port already released");
            }
            Err(err) => return Err(err.into()),
        }
        self.ports.lock().await.remove(port_id);
        Ok(())
    }
}

impl<G: QuantelGateway> CommandExecutor<QuantelCommand> for PortManager<G> {
    fn execute(&self, command: QuantelCommand) -> CommandFuture<'_> {
        Box::pin(async move {
            match command.payload {
                QuantelCommandPayload::SetupPort { channel } => {
                    self.setup_port(&command.port_id, channel).await
                }
                QuantelCommandPayload::LoadFragments { clip, time_of_play } => {
                    self.load_fragments(&command.port_id, &clip, time_of_play)
                        .await
                }
                QuantelCommandPayload::PlayClip { clip, mode } => {
                    self.transport_clip(&command.port_id, &clip, mode, true)
                        .await
                }
                QuantelCommandPayload::PauseClip { clip, mode } => {
                    self.transport_clip(&command.port_id, &clip, mode, false)
                        .await
                }
                QuantelCommandPayload::ClearClip => self.clear_clip(&command.port_id).await,
                QuantelCommandPayload::ReleasePort => self.release_port(&command.port_id).await,
            }
        })
    }
}
