// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gateway collaborator surface for the video-server device.
//!
//! The executor drives the server exclusively through [`QuantelGateway`];
//! the concrete HTTP gateway client lives outside this crate. Tests
//! implement the trait with a scripted mock.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::TransportError;
use crate::timeline::ClipRef;

/// The ISA server the gateway fronts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Disk pools the server can play from.
    pub pools: Vec<i32>,
    /// Whether the server is marked down.
    pub down: bool,
}

/// Live status of a port on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatus {
    /// First frame past the loaded data on the port timeline.
    pub end_of_data: i64,
}

/// A clip known to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipInfo {
    /// The server-assigned clip id.
    pub clip_id: i32,
    /// The clip title.
    pub title: String,
    /// The pool the clip is stored on.
    pub pool_id: i32,
    /// Total length in frames.
    pub frames: i64,
    /// Native frame rate, if the server reports one.
    pub fps: Option<f64>,
}

/// One contiguous piece of clip data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// First frame of the fragment within the clip.
    pub start_frame: i64,
    /// Frame past the last frame of the fragment.
    pub finish_frame: i64,
}

/// The fragments covering a clip range, ready to load onto a port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentSet {
    /// The fragments, in clip order.
    pub fragments: Vec<Fragment>,
}

impl FragmentSet {
    /// Returns `true` if the set holds no fragments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Protocol operations the executor calls on the gateway.
///
/// Every operation is idempotent on the server side or safe to repeat
/// after a failure; the executor only updates its tracked model after an
/// operation succeeds.
pub trait QuantelGateway: Send + Sync + 'static {
    /// Establishes the gateway session.
    fn connect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Tears the gateway session down.
    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns a watch channel following the gateway connection state.
    fn watch_connection(&self) -> watch::Receiver<bool>;

    /// Returns the configured server.
    fn get_server(&self) -> impl Future<Output = Result<ServerInfo, TransportError>> + Send;

    /// Returns the port's status, or `None` if it does not exist.
    fn get_port(
        &self,
        port_id: &str,
    ) -> impl Future<Output = Result<Option<PortStatus>, TransportError>> + Send;

    /// Creates a port bound to a channel.
    fn create_port(
        &self,
        port_id: &str,
        channel: u16,
    ) -> impl Future<Output = Result<PortStatus, TransportError>> + Send;

    /// Releases a port.
    ///
    /// Returns [`TransportError::NotFound`] if the port is already gone.
    fn release_port(
        &self,
        port_id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Searches clips matching a reference, best match first.
    fn search_clip(
        &self,
        reference: &ClipRef,
    ) -> impl Future<Output = Result<Vec<ClipInfo>, TransportError>> + Send;

    /// Returns a clip by id.
    fn get_clip(
        &self,
        clip_id: i32,
    ) -> impl Future<Output = Result<ClipInfo, TransportError>> + Send;

    /// Returns the fragments covering `[in_point, out_point)` frames of a
    /// clip.
    fn get_clip_fragments(
        &self,
        clip_id: i32,
        in_point: i64,
        out_point: i64,
    ) -> impl Future<Output = Result<FragmentSet, TransportError>> + Send;

    /// Loads fragments onto a port at the given port-timeline offset.
    fn load_fragments_onto_port(
        &self,
        port_id: &str,
        fragments: &FragmentSet,
        offset: i64,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stages a soft jump to an offset on the port timeline.
    fn port_prepare_jump(
        &self,
        port_id: &str,
        offset: i64,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Triggers a previously staged soft jump.
    fn port_trigger_jump(
        &self,
        port_id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Jumps immediately to an offset on the port timeline.
    fn port_hard_jump(
        &self,
        port_id: &str,
        offset: i64,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stops the port, immediately or at a scheduled frame.
    fn port_stop(
        &self,
        port_id: &str,
        frame: Option<i64>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Starts playback on the port.
    fn port_play(
        &self,
        port_id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Clears all loaded data off the port.
    fn port_clear(
        &self,
        port_id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

impl<T: QuantelGateway> QuantelGateway for Arc<T> {
    fn connect(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.as_ref().connect()
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.as_ref().disconnect()
    }

    fn watch_connection(&self) -> watch::Receiver<bool> {
        self.as_ref().watch_connection()
    }

    fn get_server(&self) -> impl Future<Output = Result<ServerInfo, TransportError>> + Send {
        self.as_ref().get_server()
    }

    fn get_port(
        &self,
        port_id: &str,
    ) -> impl Future<Output = Result<Option<PortStatus>, TransportError>> + Send {
        self.as_ref().get_port(port_id)
    }

    fn create_port(
        &self,
        port_id: &str,
        channel: u16,
    ) -> impl Future<Output = Result<PortStatus, TransportError>> + Send {
        self.as_ref().create_port(port_id, channel)
    }

    fn release_port(
        &self,
        port_id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.as_ref().release_port(port_id)
    }

    fn search_clip(
        &self,
        reference: &ClipRef,
    ) -> impl Future<Output = Result<Vec<ClipInfo>, TransportError>> + Send {
        self.as_ref().search_clip(reference)
    }

    fn get_clip(
        &self,
        clip_id: i32,
    ) -> impl Future<Output = Result<ClipInfo, TransportError>> + Send {
        self.as_ref().get_clip(clip_id)
    }

    fn get_clip_fragments(
        &self,
        clip_id: i32,
        in_point: i64,
        out_point: i64,
    ) -> impl Future<Output = Result<FragmentSet, TransportError>> + Send {
        self.as_ref().get_clip_fragments(clip_id, in_point, out_point)
    }

    fn load_fragments_onto_port(
        &self,
        port_id: &str,
        fragments: &FragmentSet,
        offset: i64,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.as_ref().load_fragments_onto_port(port_id, fragments, offset)
    }

    fn port_prepare_jump(
        &self,
        port_id: &str,
        offset: i64,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.as_ref().port_prepare_jump(port_id, offset)
    }

    fn port_trigger_jump(
        &self,
        port_id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.as_ref().port_trigger_jump(port_id)
    }

    fn port_hard_jump(
        &self,
        port_id: &str,
        offset: i64,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.as_ref().port_hard_jump(port_id, offset)
    }

    fn port_stop(
        &self,
        port_id: &str,
        frame: Option<i64>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.as_ref().port_stop(port_id, frame)
    }

    fn port_play(&self, port_id: &str) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.as_ref().port_play(port_id)
    }

    fn port_clear(&self, port_id: &str) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.as_ref().port_clear(port_id)
    }
}
