// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device façades and lifecycle.
//!
//! Every playout device exposes the same narrow capability surface to the
//! conductor: [`PlayoutDevice`]. The conductor serializes calls on one
//! device: `handle_state`, `prepare_for_handle_state`, `clear_future` and
//! `make_ready` never overlap on the same instance.
//!
//! Devices are composed, not inherited: each embeds a
//! [`TimedDeviceBase`] (clock, event bus, committed-state log, lifecycle)
//! plus its own timed queue and executor.

mod base;
mod status;

pub use base::TimedDeviceBase;
pub use status::{DeviceStatus, StatusCode};

use crate::timeline::mapping::MappingTable;
use crate::timeline::TimelineSnapshot;

/// Where a device is in its lifecycle.
///
/// `Uninitialized → Initializing → Ready ↔ Disconnected → Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLifecycle {
    /// Constructed, not yet connected.
    Uninitialized,
    /// `init` is in progress.
    Initializing,
    /// Connected and accepting timeline state.
    Ready,
    /// Lost the connection; may recover to ready.
    Disconnected,
    /// Shut down for good.
    Terminated,
}

impl DeviceLifecycle {
    /// Returns `true` if the device has completed `init` and not terminated.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(self, Self::Ready | Self::Disconnected)
    }
}

/// The capability surface of one playout device.
///
/// All timeline times are absolute milliseconds on the engine clock.
#[allow(async_fn_in_trait)]
pub trait PlayoutDevice {
    /// Connects to the device (where applicable) and moves it to ready.
    ///
    /// Returns `true` on success and emits a `ConnectionChanged` event.
    ///
    /// # Errors
    ///
    /// Returns a connection or configuration error; the device stays
    /// uninitialized.
    async fn init(&mut self) -> crate::Result<bool>;

    /// Cancels queued commands at or after `time` and prunes old states.
    ///
    /// Idempotent; the conductor calls this ahead of [`handle_state`](Self::handle_state)
    /// when the timeline is revised, so commands for the revised span do
    /// not double-fire.
    fn prepare_for_handle_state(&mut self, time: i64);

    /// Projects the snapshot, diffs against the previous committed state,
    /// and enqueues the resulting commands.
    ///
    /// # Errors
    ///
    /// An invalid mapping aborts the pass: a warning is emitted and the
    /// committed-state log is left untouched, so the next pass retries
    /// from the same baseline.
    fn handle_state(
        &mut self,
        snapshot: &TimelineSnapshot,
        mappings: &MappingTable,
    ) -> crate::Result<()>;

    /// Removes queued commands strictly after `time`. Committed states are
    /// unaffected.
    fn clear_future(&mut self, time: i64);

    /// Brings the device to a known-good state ahead of going on air.
    ///
    /// With `ok_to_destroy`, the device may clear committed state and
    /// force a full resync.
    ///
    /// # Errors
    ///
    /// Returns an error if a make-ready command fails.
    async fn make_ready(&mut self, ok_to_destroy: bool) -> crate::Result<()>;

    /// Disposes the queue, disconnects, and moves to terminated.
    ///
    /// In-flight commands run to completion; their results are discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if disconnecting fails; the device is terminated
    /// regardless.
    async fn terminate(&mut self) -> crate::Result<bool>;

    /// Returns the device's current status.
    fn get_status(&self) -> DeviceStatus;

    /// Returns `true` while the underlying protocol client is connected.
    fn connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_initialized_positions() {
        assert!(DeviceLifecycle::Ready.is_initialized());
        assert!(DeviceLifecycle::Disconnected.is_initialized());
        assert!(!DeviceLifecycle::Uninitialized.is_initialized());
        assert!(!DeviceLifecycle::Initializing.is_initialized());
        assert!(!DeviceLifecycle::Terminated.is_initialized());
    }
}
