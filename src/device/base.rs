// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared plumbing for device implementations.

use std::sync::Arc;

use crate::clock::Clock;
use crate::event::{DeviceEvent, EventBus};
use crate::store::StateStore;

use super::DeviceLifecycle;

/// Common state every timed device composes: identity, clock, event bus,
/// the committed-state log, and the lifecycle position.
///
/// Devices embed this struct and delegate; there is no inheritance between
/// device kinds.
#[derive(Debug)]
pub struct TimedDeviceBase<S> {
    device_id: String,
    clock: Arc<dyn Clock>,
    events: EventBus,
    store: StateStore<S>,
    lifecycle: DeviceLifecycle,
}

impl<S: Clone> TimedDeviceBase<S> {
    /// Creates the base for a device.
    #[must_use]
    pub fn new(device_id: impl Into<String>, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            device_id: device_id.into(),
            clock,
            events,
            store: StateStore::new(),
            lifecycle: DeviceLifecycle::Uninitialized,
        }
    }

    /// Returns the device id.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the injected clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the current engine time in milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Returns the device's event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Returns the current lifecycle position.
    #[must_use]
    pub fn lifecycle(&self) -> DeviceLifecycle {
        self.lifecycle
    }

    /// Moves the device to a new lifecycle position.
    pub fn set_lifecycle(&mut self, lifecycle: DeviceLifecycle) {
        self.lifecycle = lifecycle;
    }

    /// Returns an error if the device cannot accept timeline operations.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`](crate::Error::NotInitialized) before `init`,
    /// [`Error::Terminated`](crate::Error::Terminated) after `terminate`.
    pub fn ensure_operational(&self) -> crate::Result<()> {
        match self.lifecycle {
            DeviceLifecycle::Terminated => Err(crate::Error::Terminated),
            DeviceLifecycle::Uninitialized | DeviceLifecycle::Initializing => {
                Err(crate::Error::NotInitialized)
            }
            DeviceLifecycle::Ready | DeviceLifecycle::Disconnected => Ok(()),
        }
    }

    /// The diffing baseline for a snapshot: never earlier than now, so a
    /// snapshot timestamped in the past still diffs against the newest
    /// committed state.
    #[must_use]
    pub fn baseline_time(&self, snapshot_time: i64) -> i64 {
        self.now_ms().max(snapshot_time)
    }

    /// Returns the newest committed state strictly before `time`.
    #[must_use]
    pub fn state_before(&self, time: i64) -> Option<(i64, &S)> {
        self.store.get_state_before(time)
    }

    /// Commits a projected state at its snapshot time.
    pub fn commit_state(&mut self, state: S, time: i64) {
        self.store.set_state(state, time);
    }

    /// Prunes committed states below `up_to`, keeping the diffing baseline.
    pub fn clean_up_states(&mut self, min_age: i64, up_to: i64) {
        self.store.clean_up_states(min_age, up_to);
    }

    /// Drops all committed states.
    pub fn clear_states(&mut self) {
        self.store.clear_states();
    }

    /// Returns `true` if the device holds at least one committed state.
    #[must_use]
    pub fn has_committed_state(&self) -> bool {
        !self.store.is_empty()
    }

    /// Publishes a measurement of an internal operation.
    pub fn publish_time_trace(&self, trace: impl Into<String>, started_at_ms: i64) {
        self.events.publish(DeviceEvent::TimeTrace {
            trace: trace.into(),
            elapsed_ms: self.now_ms() - started_at_ms,
        });
    }
}
