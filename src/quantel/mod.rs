// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Quantel video-server device.
//!
//! Drives ISA-managed video-server ports through a gateway: binds ports to
//! channels, loads clip fragments ahead of their play time, and cues jumps
//! so transitions land frame-accurately. The executor keeps a tracked
//! model of the server (ports, loaded fragments, staged jumps) that is
//! only updated after the gateway acknowledges an operation.

pub mod api;
mod executor;
pub mod state;

pub use api::{ClipInfo, Fragment, FragmentSet, PortStatus, QuantelGateway, ServerInfo};
pub use executor::{frames, LoadedRange, PortManager, TrackedPort, DEFAULT_FPS};
pub use state::{
    QuantelCommand, QuantelCommandPayload, QuantelState, QuantelStateClip, QuantelStatePort,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::device::{DeviceLifecycle, DeviceStatus, PlayoutDevice, TimedDeviceBase};
use crate::error::{Error, Result};
use crate::event::{DeviceEvent, EventBus};
use crate::queue::{QueueOptions, SendMode, TimedCommandQueue};
use crate::timeline::mapping::MappingTable;
use crate::timeline::TimelineSnapshot;

/// Connection identity of a [`QuantelDevice`]. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantelOptions {
    /// URL of the gateway fronting the ISA.
    pub gateway_url: String,
    /// URL of the ISA itself.
    pub isa_url: String,
    /// The zone the server lives in.
    pub zone_id: String,
    /// The server to control.
    pub server_id: i32,
}

impl QuantelOptions {
    fn validate(&self) -> Result<()> {
        let missing = if self.gateway_url.is_empty() {
            Some("gateway_url")
        } else if self.isa_url.is_empty() {
            Some("isa_url")
        } else if self.zone_id.is_empty() {
            Some("zone_id")
        } else if self.server_id == 0 {
            Some("server_id")
        } else {
            None
        };

        match missing {
            Some(field) => Err(Error::InvalidConfiguration(format!(
                "option {field} is required"
            ))),
            None => Ok(()),
        }
    }
}

/// Stateful video-server device.
pub struct QuantelDevice<G: QuantelGateway> {
    base: TimedDeviceBase<QuantelState>,
    manager: Arc<PortManager<G>>,
    queue: TimedCommandQueue<QuantelCommand, PortManager<G>>,
    options: QuantelOptions,
    gateway_connected: Arc<AtomicBool>,
    holds_state: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
}

impl<G: QuantelGateway> QuantelDevice<G> {
    /// Creates the device. Call [`init`](PlayoutDevice::init) before
    /// handing it timeline state.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        device_id: impl Into<String>,
        options: QuantelOptions,
        gateway: G,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        let manager = Arc::new(PortManager::new(gateway, Arc::clone(&clock)));
        let queue = TimedCommandQueue::new(
            SendMode::InOrder,
            Arc::clone(&clock),
            events.clone(),
            Arc::clone(&manager),
            QueueOptions::default(),
        );

        Self {
            base: TimedDeviceBase::new(device_id, clock, events),
            manager,
            queue,
            options,
            gateway_connected: Arc::new(AtomicBool::new(false)),
            holds_state: Arc::new(AtomicBool::new(false)),
            monitor: None,
        }
    }

    /// Returns the executor's tracked model for one port.
    pub async fn tracked_port(&self, port_id: &str) -> Option<TrackedPort> {
        self.manager.tracked_port(port_id).await
    }

    /// Returns a read-only snapshot of the queued commands.
    #[must_use]
    pub fn queued_commands(&self) -> Vec<crate::queue::QueuedCommandInfo> {
        self.queue.snapshot()
    }

    fn status_for(&self, connected: bool, active: bool) -> DeviceStatus {
        if connected {
            DeviceStatus::good(active)
        } else {
            DeviceStatus::bad(
                format!("disconnected from {}", self.options.gateway_url),
                active,
            )
        }
    }

    fn spawn_connection_monitor(&mut self) {
        let mut rx = self.manager.gateway().watch_connection();
        let events = self.base.events().clone();
        let connected = Arc::clone(&self.gateway_connected);
        let holds_state = Arc::clone(&self.holds_state);
        let gateway_url = self.options.gateway_url.clone();

        self.monitor = Some(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let is_connected = *rx.borrow_and_update();
                connected.store(is_connected, Ordering::Release);

                let active = holds_state.load(Ordering::Acquire);
                let status = if is_connected {
                    DeviceStatus::good(active)
                } else {
                    tracing::warn!(gateway = %gateway_url, "gateway connection lost");
                    DeviceStatus::bad(format!("disconnected from {gateway_url}"), active)
                };
                events.publish(DeviceEvent::ConnectionChanged { status });
            }
        }));
    }
}

impl<G: QuantelGateway> PlayoutDevice for QuantelDevice<G> {
    async fn init(&mut self) -> Result<bool> {
        self.options.validate()?;
        self.base.set_lifecycle(DeviceLifecycle::Initializing);

        if let Err(err) = self.manager.gateway().connect().await {
            self.base.set_lifecycle(DeviceLifecycle::Uninitialized);
            return Err(Error::Connection(err.to_string()));
        }

        let server = match self.manager.gateway().get_server().await {
            Ok(server) => server,
            Err(err) => {
                self.base.set_lifecycle(DeviceLifecycle::Uninitialized);
                return Err(Error::Connection(err.to_string()));
            }
        };
        if server.down {
            self.base.set_lifecycle(DeviceLifecycle::Uninitialized);
            return Err(Error::Connection(format!(
                "server {} is down",
                self.options.server_id
            )));
        }

        self.gateway_connected.store(true, Ordering::Release);
        self.spawn_connection_monitor();
        self.base.set_lifecycle(DeviceLifecycle::Ready);
        self.base.events().publish(DeviceEvent::ConnectionChanged {
            status: self.status_for(true, false),
        });
        Ok(true)
    }

    fn prepare_for_handle_state(&mut self, time: i64) {
        self.queue.clear_now_and_after(time);
        self.base.clean_up_states(0, time);
    }

    fn handle_state(
        &mut self,
        snapshot: &TimelineSnapshot,
        mappings: &MappingTable,
    ) -> Result<()> {
        self.base.ensure_operational()?;
        let started = self.base.now_ms();

        let baseline = self.base.baseline_time(snapshot.time);
        let (old_time, old_state) = self
            .base
            .state_before(baseline)
            .map(|(t, s)| (t, s.clone()))
            .unwrap_or((0, QuantelState::default()));

        let new_state = match state::project(snapshot, mappings, self.base.device_id()) {
            Ok(state) => state,
            Err(err) => {
                self.base
                    .events()
                    .publish(DeviceEvent::warning(format!("state discarded: {err}")));
                return Err(err.into());
            }
        };

        for command in state::diff(&old_state, old_time, &new_state, snapshot.time) {
            self.queue.queue(command)?;
        }
        self.base.commit_state(new_state, snapshot.time);
        self.holds_state.store(true, Ordering::Release);
        self.base.publish_time_trace("handleState", started);
        Ok(())
    }

    fn clear_future(&mut self, time: i64) {
        self.queue.clear_after(time);
    }

    async fn make_ready(&mut self, ok_to_destroy: bool) -> Result<()> {
        if !ok_to_destroy {
            return Ok(());
        }

        // Full resync: forget everything and let the next timeline pass
        // rebuild ports and loads from scratch.
        self.base.clear_states();
        self.manager.reset().await;
        self.holds_state.store(false, Ordering::Release);
        self.base.events().publish(DeviceEvent::ResetResolver);
        Ok(())
    }

    async fn terminate(&mut self) -> Result<bool> {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
        self.queue.dispose();

        let disconnect = self.manager.gateway().disconnect().await;
        self.gateway_connected.store(false, Ordering::Release);
        self.holds_state.store(false, Ordering::Release);
        self.base.set_lifecycle(DeviceLifecycle::Terminated);
        self.base.events().publish(DeviceEvent::ConnectionChanged {
            status: self.get_status(),
        });

        disconnect.map_err(|err| Error::Connection(err.to_string()))?;
        Ok(true)
    }

    fn get_status(&self) -> DeviceStatus {
        let active = self.holds_state.load(Ordering::Acquire);
        match self.base.lifecycle() {
            DeviceLifecycle::Terminated => DeviceStatus::bad("terminated", active),
            DeviceLifecycle::Uninitialized | DeviceLifecycle::Initializing => {
                DeviceStatus::bad("not initialized", active)
            }
            DeviceLifecycle::Ready | DeviceLifecycle::Disconnected => {
                self.status_for(self.gateway_connected.load(Ordering::Acquire), active)
            }
        }
    }

    fn connected(&self) -> bool {
        self.base.lifecycle().is_initialized()
            && self.gateway_connected.load(Ordering::Acquire)
    }
}

impl<G: QuantelGateway> std::fmt::Debug for QuantelDevice<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantelDevice")
            .field("device_id", &self.base.device_id())
            .field("lifecycle", &self.base.lifecycle())
            .field(
                "gateway_connected",
                &self.gateway_connected.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> QuantelOptions {
        QuantelOptions {
            gateway_url: "http://gateway:8080".to_string(),
            isa_url: "http://isa:2096".to_string(),
            zone_id: "default".to_string(),
            server_id: 1100,
        }
    }

    #[test]
    fn complete_options_validate() {
        assert!(options().validate().is_ok());
    }

    #[test]
    fn each_option_is_required() {
        let mut o = options();
        o.gateway_url.clear();
        assert!(o.validate().is_err());

        let mut o = options();
        o.isa_url.clear();
        assert!(o.validate().is_err());

        let mut o = options();
        o.zone_id.clear();
        assert!(o.validate().is_err());

        let mut o = options();
        o.server_id = 0;
        assert!(matches!(
            o.validate(),
            Err(Error::InvalidConfiguration(msg)) if msg.contains("server_id")
        ));
    }
}
