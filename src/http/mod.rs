// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stateless HTTP send device.
//!
//! Maps timeline layers to one-shot HTTP requests: when a layer's content
//! appears or changes, the corresponding request fires at the transition
//! time. The device keeps no remote state; a per-layer fingerprint of the
//! last-sent request protects against re-fires when overlapping timeline
//! revisions enqueue the same command twice.

pub mod state;
mod transport;

pub use state::{HttpCommand, HttpCommandKind, HttpSendLayer, HttpSendState};
pub use transport::{HttpMethod, HttpResponse, HttpTransport, ReqwestTransport};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::device::{
    DeviceLifecycle, DeviceStatus, PlayoutDevice, TimedDeviceBase,
};
use crate::error::{Error, Result};
use crate::event::{DeviceEvent, EventBus};
use crate::queue::{
    CommandExecutor, CommandFuture, QueueOptions, SendMode, TimedCommandQueue,
};
use crate::timeline::mapping::MappingTable;
use crate::timeline::{HttpRequestContent, TimelineSnapshot};

/// A request replayed during `make_ready`.
#[derive(Debug, Clone, PartialEq)]
pub struct MakeReadyRequest {
    /// The request method.
    pub method: HttpMethod,
    /// The request content.
    pub content: HttpRequestContent,
}

/// Configuration of an [`HttpSendDevice`].
#[derive(Debug, Clone, Default)]
pub struct HttpSendOptions {
    /// Minimum wait between attempts for retryable network failures, in
    /// milliseconds. Values of 1 or less disable the retry.
    pub resend_time: Option<i64>,
    /// Requests replayed on `make_ready(true)`.
    pub make_ready_commands: Vec<MakeReadyRequest>,
    /// Whether `make_ready(true)` also clears committed state, forcing a
    /// full resync on the next timeline pass.
    pub make_ready_does_reset: bool,
}

/// Executor for the send device: fires requests, keeps the per-layer
/// fingerprints, and applies the bounded network retry.
#[derive(Debug)]
pub struct HttpCommandSender<T> {
    transport: T,
    clock: Arc<dyn Clock>,
    events: EventBus,
    resend_time: Option<i64>,
    fingerprints: Mutex<HashMap<String, (HttpMethod, HttpRequestContent)>>,
}

impl<T: HttpTransport> HttpCommandSender<T> {
    fn new(
        transport: T,
        clock: Arc<dyn Clock>,
        events: EventBus,
        resend_time: Option<i64>,
    ) -> Self {
        Self {
            transport,
            clock,
            events,
            resend_time,
            fingerprints: Mutex::new(HashMap::new()),
        }
    }

    /// Forgets all per-layer fingerprints.
    fn clear_fingerprints(&self) {
        self.fingerprints
            .lock()
            .expect("fingerprints poisoned")
            .clear();
    }

    async fn handle(&self, command: HttpCommand) -> Result<()> {
        if command.kind == HttpCommandKind::Removed {
            self.fingerprints
                .lock()
                .expect("fingerprints poisoned")
                .remove(&command.layer);
            return Ok(());
        }

        // Relevance check: an overlapping timeline revision may enqueue the
        // same request twice; only the first send goes out.
        let unchanged = {
            let fingerprints = self.fingerprints.lock().expect("fingerprints poisoned");
            fingerprints.get(&command.layer)
                == Some(&(command.method, command.content.clone()))
        };
        if unchanged {
            tracing::debug!(layer = %command.layer, "request unchanged since last send, skipping");
            self.events.publish(DeviceEvent::debug(format!(
                "unchanged request on layer {}, skipping",
                command.layer
            )));
            return Ok(());
        }

        self.send_with_retry(command.method, &command.content).await?;

        self.fingerprints
            .lock()
            .expect("fingerprints poisoned")
            .insert(command.layer, (command.method, command.content));
        Ok(())
    }

    /// Fires the request; on a retryable network failure with a configured
    /// resend time, waits out the remainder of that time and retries once.
    async fn send_with_retry(
        &self,
        method: HttpMethod,
        content: &HttpRequestContent,
    ) -> Result<()> {
        let started = self.clock.now_ms();
        let first = self.send_once(method, content).await;

        let Err(err) = first else {
            return Ok(());
        };

        if !err.is_retryable() {
            return Err(err.into());
        }
        let Some(resend_time) = self.resend_time.filter(|t| *t > 1) else {
            return Err(err.into());
        };

        let elapsed = self.clock.now_ms() - started;
        let wait = (resend_time - elapsed).max(0);
        tracing::debug!(%method, url = %content.url, wait, "retrying after network error");
        tokio::time::sleep(Duration::from_millis(u64::try_from(wait).unwrap_or(0))).await;

        // One retry wave per failure; a second failure surfaces.
        self.send_once(method, content).await.map_err(Error::from)
    }

    async fn send_once(
        &self,
        method: HttpMethod,
        content: &HttpRequestContent,
    ) -> std::result::Result<(), crate::error::TransportError> {
        let response = self
            .transport
            .http_request(method, &content.url, &content.params)
            .await?;

        if !response.is_success() {
            // A reachable endpoint that dislikes the request is a
            // degradation, not a failure.
            tracing::warn!(%method, url = %content.url, status = response.status_code, "non-2xx response");
            self.events.publish(DeviceEvent::warning(format!(
                "HTTP {} on {} {}",
                response.status_code, method, content.url
            )));
        }
        Ok(())
    }
}

impl<T: HttpTransport> CommandExecutor<HttpCommand> for HttpCommandSender<T> {
    fn execute(&self, command: HttpCommand) -> CommandFuture<'_> {
        Box::pin(self.handle(command))
    }
}

/// Stateless HTTP request sender device.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use statecast::clock::TokioClock;
/// use statecast::device::PlayoutDevice;
/// use statecast::event::EventBus;
/// use statecast::http::{HttpSendDevice, HttpSendOptions, ReqwestTransport};
///
/// # async fn example() -> statecast::Result<()> {
/// let transport = ReqwestTransport::new()?;
/// let mut device = HttpSendDevice::new(
///     "http0",
///     HttpSendOptions::default(),
///     transport,
///     Arc::new(TokioClock::new()),
///     EventBus::new(),
/// );
/// device.init().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HttpSendDevice<T: HttpTransport> {
    base: TimedDeviceBase<HttpSendState>,
    sender: Arc<HttpCommandSender<T>>,
    queue: TimedCommandQueue<HttpCommand, HttpCommandSender<T>>,
    make_ready_commands: Vec<MakeReadyRequest>,
    make_ready_does_reset: bool,
}

impl<T: HttpTransport> HttpSendDevice<T> {
    /// Creates the device. Call [`init`](PlayoutDevice::init) before
    /// handing it timeline state.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        device_id: impl Into<String>,
        options: HttpSendOptions,
        transport: T,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        let sender = Arc::new(HttpCommandSender::new(
            transport,
            Arc::clone(&clock),
            events.clone(),
            options.resend_time,
        ));
        let queue = TimedCommandQueue::new(
            SendMode::InOrder,
            Arc::clone(&clock),
            events.clone(),
            Arc::clone(&sender),
            QueueOptions::default(),
        );

        Self {
            base: TimedDeviceBase::new(device_id, clock, events),
            sender,
            queue,
            make_ready_commands: options.make_ready_commands,
            make_ready_does_reset: options.make_ready_does_reset,
        }
    }

    /// Returns a read-only snapshot of the queued commands.
    #[must_use]
    pub fn queued_commands(&self) -> Vec<crate::queue::QueuedCommandInfo> {
        self.queue.snapshot()
    }
}

impl<T: HttpTransport> PlayoutDevice for HttpSendDevice<T> {
    async fn init(&mut self) -> Result<bool> {
        self.base.set_lifecycle(DeviceLifecycle::Initializing);
        // Stateless device: there is no connection to establish.
        self.base.set_lifecycle(DeviceLifecycle::Ready);
        self.base.events().publish(DeviceEvent::ConnectionChanged {
            status: self.get_status(),
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
        let old_state = self
            .base
            .state_before(baseline)
            .map(|(_, s)| s.clone())
            .unwrap_or_default();

        let new_state = match state::project(snapshot, mappings, self.base.device_id()) {
            Ok(state) => state,
            Err(err) => {
                self.base
                    .events()
                    .publish(DeviceEvent::warning(format!("state discarded: {err}")));
                return Err(err.into());
            }
        };

        for command in state::diff(&old_state, &new_state, snapshot.time) {
            self.queue.queue(command)?;
        }
        self.base.commit_state(new_state, snapshot.time);
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

        for request in &self.make_ready_commands {
            self.sender
                .send_with_retry(request.method, &request.content)
                .await?;
        }
        if self.make_ready_does_reset {
            self.base.clear_states();
            self.sender.clear_fingerprints();
        }
        Ok(())
    }

    async fn terminate(&mut self) -> Result<bool> {
        self.queue.dispose();
        self.base.set_lifecycle(DeviceLifecycle::Terminated);
        self.base.events().publish(DeviceEvent::ConnectionChanged {
            status: self.get_status(),
        });
        Ok(true)
    }

    fn get_status(&self) -> DeviceStatus {
        let active = self.base.has_committed_state();
        match self.base.lifecycle() {
            DeviceLifecycle::Ready => DeviceStatus::good(active),
            DeviceLifecycle::Terminated => DeviceStatus::bad("terminated", active),
            DeviceLifecycle::Disconnected => DeviceStatus::bad("disconnected", active),
            DeviceLifecycle::Uninitialized | DeviceLifecycle::Initializing => {
                DeviceStatus::bad("not initialized", active)
            }
        }
    }

    fn connected(&self) -> bool {
        self.base.lifecycle() == DeviceLifecycle::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::device::StatusCode;

    #[derive(Debug, Default)]
    struct NullTransport;

    impl HttpTransport for NullTransport {
        async fn http_request(
            &self,
            _method: HttpMethod,
            _url: &str,
            _params: &serde_json::Value,
        ) -> std::result::Result<HttpResponse, crate::error::TransportError> {
            Ok(HttpResponse {
                status_code: 200,
                body: String::new(),
            })
        }
    }

    fn device() -> HttpSendDevice<NullTransport> {
        HttpSendDevice::new(
            "http0",
            HttpSendOptions::default(),
            NullTransport,
            Arc::new(TokioClock::with_epoch(0)),
            EventBus::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn uninitialized_device_rejects_state() {
        let mut device = device();
        let snapshot = TimelineSnapshot::empty(1000);
        let mappings = MappingTable::new();

        assert!(device.handle_state(&snapshot, &mappings).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn init_makes_the_device_ready() {
        let mut device = device();
        assert!(device.init().await.unwrap());
        assert!(device.connected());
        assert_eq!(device.get_status().status_code, StatusCode::Good);
    }

    #[tokio::test(start_paused = true)]
    async fn terminate_disposes_the_queue() {
        let mut device = device();
        device.init().await.unwrap();
        assert!(device.terminate().await.unwrap());

        assert!(!device.connected());
        assert_eq!(device.get_status().status_code, StatusCode::Bad);

        let snapshot = TimelineSnapshot::empty(1000);
        assert!(device.handle_state(&snapshot, &MappingTable::new()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_active_after_commit() {
        let mut device = device();
        device.init().await.unwrap();
        assert!(!device.get_status().active);

        let snapshot = TimelineSnapshot::empty(1000);
        device.handle_state(&snapshot, &MappingTable::new()).unwrap();
        assert!(device.get_status().active);
    }
}
