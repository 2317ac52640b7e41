// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `statecast` - a timeline state resolver for live playout devices.
//!
//! Given a declarative timeline (objects pinned to absolute times, mapped
//! to logical output layers of playout hardware), this library continuously
//! reconciles the desired state with the actual state of each device by
//! computing the minimum set of commands and dispatching them at precise
//! moments.
//!
//! # Architecture
//!
//! Per device, the engine stacks five components:
//!
//! 1. A **timed queue** ([`queue::TimedCommandQueue`]) fires commands at
//!    their absolute times, serializing per resource or bursting.
//! 2. A **state store** ([`store::StateStore`]) logs committed device
//!    states so revisions diff against the right baseline.
//! 3. A **projector** maps the timeline snapshot onto a device-native
//!    state shape via the mapping table.
//! 4. A **differ** turns consecutive states into ordered commands,
//!    scheduling prepare-ahead work earlier than the transition.
//! 5. An **executor** interprets commands against a tracked model of the
//!    external device and drives the protocol collaborator.
//!
//! A device façade ([`device::PlayoutDevice`]) binds these together and
//! exposes the lifecycle to the conductor.
//!
//! # Devices
//!
//! Two reference devices ship with the engine:
//!
//! - [`http::HttpSendDevice`]: stateless; layers map to one-shot HTTP
//!   requests fired when their content appears or changes.
//! - [`quantel::QuantelDevice`]: stateful; layers map to video-server
//!   ports with clip fragments loaded ahead of frame-accurate transitions.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use statecast::clock::TokioClock;
//! use statecast::device::PlayoutDevice;
//! use statecast::event::EventBus;
//! use statecast::http::{HttpSendDevice, HttpSendOptions, ReqwestTransport};
//! use statecast::timeline::mapping::{self, MappingTable};
//! use statecast::timeline::TimelineSnapshot;
//!
//! #[tokio::main]
//! async fn main() -> statecast::Result<()> {
//!     let events = EventBus::new();
//!     let mut device = HttpSendDevice::new(
//!         "http0",
//!         HttpSendOptions::default(),
//!         ReqwestTransport::new()?,
//!         Arc::new(TokioClock::new()),
//!         events.clone(),
//!     );
//!     device.init().await?;
//!
//!     let mut mappings = MappingTable::new();
//!     mappings.insert("L1".to_string(), mapping::http_send("http0"));
//!
//!     // Feed resolved snapshots as the timeline changes.
//!     let snapshot = TimelineSnapshot::empty(0);
//!     device.handle_state(&snapshot, &mappings)?;
//!     Ok(())
//! }
//! ```
//!
//! # Timing
//!
//! All components take an injected [`clock::Clock`]; nothing reads the
//! wall clock directly. Tests run under paused tokio time and control
//! "now" exactly.

pub mod cache;
pub mod clock;
pub mod device;
pub mod error;
pub mod event;
pub mod http;
pub mod quantel;
pub mod queue;
pub mod resolve;
pub mod store;
pub mod timeline;

pub use device::{DeviceLifecycle, DeviceStatus, PlayoutDevice, StatusCode, TimedDeviceBase};
pub use error::{
    Error, NetworkErrorKind, ProjectionError, Result, TrackedStateError, TransportError,
};
pub use event::{CommandReport, DeviceEvent, EventBus};
pub use queue::{CommandExecutor, QueueOptions, SendMode, TimedCommandQueue};
pub use store::StateStore;
pub use timeline::{ResolvedObject, TimelineContent, TimelineSnapshot};
