// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device event signals.
//!
//! Each device owns an [`EventBus`] the conductor subscribes to. Events
//! cover command failures, status changes, and diagnostics; none of them
//! require a response.

mod device_event;
mod event_bus;

pub use device_event::{CommandReport, DeviceEvent};
pub use event_bus::EventBus;
