// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device event types.

use crate::device::DeviceStatus;

/// Identifies the command a failure report refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    /// The timeline object the command was derived from.
    pub timeline_obj_id: String,
    /// Human-readable diagnostic context.
    pub context: String,
}

/// Events emitted by a device.
///
/// Failures that concern a single command carry a [`CommandReport`] so the
/// conductor can correlate them with the timeline; the queue keeps running
/// after any of them.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A failure not tied to a single command (connection loss, corrupted
    /// tracked state).
    Error {
        /// Where the failure happened.
        context: String,
        /// The failure description.
        error: String,
    },

    /// A degradation that does not stop the device.
    Warning {
        /// The warning text.
        message: String,
    },

    /// A command failed to execute; the queue continues.
    CommandError {
        /// The failure description.
        error: String,
        /// The command that failed.
        command: CommandReport,
    },

    /// Diagnostic traffic, e.g. a command about to be dispatched.
    Debug {
        /// The diagnostic text.
        message: String,
    },

    /// The device's connection status changed.
    ConnectionChanged {
        /// The new status.
        status: DeviceStatus,
    },

    /// The device wants the conductor to re-resolve and resend the timeline.
    ResetResolver,

    /// A command took longer than the configured threshold to complete.
    SlowCommand {
        /// Description of the slow command and its timing.
        message: String,
    },

    /// Timing measurement of an internal operation.
    TimeTrace {
        /// The measured operation.
        trace: String,
        /// How long it took, in milliseconds.
        elapsed_ms: i64,
    },
}

impl DeviceEvent {
    /// Creates an error event.
    #[must_use]
    pub fn error(context: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::Error {
            context: context.into(),
            error: error.to_string(),
        }
    }

    /// Creates a warning event.
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }

    /// Creates a command error event.
    #[must_use]
    pub fn command_error(error: impl std::fmt::Display, command: CommandReport) -> Self {
        Self::CommandError {
            error: error.to_string(),
            command,
        }
    }

    /// Creates a debug event.
    #[must_use]
    pub fn debug(message: impl Into<String>) -> Self {
        Self::Debug {
            message: message.into(),
        }
    }

    /// Returns `true` if this event reports a failure of any kind.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::CommandError { .. })
    }

    /// Returns `true` if this is a connection status event.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::ConnectionChanged { .. })
    }
}
