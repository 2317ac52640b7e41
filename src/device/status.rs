// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device status reporting.

/// Coarse health of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// Connected and operating normally.
    Good,
    /// Operating with a transient degradation.
    Warning,
    /// Not usable, e.g. disconnected or terminated.
    Bad,
}

/// Status reported by [`PlayoutDevice::get_status`](super::PlayoutDevice::get_status).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Coarse health.
    pub status_code: StatusCode,
    /// Human-readable causes for a non-good status.
    pub messages: Vec<String>,
    /// Whether the device currently holds a committed timeline state.
    pub active: bool,
}

impl DeviceStatus {
    /// Creates a good status.
    #[must_use]
    pub fn good(active: bool) -> Self {
        Self {
            status_code: StatusCode::Good,
            messages: Vec::new(),
            active,
        }
    }

    /// Creates a warning status with a cause.
    #[must_use]
    pub fn warning(message: impl Into<String>, active: bool) -> Self {
        Self {
            status_code: StatusCode::Warning,
            messages: vec![message.into()],
            active,
        }
    }

    /// Creates a bad status with a cause.
    #[must_use]
    pub fn bad(message: impl Into<String>, active: bool) -> Self {
        Self {
            status_code: StatusCode::Bad,
            messages: vec![message.into()],
            active,
        }
    }

    /// Returns `true` if the status is good.
    #[must_use]
    pub fn is_good(&self) -> bool {
        self.status_code == StatusCode::Good
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn good_status_has_no_messages() {
        let status = DeviceStatus::good(true);
        assert!(status.is_good());
        assert!(status.messages.is_empty());
        assert!(status.active);
    }

    #[test]
    fn bad_status_carries_a_cause() {
        let status = DeviceStatus::bad("disconnected from gateway", false);
        assert_eq!(status.status_code, StatusCode::Bad);
        assert_eq!(status.messages, vec!["disconnected from gateway"]);
        assert!(!status.is_good());
    }
}
