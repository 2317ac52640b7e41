// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bindings from timeline layers to device outputs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ControlMode;

/// All layer-to-device bindings known to the engine.
pub type MappingTable = HashMap<String, Mapping>;

/// The kinds of playout device the engine can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Stateless HTTP request sender.
    HttpSend,
    /// Quantel video server.
    Quantel,
}

/// Binding from one timeline layer to one device output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    /// The device kind this layer drives.
    pub device: DeviceKind,
    /// The id of the device instance this layer drives.
    pub device_id: String,
    /// Device-specific binding details.
    pub spec: MappingSpec,
}

impl Mapping {
    /// Returns `true` if this mapping targets the given device.
    #[must_use]
    pub fn matches(&self, kind: DeviceKind, device_id: &str) -> bool {
        self.device == kind && self.device_id == device_id
    }
}

/// Device-specific part of a [`Mapping`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MappingSpec {
    /// HTTP layers need no extra binding; the content carries the URL.
    HttpSend,
    /// Video-server layers bind to a port and its channels.
    Quantel(QuantelMapping),
}

/// Binding of a timeline layer onto a video-server port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantelMapping {
    /// The port this layer plays out on.
    pub port_id: String,
    /// SDI channels assigned to the port. Only the first channel is used.
    pub channel_ids: Vec<u16>,
    /// Control mode for transitions on this port.
    #[serde(default)]
    pub mode: Option<ControlMode>,
}

impl QuantelMapping {
    /// Creates a mapping of a port to a single channel.
    #[must_use]
    pub fn new(port_id: impl Into<String>, channel: u16) -> Self {
        Self {
            port_id: port_id.into(),
            channel_ids: vec![channel],
            mode: None,
        }
    }

    /// Sets the control mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ControlMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Convenience constructor for an HTTP layer mapping.
#[must_use]
pub fn http_send(device_id: impl Into<String>) -> Mapping {
    Mapping {
        device: DeviceKind::HttpSend,
        device_id: device_id.into(),
        spec: MappingSpec::HttpSend,
    }
}

/// Convenience constructor for a video-server layer mapping.
#[must_use]
pub fn quantel(device_id: impl Into<String>, spec: QuantelMapping) -> Mapping {
    Mapping {
        device: DeviceKind::Quantel,
        device_id: device_id.into(),
        spec: MappingSpec::Quantel(spec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_matches_kind_and_device() {
        let mapping = http_send("http0");

        assert!(mapping.matches(DeviceKind::HttpSend, "http0"));
        assert!(!mapping.matches(DeviceKind::HttpSend, "http1"));
        assert!(!mapping.matches(DeviceKind::Quantel, "http0"));
    }

    #[test]
    fn quantel_mapping_carries_port_and_channel() {
        let mapping = quantel("q0", QuantelMapping::new("P1", 2));

        let MappingSpec::Quantel(spec) = &mapping.spec else {
            panic!("expected a quantel mapping spec");
        };
        assert_eq!(spec.port_id, "P1");
        assert_eq!(spec.channel_ids, vec![2]);
        assert!(spec.mode.is_none());
    }

    #[test]
    fn quantel_mapping_mode_builder() {
        let spec = QuantelMapping::new("P1", 1).with_mode(ControlMode::Speed);
        assert_eq!(spec.mode, Some(ControlMode::Speed));
    }
}
