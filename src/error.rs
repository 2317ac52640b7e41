// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the statecast engine.
//!
//! This module provides the error hierarchy used across the engine:
//! connection and lifecycle failures, timeline projection failures,
//! transport-level failures (with a retryable network class), and
//! tracked-state corruption.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Initial connect failed or the device dropped mid-flight.
    #[error("connection error: {0}")]
    Connection(String),

    /// A timeline layer could not be projected onto the device.
    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),

    /// A protocol collaborator failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The executor's belief about the external device is inconsistent.
    #[error("tracked state error: {0}")]
    TrackedState(#[from] TrackedStateError),

    /// Device options are missing or invalid.
    #[error("invalid device configuration: {0}")]
    InvalidConfiguration(String),

    /// An operation requires the device to be initialized first.
    #[error("device is not initialized")]
    NotInitialized,

    /// The device has been terminated and accepts no further operations.
    #[error("device is terminated")]
    Terminated,

    /// The timed queue has been disposed and accepts no further commands.
    #[error("command queue is disposed")]
    QueueDisposed,

    /// A command kind the executor does not understand.
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),
}

/// Errors raised while projecting a timeline snapshot onto a device state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// A layer's mapping cannot be placed on this device.
    #[error("invalid mapping for layer {layer}: {reason}")]
    InvalidMapping {
        /// The timeline layer that failed to project.
        layer: String,
        /// Why the mapping is unusable.
        reason: String,
    },

    /// A layer mapped to this device carries content of another device kind.
    #[error("layer {layer} carries content unusable by this device")]
    ContentMismatch {
        /// The timeline layer that failed to project.
        layer: String,
    },
}

/// Errors raised by protocol collaborators.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Transient socket-class failure; retryable when a resend time is
    /// configured on the device.
    #[error("network error ({kind}): {message}")]
    Network {
        /// The socket-class failure that occurred.
        kind: NetworkErrorKind,
        /// Human-readable description.
        message: String,
    },

    /// The device replied with something the executor did not expect.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote resource does not exist (e.g. a port already released).
    #[error("not found: {0}")]
    NotFound(String),

    /// HTTP request failed below the protocol level.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    /// Returns `true` if a retry has a chance of succeeding.
    ///
    /// Only the transient socket-class failures qualify; protocol errors
    /// and missing resources do not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// The transient socket-class failures eligible for a bounded retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// The request timed out.
    Timeout,
    /// The peer reset the connection.
    ConnectionReset,
    /// The local address is already in use.
    AddressInUse,
    /// The peer refused the connection.
    ConnectionRefused,
    /// The pipe broke mid-transfer.
    BrokenPipe,
    /// Name resolution found no such host.
    HostNotFound,
    /// The network is unreachable.
    NetworkUnreachable,
    /// The host is unreachable.
    HostUnreachable,
    /// Name resolution failed temporarily.
    DnsTemporaryFailure,
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Timeout => "ETIMEDOUT",
            Self::ConnectionReset => "ECONNRESET",
            Self::AddressInUse => "EADDRINUSE",
            Self::ConnectionRefused => "ECONNREFUSED",
            Self::BrokenPipe => "EPIPE",
            Self::HostNotFound => "ENOTFOUND",
            Self::NetworkUnreachable => "ENETUNREACH",
            Self::HostUnreachable => "EHOSTUNREACH",
            Self::DnsTemporaryFailure => "EAI_AGAIN",
        };
        f.write_str(name)
    }
}

/// Errors raised when the executor's tracked model disagrees with reality.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackedStateError {
    /// A command referenced a port the executor is not tracking.
    #[error("port {0} is not tracked")]
    UnknownPort(String),

    /// A clip reference resolved to nothing on the server.
    #[error("clip not found: {0}")]
    ClipNotFound(String),

    /// The clip exists but lives on a pool the server cannot see.
    #[error("clip {clip} is on pool {pool}, which the server cannot access")]
    ClipNotAccessible {
        /// The clip reference.
        clip: String,
        /// The pool the clip lives on.
        pool: i32,
    },

    /// A playback command arrived before its fragments were loaded.
    #[error("no fragments loaded on port {port} for clip {clip}")]
    FragmentsNotLoaded {
        /// The port the command targeted.
        port: String,
        /// The clip reference.
        clip: String,
    },
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_error_display() {
        let err = ProjectionError::InvalidMapping {
            layer: "L1".to_string(),
            reason: "no channel bound to port".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid mapping for layer L1: no channel bound to port"
        );
    }

    #[test]
    fn network_error_is_retryable() {
        let err = TransportError::Network {
            kind: NetworkErrorKind::ConnectionReset,
            message: "reset by peer".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn protocol_error_is_not_retryable() {
        let err = TransportError::Protocol("unexpected status".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn network_kind_uses_errno_names() {
        assert_eq!(NetworkErrorKind::Timeout.to_string(), "ETIMEDOUT");
        assert_eq!(
            NetworkErrorKind::DnsTemporaryFailure.to_string(),
            "EAI_AGAIN"
        );
    }

    #[test]
    fn error_from_tracked_state_error() {
        let err: Error = TrackedStateError::UnknownPort("P1".to_string()).into();
        assert!(matches!(
            err,
            Error::TrackedState(TrackedStateError::UnknownPort(_))
        ));
    }
}
