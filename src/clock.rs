// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Injected time source.
//!
//! Every component that needs "now" receives an `Arc<dyn Clock>` instead of
//! reading the wall clock, so tests running under paused tokio time are
//! fully deterministic.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A monotonic millisecond time source.
pub trait Clock: fmt::Debug + Send + Sync {
    /// Returns the current engine time in milliseconds.
    ///
    /// The value is monotonic for the lifetime of the clock; the epoch is
    /// implementation-defined.
    fn now_ms(&self) -> i64;
}

/// Clock backed by the tokio runtime.
///
/// Pairs a fixed epoch with [`tokio::time::Instant`], so the clock advances
/// with tokio's virtual time when tests run with `start_paused = true`.
///
/// # Examples
///
/// ```no_run
/// use statecast::clock::{Clock, TokioClock};
///
/// # async fn example() {
/// let clock = TokioClock::new();
/// let now = clock.now_ms();
/// # let _ = now;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokioClock {
    epoch_ms: i64,
    started: tokio::time::Instant,
}

impl TokioClock {
    /// Creates a clock whose epoch is the current wall-clock time.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self::with_epoch(epoch_ms)
    }

    /// Creates a clock with a fixed epoch, in milliseconds.
    ///
    /// Useful in tests to pin "now" to a known value: under paused tokio
    /// time, `now_ms()` starts at `epoch_ms` and advances only when the
    /// test advances time.
    #[must_use]
    pub fn with_epoch(epoch_ms: i64) -> Self {
        Self {
            epoch_ms,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> i64 {
        let elapsed = i64::try_from(self.started.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.epoch_ms.saturating_add(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn fixed_epoch_starts_at_epoch() {
        let clock = TokioClock::with_epoch(5000);
        assert_eq!(clock.now_ms(), 5000);
    }

    #[tokio::test(start_paused = true)]
    async fn advances_with_tokio_time() {
        let clock = TokioClock::with_epoch(0);
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(clock.now_ms(), 250);
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_the_same_epoch() {
        let clock = TokioClock::with_epoch(100);
        let other = clock.clone();
        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(clock.now_ms(), other.now_ms());
    }
}
