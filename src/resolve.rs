// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared scaffolding for device differs.
//!
//! Each device projects the timeline snapshot into its own state shape and
//! diffs consecutive states into commands. The helpers here keep the timing
//! and ordering rules identical across devices.

use crate::event::CommandReport;

/// Minimum delay between the old state's time and a prepare command.
pub const PREPARE_WAIT_MS: i64 = 50;

/// How far ahead of a transition the device would ideally prepare.
pub const IDEAL_PREPARE_MS: i64 = 1000;

/// A command with a scheduled execution time, as dispatched by the timed
/// queue.
pub trait TimedCommand: Clone + Send + std::fmt::Debug + 'static {
    /// When the command fires, in milliseconds.
    fn execute_at(&self) -> i64;

    /// Serialization group; commands sharing a key fire in order under
    /// [`SendMode::InOrder`](crate::queue::SendMode::InOrder). `None` means
    /// unordered.
    fn queue_key(&self) -> Option<&str>;

    /// Identifies this command in failure and diagnostic events.
    fn report(&self) -> CommandReport;
}

/// Computes when a prepare-ahead command should fire.
///
/// The result is at least [`PREPARE_WAIT_MS`] after the old state's time
/// (never preparing into the past) and ideally [`IDEAL_PREPARE_MS`] before
/// the transition, clamped so prepare never fires after the transition
/// itself.
#[must_use]
pub fn prepare_time(old_state_time: i64, transition_time: i64) -> i64 {
    (transition_time - IDEAL_PREPARE_MS)
        .max(old_state_time + PREPARE_WAIT_MS)
        .min(transition_time)
}

/// Deterministic dispatch order within one transition: temporal priority
/// first (lower fires earlier, absent means 0), then layer name.
#[must_use]
pub fn temporal_order(temporal_priority: Option<i64>, layer: &str) -> (i64, String) {
    (temporal_priority.unwrap_or(0), layer.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_is_ideally_ahead_of_transition() {
        // Old state far in the past: the ideal lead time wins.
        assert_eq!(prepare_time(0, 10_000), 9000);
    }

    #[test]
    fn prepare_never_precedes_the_old_state() {
        // Old state is recent: prepare waits for it plus the margin.
        assert_eq!(prepare_time(9800, 10_000), 9850);
    }

    #[test]
    fn prepare_never_follows_the_transition() {
        // Old state is later than the transition allows: clamp.
        assert_eq!(prepare_time(10_000, 10_000), 10_000);
    }

    #[test]
    fn temporal_order_sorts_priority_before_layer() {
        let mut keys = vec![
            temporal_order(Some(2), "L1"),
            temporal_order(Some(0), "L2"),
            temporal_order(None, "L3"),
        ];
        keys.sort();

        let layers: Vec<&str> = keys.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(layers, vec!["L2", "L3", "L1"]);
    }
}
