// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ordered log of committed device states.
//!
//! Each `handle_state` pass commits the projected device state at the
//! snapshot time; the next pass reads the newest state strictly before its
//! own baseline to diff against. Old entries are pruned, but one entry
//! always survives as the diffing baseline.

use std::collections::BTreeMap;

/// Ordered `(timestamp, state)` log for one device.
#[derive(Debug, Clone)]
pub struct StateStore<S> {
    states: BTreeMap<i64, S>,
}

impl<S> StateStore<S> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: BTreeMap::new(),
        }
    }

    /// Commits a state at the given time, replacing any state at exactly
    /// that time.
    pub fn set_state(&mut self, state: S, time: i64) {
        self.states.insert(time, state);
    }

    /// Returns the entry with the greatest timestamp strictly before `time`.
    #[must_use]
    pub fn get_state_before(&self, time: i64) -> Option<(i64, &S)> {
        self.states
            .range(..time)
            .next_back()
            .map(|(t, s)| (*t, s))
    }

    /// Discards entries older than `up_to - min_age`, always retaining the
    /// newest of them as the baseline for later queries.
    pub fn clean_up_states(&mut self, min_age: i64, up_to: i64) {
        let threshold = up_to.saturating_sub(min_age);
        let Some((baseline, _)) = self.get_state_before(threshold) else {
            return;
        };
        self.states.retain(|&t, _| t >= threshold || t == baseline);
    }

    /// Drops all entries.
    pub fn clear_states(&mut self) {
        self.states.clear();
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` if nothing has been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl<S> Default for StateStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_has_no_state_before() {
        let store: StateStore<u32> = StateStore::new();
        assert!(store.get_state_before(1000).is_none());
    }

    #[test]
    fn get_state_before_is_strictly_before() {
        let mut store = StateStore::new();
        store.set_state("a", 100);
        store.set_state("b", 200);

        assert_eq!(store.get_state_before(200), Some((100, &"a")));
        assert_eq!(store.get_state_before(201), Some((200, &"b")));
        assert!(store.get_state_before(100).is_none());
    }

    #[test]
    fn set_state_overwrites_same_timestamp() {
        let mut store = StateStore::new();
        store.set_state("a", 100);
        store.set_state("b", 100);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get_state_before(101), Some((100, &"b")));
    }

    #[test]
    fn clean_up_keeps_one_baseline_entry() {
        let mut store = StateStore::new();
        store.set_state("a", 100);
        store.set_state("b", 200);
        store.set_state("c", 300);
        store.set_state("d", 400);

        store.clean_up_states(0, 350);

        // 100 and 200 dropped, 300 kept as the baseline below 350.
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_state_before(350), Some((300, &"c")));
        assert_eq!(store.get_state_before(1000), Some((400, &"d")));
    }

    #[test]
    fn clean_up_respects_min_age() {
        let mut store = StateStore::new();
        store.set_state("a", 100);
        store.set_state("b", 200);
        store.set_state("c", 300);

        // Threshold is 400 - 250 = 150: only entries below 150 may go,
        // and the newest of them (100) is the baseline, so nothing drops.
        store.clean_up_states(250, 400);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn clean_up_on_empty_store_is_a_noop() {
        let mut store: StateStore<u32> = StateStore::new();
        store.clean_up_states(0, 1000);
        assert!(store.is_empty());
    }

    #[test]
    fn clear_states_drops_everything() {
        let mut store = StateStore::new();
        store.set_state("a", 100);
        store.clear_states();

        assert!(store.is_empty());
        assert!(store.get_state_before(1000).is_none());
    }

    #[test]
    fn query_consistent_after_out_of_order_sets() {
        let mut store = StateStore::new();
        store.set_state("late", 300);
        store.set_state("early", 100);
        store.set_state("mid", 200);

        assert_eq!(store.get_state_before(250), Some((200, &"mid")));
        assert_eq!(store.get_state_before(301), Some((300, &"late")));
    }
}
