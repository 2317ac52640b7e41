// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Small TTL cache for idempotent lookups.
//!
//! Used by stateful executors to avoid re-resolving identifiers on every
//! command (e.g. clip title to clip id). `get_set` has single-flight
//! semantics: concurrent callers for the same missing key share one
//! computation. Expired entries are swept lazily, every 100th insert.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::clock::Clock;
use crate::error::Result;

/// How many inserts between expiry sweeps.
const SWEEP_INTERVAL: u64 = 100;

/// A keyed cache whose entries expire after a fixed TTL.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<K, Slot<V>>>,
    inserts: AtomicU64,
}

#[derive(Debug)]
enum Slot<V> {
    /// A computed value, valid until `expires_at`.
    Ready { expires_at: i64, value: V },
    /// A computation in flight; concurrent callers share the cell.
    Pending(Arc<OnceCell<V>>),
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache with the given TTL in milliseconds.
    #[must_use]
    pub fn new(ttl_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl_ms,
            clock,
            slots: Mutex::new(HashMap::new()),
            inserts: AtomicU64::new(0),
        }
    }

    /// Returns the cached value for `key`, computing and storing it if
    /// missing or expired.
    ///
    /// Concurrent callers for the same missing key share a single
    /// computation; the losers wait for the winner's value. A failed
    /// computation leaves no entry behind.
    ///
    /// # Errors
    ///
    /// Returns the error of the computation, if it ran and failed.
    pub async fn get_set<F, Fut>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let now = self.clock.now_ms();

        let cell = {
            let mut slots = self.slots.lock().await;
            match slots.get(&key) {
                Some(Slot::Ready { expires_at, value }) if *expires_at > now => {
                    return Ok(value.clone());
                }
                Some(Slot::Pending(cell)) => Arc::clone(cell),
                _ => {
                    let cell = Arc::new(OnceCell::new());
                    slots.insert(key.clone(), Slot::Pending(Arc::clone(&cell)));
                    cell
                }
            }
        };

        match cell.get_or_try_init(compute).await {
            Ok(value) => {
                let value = value.clone();
                let mut slots = self.slots.lock().await;
                slots.insert(
                    key,
                    Slot::Ready {
                        expires_at: self.clock.now_ms() + self.ttl_ms,
                        value: value.clone(),
                    },
                );
                self.sweep_if_due(&mut slots);
                Ok(value)
            }
            Err(err) => {
                let mut slots = self.slots.lock().await;
                // Drop the pending slot, but only if it is still ours.
                if let Some(Slot::Pending(current)) = slots.get(&key) {
                    if Arc::ptr_eq(current, &cell) {
                        slots.remove(&key);
                    }
                }
                Err(err)
            }
        }
    }

    /// Drops all entries.
    pub async fn clear(&self) {
        self.slots.lock().await.clear();
    }

    /// Returns the number of slots currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Returns `true` if the cache holds no slots.
    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    fn sweep_if_due(&self, slots: &mut HashMap<K, Slot<V>>) {
        let count = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
        if count % SWEEP_INTERVAL != 0 {
            return;
        }
        let now = self.clock.now_ms();
        slots.retain(|_, slot| match slot {
            Slot::Ready { expires_at, .. } => *expires_at > now,
            Slot::Pending(_) => true,
        });
    }
}
