// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Time-ordered command queue.
//!
//! Commands are enqueued with an absolute fire time; a single ticker task
//! sleeps until the head of the queue is due and hands due commands to the
//! executor injected at construction. Two delivery disciplines exist:
//!
//! - [`SendMode::InOrder`]: commands sharing a queue key fire strictly in
//!   ascending fire-time order, and a later command does not start until
//!   the previous one has settled. Keys are independent of each other.
//! - [`SendMode::Burst`]: due commands fire as they come due without
//!   waiting for earlier ones to settle. For devices that serialize
//!   internally.
//!
//! Executor failures are published on the event bus and never stop the
//! ticker; in IN_ORDER mode a failed command still frees its key.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::event::{DeviceEvent, EventBus};
use crate::resolve::TimedCommand;

/// How long the ticker sleeps when the queue is empty. Inserts and disposal
/// wake it earlier.
const IDLE_WAIT: Duration = Duration::from_secs(60);

/// Delivery discipline of a [`TimedCommandQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Serialize commands per queue key, in ascending fire-time order.
    InOrder,
    /// Fire every due command immediately, without waiting for others.
    Burst,
}

/// Tuning options for a [`TimedCommandQueue`].
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// A command completing later than this after its due time triggers a
    /// [`DeviceEvent::SlowCommand`].
    pub slow_command_ms: i64,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            slow_command_ms: 100,
        }
    }
}

/// A boxed command execution future.
pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Executes commands popped off the queue.
///
/// Injected into the queue at construction; the queue never knows what a
/// command means, only when it fires.
pub trait CommandExecutor<C>: Send + Sync + 'static {
    /// Executes one command.
    fn execute(&self, command: C) -> CommandFuture<'_>;
}

/// Read-only view of one queued command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCommandInfo {
    /// Handle returned by [`TimedCommandQueue::queue`].
    pub id: u64,
    /// When the command fires, in milliseconds.
    pub fire_time: i64,
    /// The command's serialization group.
    pub queue_key: Option<String>,
    /// The command's diagnostic context.
    pub context: String,
}

struct Entry<C> {
    command: C,
    queue_key: Option<String>,
}

struct QueueState<C> {
    /// Entries keyed by `(fire_time, id)`: iteration order is dispatch order.
    entries: BTreeMap<(i64, u64), Entry<C>>,
    /// Keys with a command still executing (IN_ORDER only).
    busy_keys: HashSet<String>,
}

struct Inner<C, E> {
    mode: SendMode,
    clock: Arc<dyn Clock>,
    events: EventBus,
    executor: Arc<E>,
    slow_command_ms: i64,
    state: Mutex<QueueState<C>>,
    wake: Notify,
    disposed: AtomicBool,
    next_id: AtomicU64,
}

/// Min-ordered queue of commands fired at absolute times.
pub struct TimedCommandQueue<C, E> {
    inner: Arc<Inner<C, E>>,
}

impl<C, E> TimedCommandQueue<C, E>
where
    C: TimedCommand,
    E: CommandExecutor<C>,
{
    /// Creates a queue and starts its ticker task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        mode: SendMode,
        clock: Arc<dyn Clock>,
        events: EventBus,
        executor: Arc<E>,
        options: QueueOptions,
    ) -> Self {
        let inner = Arc::new(Inner {
            mode,
            clock,
            events,
            executor,
            slow_command_ms: options.slow_command_ms,
            state: Mutex::new(QueueState {
                entries: BTreeMap::new(),
                busy_keys: HashSet::new(),
            }),
            wake: Notify::new(),
            disposed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        });

        tokio::spawn(Self::run(Arc::clone(&inner)));

        Self { inner }
    }

    /// Enqueues a command at its `execute_at` time and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueDisposed`] after [`dispose`](Self::dispose).
    pub fn queue(&self, command: C) -> Result<u64> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(Error::QueueDisposed);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let fire_time = command.execute_at();
        let queue_key = command.queue_key().map(str::to_string);

        {
            let mut state = self.inner.state.lock().expect("queue state poisoned");
            state
                .entries
                .insert((fire_time, id), Entry { command, queue_key });
        }
        self.inner.wake.notify_one();

        Ok(id)
    }

    /// Removes queued commands with a fire time strictly after `time`.
    pub fn clear_after(&self, time: i64) {
        let mut state = self.inner.state.lock().expect("queue state poisoned");
        state.entries.retain(|(fire, _), _| *fire <= time);
    }

    /// Removes queued commands with a fire time at or after `time`.
    pub fn clear_now_and_after(&self, time: i64) {
        let mut state = self.inner.state.lock().expect("queue state poisoned");
        state.entries.retain(|(fire, _), _| *fire < time);
    }

    /// Returns a read-only snapshot of the queued commands, soonest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<QueuedCommandInfo> {
        let state = self.inner.state.lock().expect("queue state poisoned");
        state
            .entries
            .iter()
            .map(|((fire, id), entry)| QueuedCommandInfo {
                id: *id,
                fire_time: *fire,
                queue_key: entry.queue_key.clone(),
                context: entry.command.report().context,
            })
            .collect()
    }

    /// Returns the number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().expect("queue state poisoned").entries.len()
    }

    /// Returns `true` if no commands are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` after [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Stops the ticker and drops all queued commands.
    ///
    /// Commands already executing run to completion; their results are
    /// discarded.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::Release);
        {
            let mut state = self.inner.state.lock().expect("queue state poisoned");
            state.entries.clear();
        }
        self.inner.wake.notify_one();
    }

    async fn run(inner: Arc<Inner<C, E>>) {
        loop {
            if inner.disposed.load(Ordering::Acquire) {
                break;
            }

            let now = inner.clock.now_ms();
            let (due, next_fire) = {
                let mut state = inner.state.lock().expect("queue state poisoned");
                let due_keys: Vec<(i64, u64)> = state
                    .entries
                    .range(..=(now, u64::MAX))
                    .map(|(k, _)| *k)
                    .collect();

                let mut due = Vec::new();
                for key in due_keys {
                    let held_back = inner.mode == SendMode::InOrder
                        && state.entries[&key]
                            .queue_key
                            .as_ref()
                            .is_some_and(|k| state.busy_keys.contains(k));
                    if held_back {
                        continue;
                    }
                    let entry = state.entries.remove(&key).expect("due entry vanished");
                    if inner.mode == SendMode::InOrder {
                        if let Some(k) = &entry.queue_key {
                            state.busy_keys.insert(k.clone());
                        }
                    }
                    due.push((key.0, entry));
                }

                // Entries held back by a busy key are re-scanned when that
                // key frees up and notifies; only future entries need a timer.
                let next_fire = state
                    .entries
                    .keys()
                    .map(|(fire, _)| *fire)
                    .find(|fire| *fire > now);
                (due, next_fire)
            };

            for (fire_time, entry) in due {
                Self::dispatch(&inner, fire_time, entry);
            }

            let wait = match next_fire {
                Some(fire) => {
                    let delta = fire.saturating_sub(inner.clock.now_ms()).max(0);
                    Duration::from_millis(u64::try_from(delta).unwrap_or(0))
                }
                None => IDLE_WAIT,
            };
            tokio::select! {
                () = inner.wake.notified() => {}
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn dispatch(inner: &Arc<Inner<C, E>>, fire_time: i64, entry: Entry<C>) {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let report = entry.command.report();
            let queue_key = entry.queue_key;

            tracing::debug!(context = %report.context, fire_time, "dispatching command");
            inner
                .events
                .publish(DeviceEvent::debug(format!("dispatching: {}", report.context)));

            let result = inner.executor.execute(entry.command).await;
            let completed_at = inner.clock.now_ms();

            let overrun = completed_at - fire_time;
            if overrun > inner.slow_command_ms {
                let message =
                    format!("command {} completed {overrun}ms after its due time", report.context);
                tracing::warn!(context = %report.context, overrun, "slow command");
                inner.events.publish(DeviceEvent::SlowCommand { message });
            }

            if let Err(err) = result {
                tracing::warn!(context = %report.context, error = %err, "command failed");
                inner
                    .events
                    .publish(DeviceEvent::command_error(err, report));
            }

            if inner.mode == SendMode::InOrder {
                if let Some(key) = queue_key {
                    let mut state = inner.state.lock().expect("queue state poisoned");
                    state.busy_keys.remove(&key);
                    drop(state);
                    inner.wake.notify_one();
                }
            }
        });
    }
}

impl<C, E> Clone for TimedCommandQueue<C, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: TimedCommand, E> std::fmt::Debug for TimedCommandQueue<C, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedCommandQueue")
            .field("mode", &self.inner.mode)
            .field("disposed", &self.inner.disposed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
