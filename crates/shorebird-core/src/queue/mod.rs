//! Work queue dispatcher: deduplicating, per-key-serializing delivery of
//! pending reconciliations, with delayed requeue on handler error.

mod retry;

pub use retry::RetryPolicy;

use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::Notify;
use tracing::trace;

use crate::domain::ObjectKey;

/// Backoff entry waiting out its delay.
///
/// Reverse ordering so the BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledKey {
    ready_at: Instant,
    key: ObjectKey,
}

impl PartialOrd for ScheduledKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.ready_at.cmp(&self.ready_at)
    }
}

/// Queue counts for observability.
#[derive(Debug, Clone, Default)]
pub struct QueueCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub scheduled: usize,
}

struct QueueState {
    /// FIFO of keys ready for delivery.
    ready: VecDeque<ObjectKey>,

    /// Set mirror of `ready` for O(1) dedup.
    pending: HashSet<ObjectKey>,

    /// Keys currently handed to a worker. A key in here is never handed
    /// out again until the worker reports back.
    in_flight: HashSet<ObjectKey>,

    /// In-flight keys that were re-enqueued and must be redelivered once
    /// the current run finishes.
    dirty: HashSet<ObjectKey>,

    /// Keys waiting out a backoff delay, plus a set mirror for dedup.
    scheduled: BinaryHeap<ScheduledKey>,
    scheduled_keys: HashSet<ObjectKey>,

    /// Consecutive handler failures per key; cleared on success.
    failures: HashMap<ObjectKey, u32>,

    shutdown: bool,
}

impl QueueState {
    fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            pending: HashSet::new(),
            in_flight: HashSet::new(),
            dirty: HashSet::new(),
            scheduled: BinaryHeap::new(),
            scheduled_keys: HashSet::new(),
            failures: HashMap::new(),
            shutdown: false,
        }
    }

    /// Move keys whose backoff has elapsed from scheduled to ready.
    fn promote_scheduled(&mut self) {
        let now = Instant::now();
        while let Some(entry) = self.scheduled.peek() {
            if entry.ready_at > now {
                break; // heap is sorted, nothing later is due either
            }
            let entry = self.scheduled.pop().expect("peeked entry exists");
            self.scheduled_keys.remove(&entry.key);
            self.mark_ready(entry.key);
        }
    }

    fn mark_ready(&mut self, key: ObjectKey) {
        if self.in_flight.contains(&key) {
            self.dirty.insert(key);
        } else if self.pending.insert(key.clone()) {
            self.ready.push_back(key);
        }
    }
}

/// The dispatcher.
///
/// Invariants:
/// - a key appears at most once across pending/scheduled;
/// - a key is never delivered while a previous delivery is in flight;
/// - re-enqueueing an in-flight key is remembered and redelivered after
///   the current run completes.
///
/// `enqueue` is synchronous and never blocks, so cache event handlers can
/// call it directly. Workers block in `next()` until a key is ready or
/// shutdown is signaled.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    policy: RetryPolicy,
}

impl WorkQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState::new()),
            notify: Notify::new(),
            policy,
        }
    }

    /// Adds `key` for delivery. Idempotent: a no-op when the key is
    /// already pending or waiting out a backoff; when the key is in
    /// flight, a redelivery flag is set instead.
    pub fn enqueue(&self, key: ObjectKey) {
        {
            let mut state = self.state.lock().expect("queue lock poisoned");
            if state.shutdown || state.scheduled_keys.contains(&key) {
                return;
            }
            state.mark_ready(key);
        }
        self.notify.notify_one();
    }

    /// Blocks until a key is ready and hands it out, or returns `None`
    /// once shutdown is signaled.
    pub async fn next(&self) -> Option<ObjectKey> {
        loop {
            let next_wake = {
                let mut state = self.state.lock().expect("queue lock poisoned");
                if state.shutdown {
                    return None;
                }
                state.promote_scheduled();

                if let Some(key) = state.ready.pop_front() {
                    state.pending.remove(&key);
                    state.in_flight.insert(key.clone());
                    trace!(%key, "delivering key");
                    return Some(key);
                }

                state.scheduled.peek().map(|entry| entry.ready_at)
            };

            // Wait for a notification, or for the earliest scheduled key
            // to come due.
            match next_wake {
                Some(wake_at) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep_until(wake_at.into()) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    /// Reports a successful handler run: the key's failure history is
    /// forgotten and, if it was re-enqueued while in flight, it is
    /// redelivered.
    pub fn done(&self, key: &ObjectKey) {
        let redeliver = {
            let mut state = self.state.lock().expect("queue lock poisoned");
            state.in_flight.remove(key);
            state.failures.remove(key);
            if state.dirty.remove(key) && !state.shutdown {
                state.mark_ready(key.clone());
                true
            } else {
                false
            }
        };
        if redeliver {
            self.notify.notify_one();
        }
    }

    /// Reports a failed handler run: the key is rescheduled after an
    /// exponentially increasing delay, indefinitely, until it succeeds or
    /// the underlying object disappears.
    pub fn requeue_err(&self, key: &ObjectKey) {
        let delay = {
            let mut state = self.state.lock().expect("queue lock poisoned");
            state.in_flight.remove(key);
            // The retry subsumes any redelivery request.
            state.dirty.remove(key);
            if state.shutdown {
                return;
            }
            let failures = state.failures.entry(key.clone()).or_insert(0);
            *failures += 1;
            let delay = self.policy.next_delay(*failures);
            state.scheduled_keys.insert(key.clone());
            state.scheduled.push(ScheduledKey {
                ready_at: Instant::now() + delay,
                key: key.clone(),
            });
            delay
        };
        trace!(%key, ?delay, "requeued after handler error");
        // Wake a sleeping worker so it recomputes its wake time.
        self.notify.notify_one();
    }

    /// Stops accepting new work and unblocks all waiting `next()` calls.
    /// In-flight handler runs are left to finish on their own.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock().expect("queue lock poisoned");
            state.shutdown = true;
        }
        self.notify.notify_waiters();
    }

    pub fn counts(&self) -> QueueCounts {
        let state = self.state.lock().expect("queue lock poisoned");
        QueueCounts {
            pending: state.pending.len(),
            in_flight: state.in_flight.len(),
            scheduled: state.scheduled_keys.len(),
        }
    }
}
