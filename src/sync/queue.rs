// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deduplicating, delay-capable work queue shared by the producers and the
//! reconcile workers.
//!
//! A key is in at most one of two places at a time: waiting (ready or delayed)
//! or being processed. Adding a key that is being processed marks it dirty, and
//! `done` puts it straight back on the ready list, so no update is lost while
//! per-key work stays strictly sequential.

use crate::sync::backoff::BackoffStrategy;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};

struct State<K> {
    /// Keys eligible now, in arrival order
    ready: VecDeque<K>,
    /// Keys that need processing: queued in `ready`, or re-added while processing
    dirty: HashSet<K>,
    /// Keys handed out by `get` and not yet released with `done`
    processing: HashSet<K>,
    /// Keys waiting for their eligibility instant
    delayed: HashMap<K, Instant>,
    /// Consecutive failures per key
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

impl<K: Clone + Eq + Hash> State<K> {
    /// Returns true when the key was placed on the ready list
    fn insert(&mut self, key: K) -> bool {
        if self.dirty.contains(&key) {
            return false;
        }
        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return false;
        }
        self.ready.push_back(key);
        true
    }

    fn promote_due(&mut self, now: Instant) {
        let due: Vec<K> = self
            .delayed
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in due {
            self.delayed.remove(&key);
            self.insert(key);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.delayed.values().min().copied()
    }
}

pub struct WorkQueue<K> {
    state: Mutex<State<K>>,
    notify: Notify,
    backoff: BackoffStrategy,
}

impl<K: Clone + Eq + Hash> WorkQueue<K> {
    pub fn new(backoff: BackoffStrategy) -> Self {
        Self {
            state: Mutex::new(State {
                ready: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                delayed: HashMap::new(),
                failures: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            backoff,
        }
    }

    fn state(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a key for immediate processing. Supersedes a pending delayed schedule.
    pub fn add(&self, key: K) {
        let mut state = self.state();
        if state.shutting_down {
            return;
        }
        state.delayed.remove(&key);
        if state.insert(key) {
            drop(state);
            self.notify.notify_waiters();
        }
    }

    /// Make a key eligible after `delay`. The latest call for a key decides when it fires.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let mut state = self.state();
        if state.shutting_down {
            return;
        }
        state.delayed.insert(key, Instant::now() + delay);
        drop(state);
        // Sleeping getters recompute their deadline
        self.notify.notify_waiters();
    }

    /// Record a failure for the key and schedule it according to the backoff strategy
    pub fn add_rate_limited(&self, key: K) {
        let failures = {
            let mut state = self.state();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            *failures = failures.saturating_add(1);
            *failures
        };
        self.add_after(key, self.backoff.delay(failures));
    }

    /// Number of failures recorded since the last `forget`
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.state().failures.get(key).copied().unwrap_or(0)
    }

    pub fn forget(&self, key: &K) {
        self.state().failures.remove(key);
    }

    /// Wait for an eligible key and hand it out exclusively.
    /// Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let deadline = {
                let mut state = self.state();
                if state.shutting_down {
                    return None;
                }
                state.promote_due(Instant::now());
                if let Some(key) = state.ready.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                state.next_deadline()
            };

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Release a key handed out by `get`, requeueing it if it was added meanwhile
    pub fn done(&self, key: &K) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.shutting_down || !state.dirty.contains(key) {
            return;
        }
        state.ready.push_back(key.clone());
        drop(state);
        self.notify.notify_waiters();
    }

    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Number of keys eligible right now
    pub fn len(&self) -> usize {
        self.state().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Clone + Eq + Hash> Default for WorkQueue<K> {
    fn default() -> Self {
        Self::new(BackoffStrategy::default())
    }
}
