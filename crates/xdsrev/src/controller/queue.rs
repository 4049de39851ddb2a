//! De-duplicating work queue.
//!
//! A key is queued at most once, and never handed to a second worker while
//! the first is still processing it. A key added while in flight is queued
//! again when the worker calls [`WorkQueue::done`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

struct State<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    failures: HashMap<K, u32>,
    shutdown: bool,
}

struct Inner<K> {
    state: Mutex<State<K>>,
    notify: Notify,
}

pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> Default for WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    failures: HashMap::new(),
                    shutdown: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<K>> {
        // State stays consistent across a panicking holder
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, key: K) {
        let mut state = self.state();
        if state.shutdown || !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Adds `key` once `delay` has elapsed.
    pub fn add_after(&self, key: K, delay: Duration) {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Takes the next key without waiting.
    pub fn try_next(&self) -> Option<K> {
        let mut state = self.state();
        if state.shutdown {
            return None;
        }
        let key = state.queue.pop_front()?;
        state.dirty.remove(&key);
        state.processing.insert(key.clone());
        let more = !state.queue.is_empty();
        drop(state);
        if more {
            self.inner.notify.notify_one();
        }
        Some(key)
    }

    /// Waits for the next key. Returns `None` once the queue is shut down.
    pub async fn next(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_shut_down() {
                return None;
            }
            if let Some(key) = self.try_next() {
                return Some(key);
            }
            notified.await;
        }
    }

    /// Marks `key` as no longer in flight, queueing it again if it was added
    /// meanwhile.
    pub fn done(&self, key: &K) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutdown {
            state.queue.push_back(key.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Counts a failed attempt and returns the number of consecutive failures.
    pub fn record_failure(&self, key: &K) -> u32 {
        let mut state = self.state();
        let attempts = state.failures.entry(key.clone()).or_insert(0);
        *attempts = attempts.saturating_add(1);
        *attempts
    }

    /// Resets the failure count of `key`.
    pub fn forget(&self, key: &K) {
        self.state().failures.remove(key);
    }

    pub fn shutdown(&self) {
        self.state().shutdown = true;
        self.inner.notify.notify_waiters();
    }

    pub fn is_shut_down(&self) -> bool {
        self.state().shutdown
    }

    /// Keys waiting to be processed.
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently held by a worker.
    pub fn in_flight(&self) -> usize {
        self.state().processing.len()
    }
}
