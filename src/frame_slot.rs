//! Single-slot hand-off between a producer thread and the frame loop.
//!
//! The producer overwrites, the consumer reads whatever is newest. Nothing is
//! queued: a frame published twice before the loop looks is simply lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct LatestSlot<T> {
    latest: Arc<Mutex<Option<T>>>,
    sequence: Arc<AtomicU64>,
}

impl<T> Clone for LatestSlot<T> {
    fn clone(&self) -> Self {
        Self {
            latest: Arc::clone(&self.latest),
            sequence: Arc::clone(&self.sequence),
        }
    }
}

impl<T: Clone> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            latest: Arc::new(Mutex::new(None)),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        // a panicked producer leaves the last value intact
        self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the held value
    pub fn publish(&self, value: T) {
        let mut guard = self.lock();
        *guard = Some(value);
        self.sequence.fetch_add(1, Ordering::Release);
    }

    /// Incremented on every publish. 0 until the first one.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Newest value, if it was published after `last_seen`. Updates `last_seen`.
    pub fn take_newer(&self, last_seen: &mut u64) -> Option<T> {
        let guard = self.lock();
        let current = self.sequence();
        if current == *last_seen {
            return None;
        }
        *last_seen = current;
        guard.clone()
    }

    /// Newest value regardless of whether it was seen
    pub fn get(&self) -> Option<T> {
        self.lock().clone()
    }
}

impl<T: Clone> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
