//! Per-key sliding windows of event timestamps.
//!
//! Expiry is lazy: old entries are skipped by [`Window::count_within`] and
//! only physically dropped when a window hits its capacity or when a whole
//! key goes idle and [`SlidingWindowCounter::prune`] collects it.

use std::collections::VecDeque;
use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

pub const DEFAULT_CAPACITY: usize = 50;

/// Bounded, non-decreasing sequence of timestamps for one key.
#[derive(Debug, Clone)]
pub struct Window {
    stamps: VecDeque<Instant>,
    capacity: usize,
}

impl Window {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            stamps: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `at`, returning the timestamp actually stored.
    ///
    /// A timestamp older than the newest entry is clamped to it. When the
    /// window is full, entries older than `retention` go first, then the
    /// oldest remaining ones.
    pub fn record(&mut self, at: Instant, retention: Duration) -> Instant {
        let at = match self.stamps.back() {
            Some(&last) if last > at => last,
            _ => at,
        };
        if self.stamps.len() >= self.capacity {
            prune_older_than(&mut self.stamps, retention, at);
        }
        while self.stamps.len() >= self.capacity {
            self.stamps.pop_front();
        }
        self.stamps.push_back(at);
        at
    }

    /// Number of stored timestamps `t` with `now - t <= window`.
    pub fn count_within(&self, window: Duration, now: Instant) -> usize {
        self.stamps
            .iter()
            .rev()
            .take_while(|&&t| now.saturating_duration_since(t) <= window)
            .count()
    }

    pub fn newest(&self) -> Option<Instant> {
        self.stamps.back().copied()
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

/// Keyed collection of [`Window`]s sharing one capacity and retention.
#[derive(Debug)]
pub struct SlidingWindowCounter<K: Eq + Hash> {
    windows: DashMap<K, Window>,
    capacity: usize,
    retention: Duration,
}

impl<K> SlidingWindowCounter<K>
where
    K: Eq + Hash + Clone,
{
    /// `retention` should cover the longest window ever queried.
    pub fn new(capacity: usize, retention: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            capacity,
            retention,
        }
    }

    pub fn record(&self, key: K, at: Instant) -> Instant {
        self.windows
            .entry(key)
            .or_insert_with(|| Window::new(self.capacity))
            .record(at, self.retention)
    }

    pub fn count_within(&self, key: &K, window: Duration, now: Instant) -> usize {
        self.windows
            .get(key)
            .map(|w| w.count_within(window, now))
            .unwrap_or(0)
    }

    pub fn newest(&self, key: &K) -> Option<Instant> {
        self.windows.get(key).and_then(|w| w.newest())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.windows.contains_key(key)
    }

    /// Drop keys whose newest entry is past retention. Returns how many went.
    pub fn prune(&self, now: Instant) -> usize {
        let before = self.windows.len();
        let retention = self.retention;
        self.windows.retain(|_, w| {
            w.newest()
                .is_some_and(|t| now.saturating_duration_since(t) <= retention)
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

fn prune_older_than(q: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    while let Some(&front) = q.front() {
        if now.saturating_duration_since(front) > window {
            q.pop_front();
        } else {
            break;
        }
    }
}
