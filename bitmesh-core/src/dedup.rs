//! Time-bounded seen-set suppressing duplicate packets during flooding.

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_CAPACITY: usize = 8192;
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(600);

/// Remembers recently seen message keys.
///
/// When the set reaches capacity, the oldest 20% of entries by arrival time
/// are evicted. `sweep` additionally drops anything older than `max_age`.
#[derive(Debug)]
pub struct Deduplicator {
    seen: HashMap<String, Instant>,
    capacity: usize,
    max_age: Duration,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_MAX_AGE)
    }
}

impl Deduplicator {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            capacity: capacity.max(1),
            max_age,
        }
    }

    /// Returns true if `key` was already recorded; otherwise records it at
    /// `now` and returns false.
    pub fn is_duplicate(&mut self, key: &str, now: Instant) -> bool {
        if self.seen.contains_key(key) {
            return true;
        }
        if self.seen.len() >= self.capacity {
            self.evict_oldest();
        }
        self.seen.insert(key.to_owned(), now);
        false
    }

    /// Evicts the 20% oldest entries by arrival time.
    fn evict_oldest(&mut self) {
        let target = (self.capacity / 5).max(1);
        let mut order: Vec<(Instant, String)> = self
            .seen
            .iter()
            .map(|(key, &at)| (at, key.clone()))
            .collect();
        order.sort_by_key(|entry| entry.0);
        for (_, key) in order.into_iter().take(target) {
            self.seen.remove(&key);
        }
    }

    /// Drops all entries older than the configured max age. Returns the
    /// number dropped.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.seen.len();
        let max_age = self.max_age;
        self.seen
            .retain(|_, &mut at| now.duration_since(at) < max_age);
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
