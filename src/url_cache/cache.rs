//! Per-group bounded URL cache (C3's backing store, spec.md §3).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct UrlCache {
    capacity_per_group: usize,
    max_age: Duration,
    rings: Vec<VecDeque<(String, Instant)>>,
}

impl UrlCache {
    pub fn new(group_count: usize, capacity_per_group: usize, max_age: Duration) -> Self {
        Self {
            capacity_per_group,
            max_age,
            rings: (0..group_count.max(1)).map(|_| VecDeque::new()).collect(),
        }
    }

    fn ring_for(&mut self, group: u32) -> &mut VecDeque<(String, Instant)> {
        let idx = group as usize;
        if idx >= self.rings.len() {
            self.rings.resize_with(idx + 1, VecDeque::new);
        }
        &mut self.rings[idx]
    }

    /// Inserts `url` for `group`, evicting the oldest entry once the
    /// per-group ring is full.
    pub fn insert(&mut self, group: u32, url: String) {
        let capacity = self.capacity_per_group;
        let ring = self.ring_for(group);
        if ring.len() >= capacity {
            ring.pop_front();
        }
        ring.push_back((url, Instant::now()));
    }

    /// True if `url` was inserted for `group` within `max_age` and the
    /// cache has not been flushed since.
    pub fn contains(&self, group: u32, url: &str) -> bool {
        let Some(ring) = self.rings.get(group as usize) else {
            return false;
        };
        ring.iter()
            .any(|(u, inserted)| u == url && inserted.elapsed() <= self.max_age)
    }

    pub fn flush(&mut self) {
        for ring in &mut self.rings {
            ring.clear();
        }
    }
}
