//! Bounded recent-IP set backing C4 (spec.md §3/§4.4).

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

/// Entries older than this are purged on each periodic sweep.
pub const PURGE_HORIZON: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub struct IpAccounting {
    max_ips: usize,
    entries: FxHashMap<Ipv4Addr, Instant>,
    high_water: usize,
}

impl IpAccounting {
    pub fn new(max_ips: usize) -> Self {
        Self {
            max_ips,
            entries: FxHashMap::default(),
            high_water: 0,
        }
    }

    /// Inserts `ip` if absent (refreshing `last_seen` if present).
    /// Returns `true` (present-or-inserted) unless the set is full.
    pub fn query(&mut self, ip: Ipv4Addr) -> bool {
        if self.entries.contains_key(&ip) {
            self.entries.insert(ip, Instant::now());
            return true;
        }
        if self.entries.len() >= self.max_ips {
            return false;
        }
        self.entries.insert(ip, Instant::now());
        self.high_water = self.high_water.max(self.entries.len());
        true
    }

    pub fn purge(&mut self, horizon: Duration) {
        self.entries.retain(|_, last_seen| last_seen.elapsed() < horizon);
    }

    pub fn current_count(&self) -> usize {
        self.entries.len()
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_refresh_same_ip() {
        let mut table = IpAccounting::new(2);
        let ip: Ipv4Addr = "1.2.3.4".parse().unwrap();
        assert!(table.query(ip));
        assert!(table.query(ip));
        assert_eq!(table.current_count(), 1);
    }

    #[test]
    fn full_set_refuses_new_ip() {
        let mut table = IpAccounting::new(1);
        assert!(table.query("1.1.1.1".parse().unwrap()));
        assert!(!table.query("2.2.2.2".parse().unwrap()));
    }

    #[test]
    fn high_water_never_decreases() {
        let mut table = IpAccounting::new(4);
        table.query("1.1.1.1".parse().unwrap());
        table.query("2.2.2.2".parse().unwrap());
        assert_eq!(table.high_water(), 2);
        table.purge(Duration::from_secs(0));
        assert_eq!(table.current_count(), 0);
        assert_eq!(table.high_water(), 2);
    }

    #[test]
    fn purge_drops_stale_entries() {
        let mut table = IpAccounting::new(4);
        table.query("1.1.1.1".parse().unwrap());
        std::thread::sleep(Duration::from_millis(20));
        table.purge(Duration::from_millis(5));
        assert_eq!(table.current_count(), 0);
    }
}
