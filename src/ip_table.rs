//! IP/subnet/range -> filter-group resolution (C2, spec.md §3/§4.2).
//!
//! Grounded on `examples/original_source/dansguardian/src/authplugins/ip.cpp`:
//! the three parallel containers (sorted singletons, unordered subnets,
//! unordered ranges), the `KEY = filter N` line grammar, and the
//! singleton -> subnet -> range lookup order are carried over unchanged.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::Ipv4Addr;
use std::path::Path;

use tracing::warn;

use crate::error::IpTableError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Singleton {
    addr: u32,
    group: u32,
}

#[derive(Debug, Clone, Copy)]
struct Subnet {
    masked_addr: u32,
    mask: u32,
    group: u32,
}

#[derive(Debug, Clone, Copy)]
struct Range {
    start: u32,
    end: u32,
    group: u32,
}

/// A single table of filter-group mappings resolved from one or more
/// `KEY = filter N` files.
#[derive(Debug, Clone, Default)]
pub struct IpTable {
    singletons: Vec<Singleton>,
    subnets: Vec<Subnet>,
    ranges: Vec<Range>,
}

impl IpTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads and merges entries from a text file. A missing file is
    /// fatal (spec.md §4.2); unparseable lines are skipped with a
    /// warning. Re-sorts the singleton list after loading.
    pub fn load_file(&mut self, path: &Path) -> Result<(), IpTableError> {
        let file = File::open(path).map_err(|_| IpTableError::FileMissing(path.display().to_string()))?;
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(IpTableError::Io)?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line) {
                Some((key, group)) => self.insert(key, group),
                None => warn!(path = %path.display(), line = lineno + 1, %line, "unparseable ip table entry, skipping"),
            }
        }
        self.singletons.sort_by_key(|s| s.addr);
        Ok(())
    }

    fn insert(&mut self, key: Key, group: u32) {
        match key {
            Key::Single(addr) => self.singletons.push(Singleton { addr, group }),
            Key::Subnet(addr, mask) => self.subnets.push(Subnet {
                masked_addr: addr & mask,
                mask,
                group,
            }),
            Key::Range(start, end) => self.ranges.push(Range { start, end, group }),
        }
    }

    /// Resolves a 32-bit host-order address to its filter group, in
    /// singleton -> subnet -> range order, first hit wins.
    pub fn lookup(&self, addr: u32) -> Option<u32> {
        if let Ok(idx) = self.singletons.binary_search_by_key(&addr, |s| s.addr) {
            return Some(self.singletons[idx].group);
        }
        for subnet in &self.subnets {
            if addr & subnet.mask == subnet.masked_addr {
                return Some(subnet.group);
            }
        }
        for range in &self.ranges {
            if addr >= range.start && addr <= range.end {
                return Some(range.group);
            }
        }
        None
    }

    pub fn lookup_v4(&self, addr: Ipv4Addr) -> Option<u32> {
        self.lookup(u32::from(addr))
    }

    pub fn len(&self) -> usize {
        self.singletons.len() + self.subnets.len() + self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Key {
    Single(u32),
    Subnet(u32, u32),
    Range(u32, u32),
}

fn parse_line(line: &str) -> Option<(Key, u32)> {
    let (key_str, rhs) = line.split_once('=')?;
    let key_str = key_str.trim();
    let rhs = rhs.trim();
    let group_str = rhs.strip_prefix("filter")?.trim();
    let group: u32 = group_str.parse().ok()?;

    let key = if let Some((a, b)) = key_str.split_once('/') {
        Key::Subnet(parse_addr(a)?, parse_addr(b)?)
    } else if let Some((a, b)) = key_str.split_once('-') {
        let start = parse_addr(a)?;
        let end = parse_addr(b)?;
        if start > end {
            return None;
        }
        Key::Range(start, end)
    } else {
        Key::Single(parse_addr(key_str)?)
    };
    Some((key, group))
}

fn parse_addr(s: &str) -> Option<u32> {
    s.trim().parse::<Ipv4Addr>().ok().map(u32::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_singleton_subnet_and_range_lines() {
        let (k, g) = parse_line("10.0.0.1 = filter 0").unwrap();
        assert!(matches!(k, Key::Single(_)));
        assert_eq!(g, 0);

        let (k, _) = parse_line("10.0.1.0/255.255.255.0 = filter 1").unwrap();
        assert!(matches!(k, Key::Subnet(_, _)));

        let (k, _) = parse_line("10.0.2.5-10.0.2.9 = filter 2").unwrap();
        assert!(matches!(k, Key::Range(_, _)));
    }

    #[test]
    fn unparseable_lines_are_skipped() {
        assert!(parse_line("not a valid line").is_none());
        assert!(parse_line("10.0.0.1 = filter").is_none());
        assert!(parse_line("bananas/255.255.255.0 = filter 1").is_none());
    }

    #[test]
    fn resolution_scenario_from_spec() {
        let mut table = IpTable::new();
        table.insert(Key::Single(u32::from("10.0.0.1".parse::<Ipv4Addr>().unwrap())), 0);
        table.insert(
            Key::Subnet(
                u32::from("10.0.1.0".parse::<Ipv4Addr>().unwrap()),
                u32::from("255.255.255.0".parse::<Ipv4Addr>().unwrap()),
            ),
            1,
        );
        table.insert(
            Key::Range(
                u32::from("10.0.2.5".parse::<Ipv4Addr>().unwrap()),
                u32::from("10.0.2.9".parse::<Ipv4Addr>().unwrap()),
            ),
            2,
        );
        table.singletons.sort_by_key(|s| s.addr);

        assert_eq!(table.lookup_v4("10.0.0.1".parse().unwrap()), Some(0));
        assert_eq!(table.lookup_v4("10.0.1.77".parse().unwrap()), Some(1));
        assert_eq!(table.lookup_v4("10.0.2.7".parse().unwrap()), Some(2));
        assert_eq!(table.lookup_v4("10.0.3.1".parse().unwrap()), None);
    }

    #[test]
    fn singleton_wins_over_overlapping_subnet() {
        let mut table = IpTable::new();
        table.insert(
            Key::Subnet(
                u32::from("10.0.0.0".parse::<Ipv4Addr>().unwrap()),
                u32::from("255.255.255.0".parse::<Ipv4Addr>().unwrap()),
            ),
            9,
        );
        table.insert(Key::Single(u32::from("10.0.0.5".parse::<Ipv4Addr>().unwrap())), 1);
        table.singletons.sort_by_key(|s| s.addr);
        assert_eq!(table.lookup_v4("10.0.0.5".parse().unwrap()), Some(1));
        assert_eq!(table.lookup_v4("10.0.0.6".parse().unwrap()), Some(9));
    }

    #[test]
    fn missing_file_is_reported() {
        let mut table = IpTable::new();
        let err = table.load_file(Path::new("/nonexistent/portcullis-test-groups.conf"));
        assert!(matches!(err, Err(IpTableError::FileMissing(_))));
    }

    #[test]
    fn load_file_skips_bad_lines_and_sorts() {
        let mut dir = tempfile::NamedTempFile::new().unwrap();
        writeln!(dir, "10.0.0.9 = filter 3").unwrap();
        writeln!(dir, "garbage line").unwrap();
        writeln!(dir, "10.0.0.1 = filter 0").unwrap();
        dir.flush().unwrap();

        let mut table = IpTable::new();
        table.load_file(dir.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup_v4("10.0.0.1".parse().unwrap()), Some(0));
        assert_eq!(table.lookup_v4("10.0.0.9".parse().unwrap()), Some(3));
    }
}
