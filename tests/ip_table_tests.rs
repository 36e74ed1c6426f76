//! End-to-end scenario 3 from spec.md §8: IP resolution.

use std::io::Write;

use portcullis::ip_table::IpTable;

#[test]
fn resolves_singleton_subnet_and_range_in_priority_order() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "10.0.0.1 = filter 0").unwrap();
    writeln!(file, "10.0.1.0/255.255.255.0 = filter 1").unwrap();
    writeln!(file, "10.0.2.5-10.0.2.9 = filter 2").unwrap();
    file.flush().unwrap();

    let mut table = IpTable::new();
    table.load_file(file.path()).unwrap();

    assert_eq!(table.lookup_v4("10.0.0.1".parse().unwrap()), Some(0));
    assert_eq!(table.lookup_v4("10.0.1.77".parse().unwrap()), Some(1));
    assert_eq!(table.lookup_v4("10.0.2.7".parse().unwrap()), Some(2));
    assert_eq!(table.lookup_v4("10.0.3.1".parse().unwrap()), None);
}

#[test]
fn missing_file_is_fatal() {
    let mut table = IpTable::new();
    let result = table.load_file(std::path::Path::new("/nonexistent/filter.conf"));
    assert!(result.is_err());
}
