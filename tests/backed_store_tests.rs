//! End-to-end scenarios 1 and 2 from spec.md §8.

use portcullis::backed_store::{AppendOutcome, BackedStore};

#[test]
fn spill_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = BackedStore::new(16, 64, dir.path());

    assert_eq!(store.append(&b"A".repeat(10)).unwrap(), AppendOutcome::Appended);
    assert!(store.temp_file_path().is_none(), "still RAM-only after the first append");

    assert_eq!(store.append(&b"B".repeat(10)).unwrap(), AppendOutcome::Appended);
    assert!(store.temp_file_path().is_some(), "spilled to disk after the second append");

    store.finalize().unwrap();
    let expected = [b"A".repeat(10), b"B".repeat(10)].concat();
    assert_eq!(store.data().unwrap(), expected.as_slice());
}

#[test]
fn refuse_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = BackedStore::new(16, 64, dir.path());

    let outcome = store.append(&b"X".repeat(100)).unwrap();
    assert_eq!(outcome, AppendOutcome::Refused);
    assert_eq!(store.len(), 0);
    assert!(store.temp_file_path().is_none());
}
