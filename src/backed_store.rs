//! Bounded RAM-or-disk response buffer (C1, spec.md §3/§4.1).
//!
//! Ported from `examples/original_source/dansguardian/src/BackedStore.cpp`:
//! same three states (RAM / spilled-to-file / finalized-and-mapped), same
//! `__dgbs` temp file prefix, same "flush RAM to disk once, then append
//! the new bytes" spill behavior. `memmap2` replaces the raw `mmap(2)`
//! call; `nix::unistd::mkstemp` replaces `mkstemp(3)`.

use memmap2::Mmap;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

enum State {
    Ram(Vec<u8>),
    File { file: File, path: PathBuf, length: usize },
    Finalized { path: PathBuf, length: usize, map: Mmap },
}

/// Outcome of an [`BackedStore::append`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    Refused,
}

pub struct BackedStore {
    ram_cap: usize,
    disk_cap: usize,
    tempdir: PathBuf,
    state: State,
}

impl BackedStore {
    pub fn new(ram_cap: usize, disk_cap: usize, tempdir: impl Into<PathBuf>) -> Self {
        Self {
            ram_cap,
            disk_cap,
            tempdir: tempdir.into(),
            state: State::Ram(Vec::new()),
        }
    }

    pub fn append(&mut self, data: &[u8]) -> Result<AppendOutcome, StoreError> {
        match &mut self.state {
            State::Finalized { .. } => Err(StoreError::AlreadyFinalized),
            State::Ram(ram) => {
                if ram.len() + data.len() <= self.ram_cap {
                    ram.extend_from_slice(data);
                    return Ok(AppendOutcome::Appended);
                }
                if ram.len() + data.len() > self.disk_cap {
                    return Ok(AppendOutcome::Refused);
                }
                let (mut file, path) = self.create_temp_file()?;
                file.write_all(ram).map_err(StoreError::Write)?;
                file.write_all(data).map_err(StoreError::Write)?;
                let length = ram.len() + data.len();
                self.state = State::File { file, path, length };
                Ok(AppendOutcome::Appended)
            }
            State::File { file, length, .. } => {
                if *length + data.len() > self.disk_cap {
                    return Ok(AppendOutcome::Refused);
                }
                file.write_all(data).map_err(StoreError::Write)?;
                *length += data.len();
                Ok(AppendOutcome::Appended)
            }
        }
    }

    fn create_temp_file(&self) -> Result<(File, PathBuf), StoreError> {
        let template = self.tempdir.join("__dgbsXXXXXX");
        let (fd, path) = nix::unistd::mkstemp(&template).map_err(|errno| StoreError::TempFile {
            tempdir: self.tempdir.display().to_string(),
            source: std::io::Error::from(errno),
        })?;
        use std::os::unix::io::FromRawFd;
        let file = unsafe { File::from_raw_fd(fd) };
        Ok((file, path))
    }

    /// Seek to the start and establish a read-only mapping over the
    /// spilled file. No-op if the store never left RAM.
    pub fn finalize(&mut self) -> Result<(), StoreError> {
        if let State::File { file, path, length } = &mut self.state {
            file.seek(SeekFrom::Start(0)).map_err(StoreError::Mmap)?;
            let map = unsafe { Mmap::map(&*file) }.map_err(StoreError::Mmap)?;
            self.state = State::Finalized {
                path: path.clone(),
                length: *length,
                map,
            };
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        match &self.state {
            State::Ram(ram) => ram.len(),
            State::File { length, .. } => *length,
            State::Finalized { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> Result<&[u8], StoreError> {
        match &self.state {
            State::Ram(ram) => Ok(ram.as_slice()),
            State::File { .. } => Err(StoreError::NotFinalized),
            State::Finalized { map, .. } => Ok(&map[..]),
        }
    }

    pub fn temp_file_path(&self) -> Option<&Path> {
        match &self.state {
            State::Ram(_) => None,
            State::File { path, .. } | State::Finalized { path, .. } => Some(path),
        }
    }
}

impl Drop for BackedStore {
    fn drop(&mut self) {
        if let Some(path) = self.temp_file_path() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spill_scenario_from_spec() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BackedStore::new(16, 64, dir.path());

        assert_eq!(
            store.append(&b"A".repeat(10)).unwrap(),
            AppendOutcome::Appended
        );
        assert!(store.temp_file_path().is_none());
        assert_eq!(store.len(), 10);

        assert_eq!(
            store.append(&b"B".repeat(10)).unwrap(),
            AppendOutcome::Appended
        );
        assert!(store.temp_file_path().is_some());
        assert_eq!(store.len(), 20);

        store.finalize().unwrap();
        let expected = [b"A".repeat(10), b"B".repeat(10)].concat();
        assert_eq!(store.data().unwrap(), expected.as_slice());
    }

    #[test]
    fn refuse_scenario_from_spec() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BackedStore::new(16, 64, dir.path());

        let outcome = store.append(&b"X".repeat(100)).unwrap();
        assert_eq!(outcome, AppendOutcome::Refused);
        assert_eq!(store.len(), 0);
        assert!(store.temp_file_path().is_none());
    }

    #[test]
    fn append_after_finalize_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BackedStore::new(4, 64, dir.path());
        store.append(b"hello").unwrap();
        store.finalize().unwrap();
        assert!(matches!(
            store.append(b"more"),
            Err(StoreError::AlreadyFinalized)
        ));
    }

    #[test]
    fn data_before_finalize_on_spilled_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BackedStore::new(4, 64, dir.path());
        store.append(&b"Z".repeat(8)).unwrap();
        assert!(matches!(store.data(), Err(StoreError::NotFinalized)));
    }

    #[test]
    fn temp_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BackedStore::new(4, 64, dir.path());
        store.append(&b"Z".repeat(8)).unwrap();
        let path = store.temp_file_path().unwrap().to_path_buf();
        assert!(path.exists());
        drop(store);
        assert!(!path.exists());
    }

    #[test]
    fn ram_only_store_never_creates_a_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BackedStore::new(64, 64, dir.path());
        store.append(b"small").unwrap();
        store.finalize().unwrap();
        assert_eq!(store.data().unwrap(), b"small");
        assert!(store.temp_file_path().is_none());
    }
}
