//! PID file handling (spec.md §6, "Files on disk").
//!
//! Opened while still root (before privilege drop), truncated, and
//! written with the supervisor's PID. Creation failure is fatal
//! (spec.md §7).

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn create(path: &Path, pid: i32) -> std::io::Result<Self> {
        let mut file = File::create(path)?;
        writeln!(file, "{pid}")?;
        file.flush()?;
        Ok(Self { path: path.to_path_buf() })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
