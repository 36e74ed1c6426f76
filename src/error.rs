//! Error taxonomy, matching spec.md §7:
//!
//! - transient channel errors are retried at the call site and never
//!   reach these types;
//! - worker-supervision errors (`ChannelError`) cause the supervisor to
//!   TERM and drop the slot, not to abort the supervisor;
//! - configuration errors (`ConfigError`) are fatal at startup and
//!   trigger the gentle -> full reload fallback on reload;
//! - store-capacity exhaustion is not an error (`Refused`), it is a
//!   policy outcome the worker must handle.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("backed store: {0}")]
    Store(#[from] StoreError),

    #[error("ip table: {0}")]
    IpTable(#[from] IpTableError),

    #[error("control channel: {0}")]
    Channel(#[from] ChannelError),

    #[error("content scan: {0}")]
    Scan(#[from] ScanError),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("append refused: would exceed disk budget")]
    Refused,
    #[error("temp file creation failed in {tempdir}: {source}")]
    TempFile {
        tempdir: String,
        #[source]
        source: io::Error,
    },
    #[error("write to temp file failed: {0}")]
    Write(#[source] io::Error),
    #[error("mmap of finalized store failed: {0}")]
    Mmap(#[source] io::Error),
    #[error("store already finalized, append rejected")]
    AlreadyFinalized,
    #[error("data() called on an unfinalized file-backed store")]
    NotFinalized,
}

#[derive(Debug, Error)]
pub enum IpTableError {
    #[error("filter group file not found: {0}")]
    FileMissing(String),
    #[error("io error reading filter group file: {0}")]
    Io(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("peer closed the channel")]
    Eof,
    #[error("interrupted by signal")]
    Interrupted,
    #[error("malformed message: {0}")]
    Protocol(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no decision basis configured: need a virus regexp, clean codes, or infected codes")]
    NoDecisionBasis,
    #[error("failed to exec scanner command: {0}")]
    ExecFailed(String),
    #[error("failed to wait for scanner child: {0}")]
    Wait(#[source] io::Error),
    #[error("scanner produced no usable result and no default is configured")]
    Undecided,
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: Box<toml::de::Error>,
    },
    #[error("filter group count {groups} exceeds the URL cache's byte encoding range (max {max})")]
    TooManyFilterGroups { groups: usize, max: usize },
}
