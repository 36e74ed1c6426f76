//! Core library for the filtering forwarding proxy.
//!
//! This crate is consumed by four binaries: the supervisor/worker
//! executable (`portcullis`), and three auxiliary IPC services
//! (`portcullis-logd`, `portcullis-urlcached`, `portcullis-ipacctd`).
//! Everything shared between them — wire protocols, the data
//! structures backing each service, the plugin traits, and the
//! worker-slot state machine — lives here so the binaries stay thin.

pub mod backed_store;
pub mod config;
pub mod error;
pub mod ip_accounting;
pub mod ip_table;
pub mod ipc;
pub mod log_service;
pub mod mime;
pub mod net;
pub mod pidfile;
pub mod plugins;
pub mod signals;
pub mod supervisor;
pub mod url_cache;
pub mod worker;

pub use error::{CoreError, Result};
pub use mime::{get_mime_type, get_mime_type_enum, MimeType};
