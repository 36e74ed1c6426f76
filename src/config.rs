//! Configuration surfaces consumed by the core (spec.md §6).
//!
//! Parsing the phrase/PICS classification engine's own configuration is
//! out of scope (it is an external collaborator); this module only
//! covers the process-management, pool-sizing, store, cache, and
//! logging knobs the supervisor/worker/auxiliary services read
//! directly. Grounded on the nested, `#[serde(default = "...")]`
//! config-struct style used across the retrieved pack (e.g.
//! `examples/other_examples/.../SerialAgent/.../config.rs`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// The byte range reserved for the URL cache's `group_byte` encoding:
/// `group_byte = group + 1` must never collide with the command
/// letters `f` (0x66) or `g` (0x67), so group ids are kept well below
/// that (spec.md §4.3's "small number of groups" rationale).
pub const MAX_FILTER_GROUPS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub url_cache: UrlCacheConfig,
    #[serde(default)]
    pub ip_accounting: IpAccountingConfig,
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default)]
    pub privilege: PrivilegeConfig,
    #[serde(default)]
    pub ipc: IpcConfig,
    #[serde(default)]
    pub filter_groups: Vec<FilterGroupFile>,
    #[serde(default)]
    pub auth_plugins: Vec<AuthPluginConfig>,
    #[serde(default)]
    pub scanner: Option<ScannerConfig>,
    /// Naughtiness score at or above which a request is blocked even
    /// when the classifier didn't set its own `naughty` flag. The
    /// classifier itself is an external collaborator (spec.md §1); this
    /// is the one policy knob the core owns.
    #[serde(default = "d_naughtiness_threshold")]
    pub naughtiness_threshold: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            listeners: vec![ListenerConfig::default()],
            store: StoreConfig::default(),
            url_cache: UrlCacheConfig::default(),
            ip_accounting: IpAccountingConfig::default(),
            logging: LogConfig::default(),
            privilege: PrivilegeConfig::default(),
            ipc: IpcConfig::default(),
            filter_groups: Vec::new(),
            auth_plugins: Vec::new(),
            scanner: None,
            naughtiness_threshold: d_naughtiness_threshold(),
        }
    }
}

fn d_naughtiness_threshold() -> i32 {
    50
}

impl Config {
    pub fn load(path: &std::path::Path) -> std::result::Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source: Box::new(source),
        })?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &std::path::Path) -> std::result::Result<(), ConfigError> {
        let groups = self.filter_groups.len().max(1);
        if groups > MAX_FILTER_GROUPS {
            return Err(ConfigError::TooManyFilterGroups {
                groups,
                max: MAX_FILTER_GROUPS,
            });
        }
        let _ = path;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "d_max_workers")]
    pub max_workers: usize,
    #[serde(default = "d_min_workers")]
    pub min_workers: usize,
    #[serde(default = "d_min_spare")]
    pub min_spare: usize,
    #[serde(default = "d_max_spare")]
    pub max_spare: usize,
    #[serde(default = "d_prefork_batch")]
    pub prefork_batch: usize,
    #[serde(default = "d_max_requests_per_worker")]
    pub max_requests_per_worker: u32,
    #[serde(default = "d_consecutive_failure_limit")]
    pub consecutive_failure_limit: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: d_max_workers(),
            min_workers: d_min_workers(),
            min_spare: d_min_spare(),
            max_spare: d_max_spare(),
            prefork_batch: d_prefork_batch(),
            max_requests_per_worker: d_max_requests_per_worker(),
            consecutive_failure_limit: d_consecutive_failure_limit(),
        }
    }
}

fn d_max_workers() -> usize {
    16
}
fn d_min_workers() -> usize {
    2
}
fn d_min_spare() -> usize {
    1
}
fn d_max_spare() -> usize {
    4
}
fn d_prefork_batch() -> usize {
    2
}
fn d_max_requests_per_worker() -> u32 {
    1000
}
fn d_consecutive_failure_limit() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "d_listen_addr")]
    pub addr: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            addr: d_listen_addr(),
        }
    }
}

fn d_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

pub const LISTEN_BACKLOG: i32 = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "d_ram_cap")]
    pub ram_cap: usize,
    #[serde(default = "d_disk_cap")]
    pub disk_cap: usize,
    #[serde(default = "d_tempdir")]
    pub tempdir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ram_cap: d_ram_cap(),
            disk_cap: d_disk_cap(),
            tempdir: d_tempdir(),
        }
    }
}

fn d_ram_cap() -> usize {
    8 * 1024 * 1024
}
fn d_disk_cap() -> usize {
    256 * 1024 * 1024
}
fn d_tempdir() -> PathBuf {
    PathBuf::from("/tmp")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlCacheConfig {
    #[serde(default = "d_url_cache_number")]
    pub url_cache_number: usize,
    #[serde(default = "d_url_cache_age")]
    pub url_cache_age_secs: u64,
    #[serde(default = "d_url_cache_socket")]
    pub socket_path: PathBuf,
}

impl Default for UrlCacheConfig {
    fn default() -> Self {
        Self {
            url_cache_number: d_url_cache_number(),
            url_cache_age_secs: d_url_cache_age(),
            socket_path: d_url_cache_socket(),
        }
    }
}

fn d_url_cache_number() -> usize {
    5000
}
fn d_url_cache_age() -> u64 {
    900
}
fn d_url_cache_socket() -> PathBuf {
    PathBuf::from("/tmp/portcullis-urlcache.sock")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpAccountingConfig {
    #[serde(default = "d_max_ips")]
    pub max_ips: usize,
    #[serde(default = "d_ip_acct_socket")]
    pub socket_path: PathBuf,
    #[serde(default = "d_ip_acct_stats_file")]
    pub stats_file: PathBuf,
}

impl Default for IpAccountingConfig {
    fn default() -> Self {
        Self {
            max_ips: d_max_ips(),
            socket_path: d_ip_acct_socket(),
            stats_file: d_ip_acct_stats_file(),
        }
    }
}

fn d_max_ips() -> usize {
    10_000
}
fn d_ip_acct_socket() -> PathBuf {
    PathBuf::from("/tmp/portcullis-ipacct.sock")
}
fn d_ip_acct_stats_file() -> PathBuf {
    PathBuf::from("/var/run/portcullis/ipacct.stats")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain = 1,
    Csv = 2,
    Squid = 3,
    Tsv = 4,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Plain
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub log_timestamp: bool,
    #[serde(default)]
    pub log_user_agent: bool,
    #[serde(default)]
    pub anonymise_logs: bool,
    #[serde(default = "d_max_logitem_length")]
    pub max_logitem_length: usize,
    #[serde(default = "d_log_socket")]
    pub socket_path: PathBuf,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub use_syslog: bool,
    #[serde(default = "d_proxy_ip")]
    pub proxy_ip: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            log_timestamp: false,
            log_user_agent: false,
            anonymise_logs: false,
            max_logitem_length: d_max_logitem_length(),
            socket_path: d_log_socket(),
            log_file: None,
            use_syslog: false,
            proxy_ip: d_proxy_ip(),
        }
    }
}

fn d_max_logitem_length() -> usize {
    0
}
fn d_log_socket() -> PathBuf {
    PathBuf::from("/tmp/portcullis-log.sock")
}
fn d_proxy_ip() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivilegeConfig {
    #[serde(default = "d_proxy_user")]
    pub proxy_user: String,
    #[serde(default = "d_root_user")]
    pub root_user: String,
    #[serde(default = "d_pid_file")]
    pub pid_file: PathBuf,
}

impl Default for PrivilegeConfig {
    fn default() -> Self {
        Self {
            proxy_user: d_proxy_user(),
            root_user: d_root_user(),
            pid_file: d_pid_file(),
        }
    }
}

fn d_proxy_user() -> String {
    "nobody".to_string()
}
fn d_root_user() -> String {
    "root".to_string()
}
fn d_pid_file() -> PathBuf {
    PathBuf::from("/var/run/portcullis.pid")
}

/// Paths to the sibling auxiliary-service binaries the supervisor spawns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    #[serde(default = "d_logd_bin")]
    pub logd_path: PathBuf,
    #[serde(default = "d_urlcached_bin")]
    pub urlcached_path: PathBuf,
    #[serde(default = "d_ipacctd_bin")]
    pub ipacctd_path: PathBuf,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            logd_path: d_logd_bin(),
            urlcached_path: d_urlcached_bin(),
            ipacctd_path: d_ipacctd_bin(),
        }
    }
}

fn d_logd_bin() -> PathBuf {
    PathBuf::from("portcullis-logd")
}
fn d_urlcached_bin() -> PathBuf {
    PathBuf::from("portcullis-urlcached")
}
fn d_ipacctd_bin() -> PathBuf {
    PathBuf::from("portcullis-ipacctd")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterGroupFile {
    pub name: String,
    pub ip_list_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AuthPluginConfig {
    ProxyAuth,
    Ip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub virus_regexp: Option<String>,
    #[serde(default)]
    pub clean_codes: Vec<i32>,
    #[serde(default)]
    pub infected_codes: Vec<i32>,
    #[serde(default)]
    pub default_result: Option<bool>, // Some(true) = clean, Some(false) = infected, None = error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = Config::default();
        assert!(cfg.pool.min_workers <= cfg.pool.max_workers);
        assert!(cfg.pool.min_spare <= cfg.pool.max_spare);
        assert_eq!(cfg.listeners.len(), 1);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let toml_text = r#"
            [pool]
            max_workers = 8
        "#;
        let cfg: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(cfg.pool.max_workers, 8);
        assert_eq!(cfg.pool.min_workers, d_min_workers());
        assert_eq!(cfg.store.ram_cap, d_ram_cap());
    }
}
