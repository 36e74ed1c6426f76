//! Access-log service (C5, spec.md §2/§3/§4.5).

pub mod client;
pub mod format;
pub mod record;
pub mod sink;

pub use client::LogClient;
pub use format::{render_line, FormatOptions};
pub use record::LogRecord;
pub use sink::LogSink;

use std::io::BufReader;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::config::LogConfig;
use crate::signals::Signals;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Resolves a filter group id to its configured name, falling back to
/// the numeric id when the group has none (e.g. auth-plugin-only
/// setups with no named filter groups).
pub fn group_name(names: &[String], group: u32) -> String {
    names
        .get(group as usize)
        .cloned()
        .unwrap_or_else(|| group.to_string())
}

pub fn run_service(
    socket_path: &Path,
    config: &LogConfig,
    group_names: &[String],
    signals: &Signals,
) -> std::io::Result<()> {
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    listener.set_nonblocking(true)?;

    let mut sink = if config.use_syslog {
        LogSink::syslog()
    } else if let Some(path) = &config.log_file {
        LogSink::open_file(path)?
    } else {
        LogSink::syslog()
    };

    loop {
        if signals.terminate_requested() {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => handle_connection(stream, config, group_names, &mut sink),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => warn!(error = %e, "log service accept failed"),
        }
    }
    let _ = std::fs::remove_file(socket_path);
    Ok(())
}

fn handle_connection(
    stream: UnixStream,
    config: &LogConfig,
    group_names: &[String],
    sink: &mut LogSink,
) {
    let _ = stream.set_nonblocking(false);
    let mut reader = BufReader::new(stream);
    let record = match LogRecord::decode(&mut reader, config.log_user_agent) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "malformed log record, dropping");
            return;
        }
    };
    let fg_name = group_name(group_names, record.filter_group);
    let opts = FormatOptions {
        format: config.format,
        log_timestamp: config.log_timestamp,
        log_user_agent: config.log_user_agent,
        max_logitem_length: config.max_logitem_length,
        proxy_ip: &config.proxy_ip,
        fg_name: &fg_name,
        anonymise: config.anonymise_logs,
    };
    let line = render_line(&record, &opts);
    if let Err(e) = sink.write_line(&line) {
        warn!(error = %e, "failed to write access log line");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_name_falls_back_to_numeric_id() {
        let names = vec!["default".to_string(), "staff".to_string()];
        assert_eq!(group_name(&names, 1), "staff");
        assert_eq!(group_name(&names, 9), "9");
    }
}
