//! URL classification cache service (C3, spec.md §2/§3/§4.3).

pub mod cache;
pub mod client;
pub mod protocol;

pub use cache::UrlCache;
pub use client::UrlCacheClient;

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::signals::Signals;
use protocol::{parse_request, Request, RESP_ABSENT, RESP_PRESENT};

const MAX_LINE_LEN: usize = 8192;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Runs the URL cache service's single-threaded event loop until a
/// signal asks it to stop. Binds `socket_path`, removing any stale
/// socket file left by a previous run first.
pub fn run_service(
    socket_path: &Path,
    group_count: usize,
    capacity_per_group: usize,
    max_age: Duration,
    signals: &Signals,
) -> std::io::Result<()> {
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    listener.set_nonblocking(true)?;

    let mut cache = UrlCache::new(group_count, capacity_per_group, max_age);

    loop {
        if signals.terminate_requested() {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => handle_connection(stream, &mut cache),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => warn!(error = %e, "url cache accept failed"),
        }
    }
    let _ = std::fs::remove_file(socket_path);
    Ok(())
}

fn handle_connection(stream: UnixStream, cache: &mut UrlCache) {
    let _ = stream.set_nonblocking(false);
    let mut writer = match stream.try_clone() {
        Ok(w) => w,
        Err(_) => return,
    };
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) if line.len() > MAX_LINE_LEN => break,
            Ok(_) => {}
            Err(_) => break,
        }
        while line.last() == Some(&b'\n') || line.last() == Some(&b'\r') {
            line.pop();
        }
        match parse_request(&line) {
            Some(Request::Flush) => cache.flush(),
            Some(Request::Add { group, url }) => cache.insert(group, url),
            Some(Request::Query { group, url }) => {
                let present = cache.contains(group, &url);
                let byte = if present { RESP_PRESENT } else { RESP_ABSENT };
                if writer.write_all(&[byte]).is_err() {
                    break;
                }
            }
            None => debug!("malformed url cache request, ignoring"),
        }
    }
}
