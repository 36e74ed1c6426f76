//! Per-IP concurrent-user accounting service (C4, spec.md §2/§3/§4.4).

pub mod client;
pub mod table;

pub use client::IpAccountingClient;
pub use table::IpAccounting;

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::signals::Signals;
use client::{decode_request, MESSAGE_LEN};
use table::PURGE_HORIZON;

/// The event loop's nominal wait per iteration (spec.md §4.4).
const ITERATION_TIMEOUT: Duration = Duration::from_secs(180);

pub fn run_service(
    socket_path: &Path,
    stats_file: &Path,
    max_ips: usize,
    signals: &Signals,
) -> std::io::Result<()> {
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    listener.set_nonblocking(true)?;

    let mut table = IpAccounting::new(max_ips);
    let mut last_purge = Instant::now();

    loop {
        if signals.terminate_requested() {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => handle_connection(stream, &mut table),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(200));
            }
            Err(e) => warn!(error = %e, "ip accounting accept failed"),
        }

        // A steady request stream must not starve the periodic sweep:
        // run it whenever 180s have elapsed since the last one, not
        // only when the poll itself times out.
        if last_purge.elapsed() >= ITERATION_TIMEOUT {
            table.purge(PURGE_HORIZON);
            if let Err(e) = write_stats(stats_file, table.current_count(), table.high_water()) {
                warn!(error = %e, "failed to write ip accounting stats file");
            }
            last_purge = Instant::now();
        }
    }
    let _ = std::fs::remove_file(socket_path);
    Ok(())
}

fn handle_connection(mut stream: UnixStream, table: &mut IpAccounting) {
    let _ = stream.set_nonblocking(false);
    let mut buf = [0u8; MESSAGE_LEN];
    if stream.read_exact(&mut buf).is_err() {
        return;
    }
    let Some(ip) = decode_request(&buf) else {
        let _ = stream.write_all(b"N");
        return;
    };
    let present = table.query(ip);
    let _ = stream.write_all(&[if present { b'Y' } else { b'N' }]);
}

/// Writes `current\nmax\n` atomically: write to a sibling temp file,
/// then rename over the stats file so readers never see a partial write.
fn write_stats(stats_file: &Path, current: usize, max: usize) -> std::io::Result<()> {
    let tmp_path = stats_file.with_extension("tmp");
    {
        let mut tmp = std::fs::File::create(&tmp_path)?;
        writeln!(tmp, "{current}\n{max}")?;
        tmp.flush()?;
    }
    std::fs::rename(&tmp_path, stats_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_stats_produces_two_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipacct.stats");
        write_stats(&path, 3, 7).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "3\n7\n");
    }
}
