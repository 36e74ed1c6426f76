//! Wire framing for the supervisor<->worker control channel
//! (spec.md §6, "Control channels").
//!
//! The byte-for-bit contract is pinned: a worker's ready token is the
//! two bytes `"2\n"`; the supervisor's handoff is one raw byte (the
//! listener index); the worker's acknowledgement is the single byte
//! `K`. All three cross a `UnixStream` pair created with
//! `socketpair(2)` before fork, one per worker slot.

use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::ChannelError;

pub const READY_TOKEN: &[u8] = b"2\n";
pub const ACK_BYTE: u8 = b'K';

/// Creates the local stream pair backing one worker's control channel.
pub fn control_pair() -> io::Result<(UnixStream, UnixStream)> {
    UnixStream::pair()
}

fn map_io_err(err: io::Error, what: &'static str) -> ChannelError {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => ChannelError::Timeout(what),
        ErrorKind::Interrupted => ChannelError::Interrupted,
        ErrorKind::UnexpectedEof => ChannelError::Eof,
        _ => ChannelError::Io(err),
    }
}

fn read_exact_timeout(stream: &mut UnixStream, buf: &mut [u8], timeout: Duration, what: &'static str) -> Result<(), ChannelError> {
    stream.set_read_timeout(Some(timeout)).map_err(ChannelError::Io)?;
    match stream.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if buf.is_empty() => Err(map_io_err(e, what)),
        Err(e) => Err(map_io_err(e, what)),
    }
}

fn write_all_timeout(stream: &mut UnixStream, buf: &[u8], timeout: Duration, what: &'static str) -> Result<(), ChannelError> {
    stream.set_write_timeout(Some(timeout)).map_err(ChannelError::Io)?;
    stream.write_all(buf).map_err(|e| map_io_err(e, what))
}

/// Worker -> supervisor: "I can accept another handoff."
pub fn send_ready(stream: &mut UnixStream, timeout: Duration) -> Result<(), ChannelError> {
    write_all_timeout(stream, READY_TOKEN, timeout, "ready token")
}

/// Supervisor side: drain one ready token. Idempotent per spec.md §5 —
/// the caller decides what a redundant ready means; this just reads
/// the bytes off the wire.
pub fn recv_ready(stream: &mut UnixStream, timeout: Duration) -> Result<(), ChannelError> {
    let mut buf = [0u8; 2];
    read_exact_timeout(stream, &mut buf, timeout, "ready token")?;
    if buf != *READY_TOKEN {
        return Err(ChannelError::Protocol("expected ready token"));
    }
    Ok(())
}

/// Supervisor -> worker: the one-byte listener index to accept on.
pub fn send_listener_index(stream: &mut UnixStream, index: u8, timeout: Duration) -> Result<(), ChannelError> {
    write_all_timeout(stream, &[index], timeout, "listener index")
}

/// Worker side: block waiting for the listener index (up to ~360s per
/// spec.md §4.7).
pub fn recv_listener_index(stream: &mut UnixStream, timeout: Duration) -> Result<u8, ChannelError> {
    let mut buf = [0u8; 1];
    read_exact_timeout(stream, &mut buf, timeout, "listener index")?;
    Ok(buf[0])
}

/// Worker -> supervisor: accept completed.
pub fn send_ack(stream: &mut UnixStream, timeout: Duration) -> Result<(), ChannelError> {
    write_all_timeout(stream, &[ACK_BYTE], timeout, "ack")
}

/// Supervisor side: await the worker's ack after a handoff.
pub fn recv_ack(stream: &mut UnixStream, timeout: Duration) -> Result<(), ChannelError> {
    let mut buf = [0u8; 1];
    read_exact_timeout(stream, &mut buf, timeout, "ack")?;
    if buf[0] != ACK_BYTE {
        return Err(ChannelError::Protocol("expected ack byte"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn ready_token_round_trips() {
        let (mut a, mut b) = control_pair().unwrap();
        let handle = thread::spawn(move || send_ready(&mut a, Duration::from_secs(1)));
        recv_ready(&mut b, Duration::from_secs(1)).unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn listener_index_and_ack_round_trip() {
        let (mut supervisor, mut worker) = control_pair().unwrap();
        let handle = thread::spawn(move || -> Result<(), ChannelError> {
            let idx = recv_listener_index(&mut worker, Duration::from_secs(1))?;
            assert_eq!(idx, 3);
            send_ack(&mut worker, Duration::from_secs(1))
        });
        send_listener_index(&mut supervisor, 3, Duration::from_secs(1)).unwrap();
        recv_ack(&mut supervisor, Duration::from_secs(1)).unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn recv_ready_times_out_when_nothing_sent() {
        let (_a, mut b) = control_pair().unwrap();
        let err = recv_ready(&mut b, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, ChannelError::Timeout(_)));
    }

    #[test]
    fn recv_ready_rejects_wrong_bytes() {
        let (mut a, mut b) = control_pair().unwrap();
        a.write_all(b"xx").unwrap();
        let err = recv_ready(&mut b, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ChannelError::Protocol(_)));
    }

    #[test]
    fn closed_peer_yields_eof() {
        let (a, mut b) = control_pair().unwrap();
        drop(a);
        let err = recv_ready(&mut b, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ChannelError::Eof));
    }
}
