//! Worker-side client for the IP accounting service (spec.md §6).

use std::io::{Read, Write};
use std::net::Ipv4Addr;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use crate::error::ChannelError;

/// Wire width of the dotted-quad request (spec.md §6).
pub const MESSAGE_LEN: usize = 16;

pub fn encode_request(ip: Ipv4Addr) -> [u8; MESSAGE_LEN] {
    let mut buf = [0u8; MESSAGE_LEN];
    let text = ip.to_string();
    buf[..text.len()].copy_from_slice(text.as_bytes());
    buf
}

pub fn decode_request(buf: &[u8]) -> Option<Ipv4Addr> {
    let text = std::str::from_utf8(buf).ok()?;
    let trimmed = text.trim_end_matches(['\0', ' ']);
    trimmed.parse().ok()
}

pub struct IpAccountingClient {
    timeout: Duration,
}

impl IpAccountingClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn query(&self, socket_path: &Path, ip: Ipv4Addr) -> Result<bool, ChannelError> {
        let mut stream = UnixStream::connect(socket_path).map_err(ChannelError::Io)?;
        stream.set_read_timeout(Some(self.timeout)).map_err(ChannelError::Io)?;
        stream.set_write_timeout(Some(self.timeout)).map_err(ChannelError::Io)?;
        stream.write_all(&encode_request(ip)).map_err(ChannelError::Io)?;
        let mut resp = [0u8; 1];
        stream.read_exact(&mut resp).map_err(ChannelError::Io)?;
        Ok(resp[0] == b'Y')
    }
}
