//! Worker-side client for the URL cache service (spec.md §6).

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use super::protocol::{encode_add, encode_flush, encode_query, RESP_PRESENT};
use crate::error::ChannelError;

pub struct UrlCacheClient {
    timeout: Duration,
}

impl UrlCacheClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn connect(&self, socket_path: &Path) -> Result<UnixStream, ChannelError> {
        let stream = UnixStream::connect(socket_path).map_err(ChannelError::Io)?;
        stream.set_read_timeout(Some(self.timeout)).map_err(ChannelError::Io)?;
        stream.set_write_timeout(Some(self.timeout)).map_err(ChannelError::Io)?;
        Ok(stream)
    }

    pub fn query(&self, socket_path: &Path, group: u32, url: &str) -> Result<bool, ChannelError> {
        let msg = encode_query(group, url).ok_or(ChannelError::Protocol("group id out of range"))?;
        let mut stream = self.connect(socket_path)?;
        stream.write_all(&msg).map_err(ChannelError::Io)?;
        let mut resp = [0u8; 1];
        stream.read_exact(&mut resp).map_err(ChannelError::Io)?;
        Ok(resp[0] == RESP_PRESENT)
    }

    pub fn add(&self, socket_path: &Path, group: u32, url: &str) -> Result<(), ChannelError> {
        let msg = encode_add(group, url).ok_or(ChannelError::Protocol("group id out of range"))?;
        let mut stream = self.connect(socket_path)?;
        stream.write_all(&msg).map_err(ChannelError::Io)?;
        Ok(())
    }

    pub fn flush(&self, socket_path: &Path) -> Result<(), ChannelError> {
        let mut stream = self.connect(socket_path)?;
        stream.write_all(&encode_flush()).map_err(ChannelError::Io)?;
        Ok(())
    }
}
