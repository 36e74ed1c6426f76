//! Worker-side submission of a completed request's [`LogRecord`].

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use super::record::LogRecord;
use crate::error::ChannelError;

pub struct LogClient {
    timeout: Duration,
}

impl LogClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Opens a fresh connection and writes one record. The service
    /// reads exactly 23/24 lines per connection (mirroring the url
    /// cache and ip accounting services' one-message-per-connection
    /// style) so there is no framing beyond the field count itself.
    pub fn submit(
        &self,
        socket_path: &Path,
        record: &LogRecord,
        log_user_agent: bool,
    ) -> Result<(), ChannelError> {
        let mut stream = UnixStream::connect(socket_path).map_err(ChannelError::Io)?;
        stream.set_write_timeout(Some(self.timeout)).map_err(ChannelError::Io)?;
        stream
            .write_all(&record.encode(log_user_agent))
            .map_err(ChannelError::Io)
    }
}
