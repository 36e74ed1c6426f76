//! Where rendered log lines end up (spec.md §4.5: append-only file or
//! syslog). There is no syslog crate in the dependency stack, so the
//! syslog sink re-emits each line through `tracing` at a dedicated
//! target, which is the idiomatic stand-in this pack uses for
//! process-external logging destinations.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub enum LogSink {
    File(BufWriter<File>),
    Syslog,
}

impl LogSink {
    pub fn open_file(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::File(BufWriter::new(file)))
    }

    pub fn syslog() -> Self {
        Self::Syslog
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            LogSink::File(writer) => {
                writeln!(writer, "{line}")?;
                writer.flush()
            }
            LogSink::Syslog => {
                tracing::info!(target: "portcullis::access_log", "{line}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        {
            let mut sink = LogSink::open_file(&path).unwrap();
            sink.write_line("first").unwrap();
        }
        {
            let mut sink = LogSink::open_file(&path).unwrap();
            sink.write_line("second").unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }
}
