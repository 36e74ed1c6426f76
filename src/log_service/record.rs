//! The access-log wire record (C5, spec.md §3/§4.5), grounded on
//! `FatController.cpp`'s `doLog` item order and decorator nesting.

use std::io::{self, BufRead, Write};

/// A single logged request, already carrying every flag the worker
/// decided on. Nothing here is recomputed server-side except the
/// decorated reason string and the filter-group name lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub exception: bool,
    pub category: String,
    pub naughty: bool,
    pub naughtiness: i32,
    pub url: String,
    pub reason: String,
    pub method: String,
    pub user: String,
    pub source_ip: String,
    pub port: u16,
    pub scanned: bool,
    pub infected: bool,
    pub content_modified: bool,
    pub url_modified: bool,
    pub header_modified: bool,
    pub size: u64,
    pub filter_group: u32,
    pub http_code: u16,
    pub cache_hit: bool,
    pub mime_type: String,
    pub seconds: i64,
    pub microseconds: i64,
    pub client_host: String,
    pub user_agent: Option<String>,
}

fn bit(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

impl LogRecord {
    /// Writes the 23 (or 24, with `log_user_agent`) newline-delimited
    /// fields, in the order spec.md §3 lists them.
    pub fn encode(&self, log_user_agent: bool) -> Vec<u8> {
        let mut out = Vec::new();
        macro_rules! field {
            ($v:expr) => {
                out.extend_from_slice($v.as_bytes());
                out.push(b'\n');
            };
        }
        field!(bit(self.exception));
        field!(self.category);
        field!(bit(self.naughty));
        field!(self.naughtiness.to_string());
        field!(self.url);
        field!(self.reason);
        field!(self.method);
        field!(self.user);
        field!(self.source_ip);
        field!(self.port.to_string());
        field!(bit(self.scanned));
        field!(bit(self.infected));
        field!(bit(self.content_modified));
        field!(bit(self.url_modified));
        field!(bit(self.header_modified));
        field!(self.size.to_string());
        field!(self.filter_group.to_string());
        field!(self.http_code.to_string());
        field!(bit(self.cache_hit));
        field!(self.mime_type);
        field!(self.seconds.to_string());
        field!(self.microseconds.to_string());
        field!(self.client_host);
        if log_user_agent {
            field!(self.user_agent.clone().unwrap_or_default());
        }
        out
    }

    /// Reads one record from `reader`, which must yield exactly 23 or
    /// 24 newline-terminated fields depending on `log_user_agent`.
    pub fn decode(reader: &mut impl BufRead, log_user_agent: bool) -> io::Result<Self> {
        let want = if log_user_agent { 24 } else { 23 };
        let mut fields = Vec::with_capacity(want);
        for _ in 0..want {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short log record"));
            }
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            fields.push(line);
        }
        let bad = |what: &'static str| io::Error::new(io::ErrorKind::InvalidData, what);
        let parse_bool = |s: &str| s == "1";
        let parse_i32 = |s: &str, what: &'static str| s.parse::<i32>().map_err(|_| bad(what));
        let parse_i64 = |s: &str, what: &'static str| s.parse::<i64>().map_err(|_| bad(what));
        let parse_u16 = |s: &str, what: &'static str| s.parse::<u16>().map_err(|_| bad(what));
        let parse_u64 = |s: &str, what: &'static str| s.parse::<u64>().map_err(|_| bad(what));
        let parse_u32 = |s: &str, what: &'static str| s.parse::<u32>().map_err(|_| bad(what));

        Ok(LogRecord {
            exception: parse_bool(&fields[0]),
            category: fields[1].clone(),
            naughty: parse_bool(&fields[2]),
            naughtiness: parse_i32(&fields[3], "naughtiness")?,
            url: fields[4].clone(),
            reason: fields[5].clone(),
            method: fields[6].clone(),
            user: fields[7].clone(),
            source_ip: fields[8].clone(),
            port: parse_u16(&fields[9], "port")?,
            scanned: parse_bool(&fields[10]),
            infected: parse_bool(&fields[11]),
            content_modified: parse_bool(&fields[12]),
            url_modified: parse_bool(&fields[13]),
            header_modified: parse_bool(&fields[14]),
            size: parse_u64(&fields[15], "size")?,
            filter_group: parse_u32(&fields[16], "filter_group")?,
            http_code: parse_u16(&fields[17], "http_code")?,
            cache_hit: parse_bool(&fields[18]),
            mime_type: fields[19].clone(),
            seconds: parse_i64(&fields[20], "seconds")?,
            microseconds: parse_i64(&fields[21], "microseconds")?,
            client_host: fields[22].clone(),
            user_agent: if log_user_agent {
                Some(fields[23].clone())
            } else {
                None
            },
        })
    }

    /// Builds the final "what" string: decorators nested innermost
    /// first, so the most recently applied ends up leftmost. Mirrors
    /// `FatController::doLog`'s sequence of `what = "*X* " + what`.
    pub fn decorated_reason(&self) -> String {
        let mut what = self.reason.clone();
        if self.naughty {
            what = format!("*DENIED* {what}");
        } else if self.exception {
            what = format!("*EXCEPTION* {what}");
        }
        if self.scanned {
            if self.infected {
                what = format!("*INFECTED* {what}");
            } else {
                what = format!("*SCANNED* {what}");
            }
        }
        if self.content_modified {
            what = format!("*CONTENTMOD* {what}");
        }
        if self.url_modified {
            what = format!("*URLMOD* {what}");
        }
        if self.header_modified {
            what = format!("*HEADERMOD* {what}");
        }
        what
    }

    /// The URL with `:port` appended when the port is neither 0 nor 80
    /// (spec.md §4.5).
    pub fn url_with_port(&self) -> String {
        if self.port == 0 || self.port == 80 {
            self.url.clone()
        } else {
            format!("{}:{}", self.url, self.port)
        }
    }
}

/// Truncates `s` to at most `max_len` bytes at a UTF-8 boundary.
/// `max_len == 0` means unbounded, matching `max_logitem_length = 0`.
pub fn truncate_item(s: &str, max_len: usize) -> String {
    if max_len == 0 || s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

pub fn write_record(writer: &mut impl Write, record: &LogRecord, log_user_agent: bool) -> io::Result<()> {
    writer.write_all(&record.encode(log_user_agent))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LogRecord {
        LogRecord {
            exception: false,
            category: "news".into(),
            naughty: true,
            naughtiness: 120,
            url: "http://example.com/".into(),
            reason: "banned phrase".into(),
            method: "GET".into(),
            user: "alice".into(),
            source_ip: "10.0.0.5".into(),
            port: 8080,
            scanned: true,
            infected: false,
            content_modified: false,
            url_modified: false,
            header_modified: false,
            size: 4096,
            filter_group: 2,
            http_code: 403,
            cache_hit: false,
            mime_type: "text/html".into(),
            seconds: 1_700_000_000,
            microseconds: 500_000,
            client_host: "client.example.com".into(),
            user_agent: Some("curl/8.0".into()),
        }
    }

    #[test]
    fn round_trips_with_user_agent() {
        let record = sample();
        let encoded = record.encode(true);
        let mut cursor = std::io::Cursor::new(encoded);
        let decoded = LogRecord::decode(&mut cursor, true).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn round_trips_without_user_agent() {
        let mut record = sample();
        record.user_agent = None;
        let encoded = record.encode(false);
        let mut cursor = std::io::Cursor::new(encoded);
        let decoded = LogRecord::decode(&mut cursor, false).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn decorator_nesting_order() {
        let mut record = sample();
        record.naughty = true;
        record.exception = false;
        record.scanned = true;
        record.infected = true;
        record.content_modified = true;
        record.url_modified = true;
        record.header_modified = true;
        assert_eq!(
            record.decorated_reason(),
            "*HEADERMOD* *URLMOD* *CONTENTMOD* *INFECTED* *DENIED* banned phrase"
        );
    }

    #[test]
    fn exception_decorator_when_not_naughty() {
        let mut record = sample();
        record.naughty = false;
        record.exception = true;
        record.scanned = false;
        assert_eq!(record.decorated_reason(), "*EXCEPTION* banned phrase");
    }

    #[test]
    fn scanned_but_clean_uses_scanned_decorator() {
        let mut record = sample();
        record.naughty = false;
        record.exception = false;
        record.infected = false;
        record.content_modified = false;
        assert_eq!(record.decorated_reason(), "*SCANNED* banned phrase");
    }

    #[test]
    fn port_80_and_0_are_suppressed() {
        let mut record = sample();
        record.port = 80;
        assert_eq!(record.url_with_port(), "http://example.com/");
        record.port = 0;
        assert_eq!(record.url_with_port(), "http://example.com/");
        record.port = 3128;
        assert_eq!(record.url_with_port(), "http://example.com/:3128");
    }

    #[test]
    fn truncate_item_respects_utf8_boundaries() {
        assert_eq!(truncate_item("hello world", 5), "hello");
        assert_eq!(truncate_item("hello", 0), "hello");
        assert_eq!(truncate_item("hi", 50), "hi");
    }
}
