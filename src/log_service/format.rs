//! The four access-log output formats (spec.md §4.5), grounded on
//! `FatController.cpp`'s `doLog` format switch.

use std::time::{SystemTime, UNIX_EPOCH};

use super::record::{truncate_item, LogRecord};
use crate::config::LogFormat;

fn csv_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Renders one output line (without trailing newline) for `record`,
/// given the filter group's display name and the options that shape
/// formatting.
pub struct FormatOptions<'a> {
    pub format: LogFormat,
    pub log_timestamp: bool,
    pub log_user_agent: bool,
    pub max_logitem_length: usize,
    pub proxy_ip: &'a str,
    pub fg_name: &'a str,
    /// Blank client-identifying fields (user, source IP, client host)
    /// in the rendered line.
    pub anonymise: bool,
}

pub fn render_line(record: &LogRecord, opts: &FormatOptions) -> String {
    let trunc = |s: &str| truncate_item(s, opts.max_logitem_length);
    let what = trunc(&record.decorated_reason());
    let url = trunc(&record.url_with_port());
    let when = format_when(record.seconds, record.microseconds, opts.log_timestamp);
    let user_agent = if opts.log_user_agent {
        record.user_agent.as_deref().unwrap_or("-")
    } else {
        "-"
    };
    let (who, from, client_host) = if opts.anonymise {
        (String::new(), "0.0.0.0".to_string(), String::new())
    } else {
        (record.user.clone(), record.source_ip.clone(), record.client_host.clone())
    };

    match opts.format {
        LogFormat::Plain => render_plain(record, &when, &url, &what, user_agent, opts.fg_name, &who, &from, &client_host),
        LogFormat::Csv => render_csv(record, &when, &url, &what, user_agent, opts.fg_name, &who, &from, &client_host),
        LogFormat::Squid => render_squid(record, &url, opts.proxy_ip, &who, &from),
        LogFormat::Tsv => render_tsv(record, &when, &url, &what, user_agent, opts.fg_name, &who, &from, &client_host),
    }
}

fn format_when(seconds: i64, microseconds: i64, with_timestamp: bool) -> String {
    use chrono::{Local, TimeZone};
    let dt = Local
        .timestamp_opt(seconds, 0)
        .single()
        .unwrap_or_else(|| Local.timestamp_opt(0, 0).unwrap());
    let base = dt.format("%Y.%m.%d %H:%M:%S").to_string();
    if with_timestamp {
        format!("{base}.{microseconds:06}")
    } else {
        base
    }
}

#[allow(clippy::too_many_arguments)]
fn render_plain(
    record: &LogRecord,
    when: &str,
    url: &str,
    what: &str,
    user_agent: &str,
    fg_name: &str,
    who: &str,
    from: &str,
    client_host: &str,
) -> String {
    format!(
        "{when}\t{who}\t{from}\t{where}\t{what}\t{how}\t{ssize}\t{sweight}\t{cat}\t{fg}\t{code}\t{mime}\t{client}\t{ua}",
        when = when,
        who = who,
        from = from,
        where = url,
        what = what,
        how = record.method,
        ssize = record.size,
        sweight = record.naughtiness,
        cat = record.category,
        fg = fg_name,
        code = record.http_code,
        mime = record.mime_type,
        client = client_host,
        ua = user_agent,
    )
}

#[allow(clippy::too_many_arguments)]
fn render_csv(
    record: &LogRecord,
    when: &str,
    url: &str,
    what: &str,
    user_agent: &str,
    fg_name: &str,
    who: &str,
    from: &str,
    client_host: &str,
) -> String {
    [
        when,
        who,
        from,
        url,
        what,
        &record.method,
        &record.size.to_string(),
        &record.naughtiness.to_string(),
        &record.category,
        fg_name,
        &record.http_code.to_string(),
        &record.mime_type,
        client_host,
        user_agent,
    ]
    .iter()
    .map(|f| csv_quote(f))
    .collect::<Vec<_>>()
    .join(",")
}

#[allow(clippy::too_many_arguments)]
fn render_tsv(
    record: &LogRecord,
    when: &str,
    url: &str,
    what: &str,
    user_agent: &str,
    fg_name: &str,
    who: &str,
    from: &str,
    client_host: &str,
) -> String {
    [
        when,
        who,
        from,
        url,
        what,
        &record.method,
        &record.size.to_string(),
        &record.naughtiness.to_string(),
        &record.category,
        fg_name,
        &record.http_code.to_string(),
        &record.mime_type,
        client_host,
        user_agent,
    ]
    .join("\t")
}

/// squid access.log format: `time duration client hitmiss/code size
/// method url user hierarchy/parent mimetype`. `time` is the log-write
/// time; `duration` is that same instant minus the record's
/// `(seconds, microseconds)` request timestamp, in milliseconds,
/// right-justified to width 6, matching `FatController.cpp`'s
/// `durationusecs` computation.
fn render_squid(record: &LogRecord, url: &str, proxy_ip: &str, who: &str, from: &str) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let now_ms = now.as_secs() as i64 * 1000 + now.subsec_millis() as i64;
    let record_ms = record.seconds * 1000 + record.microseconds / 1000;
    let duration_ms = now_ms - record_ms;

    let utime = format!("{}.{:03}", now.as_secs(), now.subsec_millis());
    let duration = format!("{duration_ms:>6}");
    let hitmiss = if record.cache_hit { "TCP_HIT" } else { "TCP_MISS" };
    format!(
        "{utime} {duration} {client} {hitmiss}/{code} {size} {method} {url} {user} DEFAULT_PARENT/{parent} {mime}",
        utime = utime,
        duration = duration,
        client = from,
        hitmiss = hitmiss,
        code = record.http_code,
        size = record.size,
        method = record.method,
        url = url,
        user = if who.is_empty() { "-" } else { who },
        parent = proxy_ip,
        mime = record.mime_type,
    )
}
