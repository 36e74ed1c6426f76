//! One request through one accepted connection (spec.md §4.7 step 5).
//!
//! The HTTP parser and header rewriter are named out-of-scope external
//! collaborators (spec.md §1); this is the minimal request-line/header
//! reader needed to drive auth, URL cache, classification, and
//! content-scan against a real byte stream, plus a plain forward-and-
//! relay path, not a compliant HTTP implementation.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::backed_store::{AppendOutcome, BackedStore};
use crate::ip_table::IpTable;
use crate::log_service::{LogClient, LogRecord};
use crate::plugins::auth::{self, AuthPlugin, AuthRequest};
use crate::plugins::scan::{ContentScanPlugin, ExternalScanner, ScanOutcome};
use crate::url_cache::UrlCacheClient;

use super::classify::Classifier;

pub struct ParsedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl ParsedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Reads a request line and headers, stopping at the blank line.
/// Returns `Ok(None)` on a client that closed without sending anything
/// (a keep-alive connection hanging up cleanly).
pub fn read_request(reader: &mut impl BufRead) -> std::io::Result<Option<ParsedRequest>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let line = line.trim_end();
    let mut parts = line.splitn(3, ' ');
    let method = parts.next().unwrap_or_default().to_string();
    let url = parts.next().unwrap_or_default().to_string();
    if method.is_empty() || url.is_empty() {
        return Ok(None);
    }

    let mut headers = Vec::new();
    loop {
        let mut header_line = String::new();
        if reader.read_line(&mut header_line)? == 0 {
            break;
        }
        let header_line = header_line.trim_end();
        if header_line.is_empty() {
            break;
        }
        if let Some((name, value)) = header_line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    Ok(Some(ParsedRequest { method, url, headers }))
}

/// `http://host[:port]/path` → `(host, port)`. Anything else is
/// rejected; CONNECT tunnelling and TLS interception are non-goals
/// (spec.md §1).
pub fn target_host_port(url: &str) -> Option<(String, u16)> {
    let rest = url.strip_prefix("http://")?;
    let authority = rest.split(['/', '?']).next().unwrap_or(rest);
    match authority.split_once(':') {
        Some((host, port)) => port.parse().ok().map(|p| (host.to_string(), p)),
        None => Some((authority.to_string(), 80)),
    }
}

#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub ip_table: &'a IpTable,
    pub auth_plugins: &'a [Box<dyn AuthPlugin>],
    pub classifier: &'a dyn Classifier,
    pub scanner: Option<&'a ExternalScanner>,
    pub url_cache_client: &'a UrlCacheClient,
    pub url_cache_socket: &'a Path,
    pub log_client: &'a LogClient,
    pub log_socket: &'a Path,
    pub log_user_agent: bool,
    pub filter_group_names: &'a [String],
    pub store_ram_cap: usize,
    pub store_disk_cap: usize,
    pub store_tempdir: &'a Path,
    pub naughtiness_threshold: i32,
}

fn now_parts() -> (i64, i64) {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (now.as_secs() as i64, now.subsec_micros() as i64)
}

fn write_status_response(stream: &mut TcpStream, code: u16, reason: &str, body: &str) -> std::io::Result<()> {
    let date = httpdate::fmt_http_date(SystemTime::now());
    write!(
        stream,
        "HTTP/1.1 {code} {reason}\r\nDate: {date}\r\nContent-Type: text/html\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n{body}",
        code = code,
        reason = reason,
        date = date,
        len = body.len(),
        body = body,
    )
}

/// Handles one accepted connection end-to-end: reads the request,
/// resolves the filter group, runs auth and classification, forwards
/// to the origin, optionally scans the response, relays it, and
/// submits a log record. Errors are logged and swallowed — a failed
/// request must not take the worker down.
pub fn handle_connection(mut stream: TcpStream, peer: SocketAddr, services: &Services) {
    let client_ip = match peer.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    };
    let _ = stream.set_read_timeout(Some(Duration::from_secs(30)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(30)));

    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to clone connection for reading");
            return;
        }
    });

    let request = match read_request(&mut reader) {
        Ok(Some(r)) => r,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "failed to read request");
            return;
        }
    };

    let filter_group = services.ip_table.lookup_v4(client_ip).unwrap_or(0);

    let auth_request = AuthRequest {
        client_ip,
        proxy_authorization: request.header("Proxy-Authorization"),
    };
    let user = match auth::identify(services.auth_plugins, &auth_request) {
        auth::AuthResult::Ok(user) => user,
        _ => String::new(),
    };

    let classification = services.classifier.classify(&request.url, &user);
    let naughty = classification.naughty || classification.naughtiness >= services.naughtiness_threshold;

    let (seconds, microseconds) = now_parts();
    let mut record = LogRecord {
        exception: classification.exception,
        category: classification.category,
        naughty,
        naughtiness: classification.naughtiness,
        url: request.url.clone(),
        reason: if naughty { "content policy".to_string() } else { String::new() },
        method: request.method.clone(),
        user,
        source_ip: client_ip.to_string(),
        port: 0,
        scanned: false,
        infected: false,
        content_modified: false,
        url_modified: false,
        header_modified: false,
        size: 0,
        filter_group,
        http_code: 200,
        cache_hit: false,
        mime_type: String::new(),
        seconds,
        microseconds,
        client_host: client_ip.to_string(),
        user_agent: request.header("User-Agent").map(|s| s.to_string()),
    };

    if naughty {
        record.http_code = 403;
        let _ = write_status_response(&mut stream, 403, "Forbidden", "<html><body>Access Denied</body></html>");
        submit_log(services, &record);
        return;
    }

    let cache_hit = services
        .url_cache_client
        .query(services.url_cache_socket, filter_group, &request.url)
        .unwrap_or(false);
    record.cache_hit = cache_hit;

    let Some((host, port)) = target_host_port(&request.url) else {
        record.http_code = 400;
        let _ = write_status_response(&mut stream, 400, "Bad Request", "<html><body>Bad Request</body></html>");
        submit_log(services, &record);
        return;
    };
    record.port = port;

    let body = match forward_request(&host, port, &request, services) {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, host, port, "upstream forward failed");
            record.http_code = 502;
            let _ = write_status_response(&mut stream, 502, "Bad Gateway", "<html><body>Bad Gateway</body></html>");
            submit_log(services, &record);
            return;
        }
    };

    record.size = body.len() as u64;
    record.mime_type = guess_mime(&request.url);

    if !cache_hit {
        if let Some(scanner) = services.scanner {
            record.scanned = true;
            match scanner.scan_memory(body.data().unwrap_or(&[])) {
                Ok(ScanOutcome::Clean) => {
                    let _ = services
                        .url_cache_client
                        .add(services.url_cache_socket, filter_group, &request.url);
                }
                Ok(ScanOutcome::Infected { virus_name }) => {
                    record.infected = true;
                    record.reason = virus_name.unwrap_or_else(|| "infected".to_string());
                    record.http_code = 403;
                    let _ = write_status_response(
                        &mut stream,
                        403,
                        "Forbidden",
                        "<html><body>Content blocked: infected</body></html>",
                    );
                    submit_log(services, &record);
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "scanner error, failing closed");
                    record.http_code = 502;
                    let _ = write_status_response(
                        &mut stream,
                        502,
                        "Bad Gateway",
                        "<html><body>Scan failed</body></html>",
                    );
                    submit_log(services, &record);
                    return;
                }
            }
        }
    }

    if let Ok(data) = body.data() {
        let _ = stream.write_all(data);
    }
    submit_log(services, &record);
}

fn submit_log(services: &Services, record: &LogRecord) {
    if let Err(e) = services.log_client.submit(services.log_socket, record, services.log_user_agent) {
        warn!(error = %e, "failed to submit log record");
    }
}

fn guess_mime(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    crate::mime::get_mime_type(path).to_string()
}

/// Connects to `host:port`, replays the request line/headers, and
/// reads the full response into a [`BackedStore`], finalizing it so
/// callers can inspect the body for scanning before relaying it.
fn forward_request(
    host: &str,
    port: u16,
    request: &ParsedRequest,
    services: &Services,
) -> std::io::Result<BackedStore> {
    let mut upstream = TcpStream::connect((host, port))?;
    upstream.set_read_timeout(Some(Duration::from_secs(30)))?;
    upstream.set_write_timeout(Some(Duration::from_secs(30)))?;

    write!(upstream, "{} {} HTTP/1.1\r\n", request.method, request.url)?;
    for (name, value) in &request.headers {
        write!(upstream, "{name}: {value}\r\n")?;
    }
    write!(upstream, "\r\n")?;
    upstream.flush()?;

    let mut store = BackedStore::new(services.store_ram_cap, services.store_disk_cap, services.store_tempdir);
    let mut buf = [0u8; 8192];
    loop {
        let n = upstream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        match store.append(&buf[..n]) {
            Ok(AppendOutcome::Appended) => {}
            Ok(AppendOutcome::Refused) => break,
            Err(e) => return Err(std::io::Error::other(e.to_string())),
        }
    }
    store.finalize().ok();
    Ok(store)
}
