//! End-to-end exercise of the URL cache service over its real Unix
//! socket (spec.md §8 scenario 4: add, query hit, flush, query miss).

use std::time::Duration;

use portcullis::signals::Signals;
use portcullis::url_cache::UrlCacheClient;

static SIGNALS: Signals = Signals::new();

fn spawn_service(socket_path: std::path::PathBuf) {
    std::thread::spawn(move || {
        portcullis::url_cache::run_service(&socket_path, 4, 16, Duration::from_secs(60), &SIGNALS).unwrap();
    });
    // Give the listener a moment to bind before the client connects.
    std::thread::sleep(Duration::from_millis(100));
}

#[test]
fn add_query_flush_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("urlcache.sock");
    spawn_service(socket_path.clone());

    let client = UrlCacheClient::new(Duration::from_secs(2));
    assert!(!client.query(&socket_path, 1, "http://example.com/").unwrap());

    client.add(&socket_path, 1, "http://example.com/").unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert!(client.query(&socket_path, 1, "http://example.com/").unwrap());

    // A different group never sees the same URL.
    assert!(!client.query(&socket_path, 2, "http://example.com/").unwrap());

    client.flush(&socket_path).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert!(!client.query(&socket_path, 1, "http://example.com/").unwrap());

    SIGNALS.request_terminate();
}
