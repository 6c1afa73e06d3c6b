//! End-to-end tests against live server instances.
//!
//! Each test starts its own server on an ephemeral port (or a probed free
//! range) and speaks raw HTTP over `TcpStream`, so tests can run in
//! parallel without coordinating ports.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::time::Duration;

use fixture_server::{FileServer, PortRange, ServerConfig, ServerError, serve_directory};
use tempfile::TempDir;

fn fixture_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    std::fs::write(dir.path().join("a.txt"), "hello").expect("write fixture");
    std::fs::write(dir.path().join("data.json"), "{\"ok\":true}").expect("write fixture");
    dir
}

fn config_for(root: &Path) -> ServerConfig {
    ServerConfig {
        document_root: root.to_path_buf(),
        poll_interval_ms: 50,
        ..ServerConfig::default()
    }
}

fn raw_request(host: &str, port: u16, request: &str) -> std::io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect((host, port))?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;
    stream.write_all(request.as_bytes())?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    Ok(response)
}

/// Sends a GET and returns (status code, body bytes).
fn http_get(host: &str, port: u16, path: &str) -> std::io::Result<(u16, Vec<u8>)> {
    let request = format!("GET {path} HTTP/1.1\r\nHost: {host}:{port}\r\nConnection: close\r\n\r\n");
    let response = raw_request(host, port, &request)?;

    let header_end = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| p + 4)
        .unwrap_or(response.len());
    let head = String::from_utf8_lossy(&response[..header_end]);
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);

    Ok((status, response[header_end..].to_vec()))
}

/// Finds `len` consecutive free ports on 127.0.0.1 and returns the base
/// together with listeners holding every port in the window.
fn free_port_window(len: u16) -> (u16, Vec<TcpListener>) {
    for base in (18300u16..19300).step_by(len as usize) {
        let listeners: Vec<TcpListener> = (base..base + len)
            .filter_map(|p| TcpListener::bind(("127.0.0.1", p)).ok())
            .collect();
        if listeners.len() == len as usize {
            return (base, listeners);
        }
    }
    panic!("no free window of {len} consecutive ports found");
}

#[test]
fn serves_fixture_file_then_refuses_after_stop() {
    let dir = fixture_dir();
    let (mut server, base_url) = serve_directory(&config_for(dir.path())).expect("start server");
    assert_eq!(base_url, format!("http://localhost:{}", server.port()));

    let (status, body) = http_get(server.host(), server.port(), "/a.txt").expect("request");
    assert_eq!(status, 200);
    assert_eq!(
        body,
        std::fs::read(dir.path().join("a.txt")).expect("read fixture")
    );

    let port = server.port();
    server.stop();
    assert!(http_get("localhost", port, "/a.txt").is_err());
}

#[test]
fn ephemeral_ports_are_distinct_for_concurrent_servers() {
    let dir = fixture_dir();
    let mut first = FileServer::start(&config_for(dir.path())).expect("start first");
    let mut second = FileServer::start(&config_for(dir.path())).expect("start second");

    assert!(first.port() > 0);
    assert!(second.port() > 0);
    assert_ne!(first.port(), second.port());

    first.stop();
    second.stop();
}

#[test]
fn missing_file_is_not_found() {
    let dir = fixture_dir();
    let mut server = FileServer::start(&config_for(dir.path())).expect("start server");

    let (status, _) = http_get(server.host(), server.port(), "/nope.txt").expect("request");
    assert_eq!(status, 404);

    server.stop();
}

#[test]
fn traversal_outside_root_is_rejected() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let root = dir.path().join("root");
    std::fs::create_dir(&root).expect("create root");
    std::fs::write(root.join("a.txt"), "hello").expect("write fixture");
    std::fs::write(dir.path().join("secret.txt"), "top secret").expect("write secret");

    let mut server = FileServer::start(&config_for(&root)).expect("start server");

    let (status, body) =
        http_get(server.host(), server.port(), "/../secret.txt").expect("request");
    assert_eq!(status, 403);
    assert!(!String::from_utf8_lossy(&body).contains("top secret"));

    server.stop();
}

#[test]
fn unknown_method_is_rejected() {
    let dir = fixture_dir();
    let mut server = FileServer::start(&config_for(dir.path())).expect("start server");

    let request = format!(
        "DELETE /a.txt HTTP/1.1\r\nHost: localhost:{}\r\nConnection: close\r\n\r\n",
        server.port()
    );
    let response = raw_request(server.host(), server.port(), &request).expect("request");
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 405"), "got: {text}");

    server.stop();
}

#[test]
fn head_returns_headers_without_body() {
    let dir = fixture_dir();
    let mut server = FileServer::start(&config_for(dir.path())).expect("start server");

    let request = format!(
        "HEAD /a.txt HTTP/1.1\r\nHost: localhost:{}\r\nConnection: close\r\n\r\n",
        server.port()
    );
    let response = raw_request(server.host(), server.port(), &request).expect("request");
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200 OK"), "got: {text}");
    assert!(text.contains("Content-Length: 5"));
    let body_start = text.find("\r\n\r\n").expect("header terminator") + 4;
    assert_eq!(&text[body_start..], "");

    server.stop();
}

#[test]
fn root_resolves_to_index_html_when_present() {
    let dir = fixture_dir();
    std::fs::write(dir.path().join("index.html"), "<h1>fixtures</h1>").expect("write index");
    let mut server = FileServer::start(&config_for(dir.path())).expect("start server");

    let (status, body) = http_get(server.host(), server.port(), "/").expect("request");
    assert_eq!(status, 200);
    assert_eq!(body, b"<h1>fixtures</h1>");

    server.stop();
}

#[test]
fn root_without_index_lists_directory() {
    let dir = fixture_dir();
    let mut server = FileServer::start(&config_for(dir.path())).expect("start server");

    let (status, body) = http_get(server.host(), server.port(), "/").expect("request");
    assert_eq!(status, 200);
    let listing = String::from_utf8_lossy(&body);
    assert!(listing.contains("a.txt"), "got: {listing}");
    assert!(listing.contains("data.json"));

    server.stop();
}

#[test]
fn range_bind_skips_taken_candidates() {
    let dir = fixture_dir();
    let (base, mut blockers) = free_port_window(2);
    // Keep the first candidate blocked, free the second.
    blockers.truncate(1);

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port_range: Some(PortRange::new(base, base + 1)),
        document_root: dir.path().to_path_buf(),
        poll_interval_ms: 50,
        ..ServerConfig::default()
    };
    let mut server = FileServer::start(&config).expect("start server");
    assert_eq!(server.port(), base + 1);

    let (status, _) = http_get("127.0.0.1", base + 1, "/a.txt").expect("request");
    assert_eq!(status, 200);

    server.stop();
    drop(blockers);
}

#[test]
fn exhausted_range_reports_no_free_address() {
    let dir = fixture_dir();
    let (base, blockers) = free_port_window(3);

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port_range: Some(PortRange::new(base, base + 2)),
        document_root: dir.path().to_path_buf(),
        ..ServerConfig::default()
    };
    match FileServer::start(&config) {
        Err(ServerError::NoFreeAddress { start, end, .. }) => {
            assert_eq!((start, end), (base, base + 2));
        }
        Err(other) => panic!("expected NoFreeAddress, got {other}"),
        Ok(server) => panic!("unexpectedly bound {}", server.base_url()),
    }

    // The failed start must not leave a socket of its own behind.
    drop(blockers);
    for port in base..=base + 2 {
        TcpListener::bind(("127.0.0.1", port)).expect("port should be free again");
    }
}

#[test]
fn readiness_wait_succeeds_against_live_server() {
    let dir = fixture_dir();
    let mut server = FileServer::start(&config_for(dir.path())).expect("start server");

    server.wait_until_ready(5).expect("server should become ready");
    assert!(server.is_running());

    server.stop();
}

#[test]
fn readiness_wait_fails_fast_when_nothing_answers() {
    let dir = fixture_dir();
    let mut server = FileServer::start(&config_for(dir.path())).expect("start server");
    server.stop();

    let err = server
        .wait_until_ready(1)
        .expect_err("probe cannot succeed after stop");
    match err {
        ServerError::ReadinessTimeout { attempts, .. } => assert_eq!(attempts, 1),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!server.is_running());
}

#[test]
fn stop_twice_is_a_no_op() {
    let dir = fixture_dir();
    let mut server = FileServer::start(&config_for(dir.path())).expect("start server");
    server.stop();
    server.stop();
    assert!(!server.is_running());
}

#[test]
fn dropping_the_handle_stops_the_server() {
    let dir = fixture_dir();
    let port = {
        let server = FileServer::start(&config_for(dir.path())).expect("start server");
        server.port()
    };
    assert!(http_get("localhost", port, "/a.txt").is_err());
}
