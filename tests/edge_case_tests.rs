//! End-to-end edge cases that only surface once the full request/response
//! pipeline is wired together: directory welcome, trailing-slash redirects,
//! duplicate slashes, and out-of-range `Range` requests.

mod common;

use common::{roundtrip, TestServer};
use std::sync::Arc;

#[tokio::test]
async fn directory_welcome_serves_configured_index_file() {
    let server = TestServer::spawn(|srv, dir| {
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/index.html"), b"<h1>docs</h1>").unwrap();
        let handler = Arc::new(litehttp::fileserving::FileServingHandler::new(
            dir.path(),
            "/",
            Arc::clone(&srv.mime_registry),
            Arc::clone(&srv.directory_index),
            true,
        ));
        srv.add_context("", "/", &["GET"], handler);
        srv.host_mut("").directory_index = Some("index.html".to_string());
    })
    .await;

    let mut stream = server.connect();
    let response = roundtrip(&mut stream, b"GET /docs/ HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("<h1>docs</h1>"));
}

#[tokio::test]
async fn directory_without_index_falls_back_to_generated_listing() {
    let server = TestServer::spawn(|srv, dir| {
        std::fs::create_dir(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/a.txt"), b"a").unwrap();
        let handler = Arc::new(litehttp::fileserving::FileServingHandler::new(
            dir.path(),
            "/",
            Arc::clone(&srv.mime_registry),
            Arc::clone(&srv.directory_index),
            true,
        ));
        srv.add_context("", "/", &["GET"], handler);
        srv.host_mut("").directory_index = Some("index.html".to_string());
    })
    .await;

    let mut stream = server.connect();
    let response = roundtrip(&mut stream, b"GET /assets/ HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("a.txt"));
}

#[tokio::test]
async fn file_request_missing_trailing_slash_on_directory_redirects() {
    let server = TestServer::spawn(|srv, dir| {
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let handler = Arc::new(litehttp::fileserving::FileServingHandler::new(
            dir.path(),
            "/",
            Arc::clone(&srv.mime_registry),
            Arc::clone(&srv.directory_index),
            true,
        ));
        srv.add_context("", "/", &["GET"], handler);
    })
    .await;

    let mut stream = server.connect();
    let response = roundtrip(&mut stream, b"GET /sub HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 301"));
    assert!(response.contains("Location: /sub/"));
}

#[tokio::test]
async fn trailing_slash_on_a_plain_file_is_404() {
    let server = TestServer::spawn(|srv, dir| {
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let handler = Arc::new(litehttp::fileserving::FileServingHandler::new(
            dir.path(),
            "/",
            Arc::clone(&srv.mime_registry),
            Arc::clone(&srv.directory_index),
            true,
        ));
        srv.add_context("", "/", &["GET"], handler);
    })
    .await;

    let mut stream = server.connect();
    let response = roundtrip(&mut stream, b"GET /a.txt/ HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 404"));
}

#[tokio::test]
async fn directory_listing_disallowed_is_403() {
    let server = TestServer::spawn(|srv, dir| {
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let handler = Arc::new(litehttp::fileserving::FileServingHandler::new(
            dir.path(),
            "/",
            Arc::clone(&srv.mime_registry),
            Arc::clone(&srv.directory_index),
            false,
        ));
        srv.add_context("", "/", &["GET"], handler);
    })
    .await;

    let mut stream = server.connect();
    let response = roundtrip(&mut stream, b"GET /sub/ HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 403"));
}

#[tokio::test]
async fn duplicate_slashes_in_target_collapse_before_dispatch() {
    let server = TestServer::spawn(|srv, dir| {
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let handler = Arc::new(litehttp::fileserving::FileServingHandler::new(
            dir.path(),
            "/",
            Arc::clone(&srv.mime_registry),
            Arc::clone(&srv.directory_index),
            false,
        ));
        srv.add_context("", "/", &["GET"], handler);
    })
    .await;

    let mut stream = server.connect();
    let response = roundtrip(&mut stream, b"GET //a.txt HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("hi"));
}

#[tokio::test]
async fn query_string_does_not_affect_path_dispatch() {
    let server = TestServer::spawn(|srv, dir| {
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let handler = Arc::new(litehttp::fileserving::FileServingHandler::new(
            dir.path(),
            "/",
            Arc::clone(&srv.mime_registry),
            Arc::clone(&srv.directory_index),
            false,
        ));
        srv.add_context("", "/", &["GET"], handler);
    })
    .await;

    let mut stream = server.connect();
    let response = roundtrip(&mut stream, b"GET /a.txt?x=1&y=2 HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("hi"));
}

#[tokio::test]
async fn range_start_past_length_is_416() {
    let server = TestServer::spawn(|srv, dir| {
        std::fs::write(dir.path().join("f"), b"abcdefghijklmnopqrstuvwxyz").unwrap();
        let handler = Arc::new(litehttp::fileserving::FileServingHandler::new(
            dir.path(),
            "/",
            Arc::clone(&srv.mime_registry),
            Arc::clone(&srv.directory_index),
            false,
        ));
        srv.add_context("", "/", &["GET"], handler);
    })
    .await;

    let mut stream = server.connect();
    let response = roundtrip(&mut stream, b"GET /f HTTP/1.1\r\nHost: x\r\nRange: bytes=1000-2000\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 416"));
    assert!(response.contains("Content-Range: bytes */26"));
}

#[tokio::test]
async fn if_range_matching_etag_applies_the_range() {
    let server = TestServer::spawn(|srv, dir| {
        std::fs::write(dir.path().join("f"), b"abcdefghijklmnopqrstuvwxyz").unwrap();
        let handler = Arc::new(litehttp::fileserving::FileServingHandler::new(
            dir.path(),
            "/",
            Arc::clone(&srv.mime_registry),
            Arc::clone(&srv.directory_index),
            false,
        ));
        srv.add_context("", "/", &["GET"], handler);
    })
    .await;

    let mut stream = server.connect();
    let first = roundtrip(&mut stream, b"GET /f HTTP/1.1\r\nHost: x\r\n\r\n");
    let etag = first
        .lines()
        .find_map(|l| l.strip_prefix("ETag: "))
        .expect("ETag header present")
        .trim()
        .to_string();

    let mut stream = server.connect();
    let request = format!("GET /f HTTP/1.1\r\nHost: x\r\nRange: bytes=5-9\r\nIf-Range: {etag}\r\n\r\n");
    let response = roundtrip(&mut stream, request.as_bytes());

    assert!(response.starts_with("HTTP/1.1 206 Partial Content\r\n"));
    assert!(response.ends_with("fghij"));
}

#[tokio::test]
async fn if_range_stale_etag_returns_full_body_instead_of_range() {
    let server = TestServer::spawn(|srv, dir| {
        std::fs::write(dir.path().join("f"), b"abcdefghijklmnopqrstuvwxyz").unwrap();
        let handler = Arc::new(litehttp::fileserving::FileServingHandler::new(
            dir.path(),
            "/",
            Arc::clone(&srv.mime_registry),
            Arc::clone(&srv.directory_index),
            false,
        ));
        srv.add_context("", "/", &["GET"], handler);
    })
    .await;

    let mut stream = server.connect();
    let response = roundtrip(
        &mut stream,
        b"GET /f HTTP/1.1\r\nHost: x\r\nRange: bytes=5-9\r\nIf-Range: W/\"not-the-current-tag\"\r\n\r\n",
    );

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(!response.contains("Content-Range"));
    assert!(response.ends_with("abcdefghijklmnopqrstuvwxyz"));
}

#[tokio::test]
async fn unparseable_range_is_ignored_and_full_body_returned() {
    let server = TestServer::spawn(|srv, dir| {
        std::fs::write(dir.path().join("f"), b"abcdefghijklmnopqrstuvwxyz").unwrap();
        let handler = Arc::new(litehttp::fileserving::FileServingHandler::new(
            dir.path(),
            "/",
            Arc::clone(&srv.mime_registry),
            Arc::clone(&srv.directory_index),
            false,
        ));
        srv.add_context("", "/", &["GET"], handler);
    })
    .await;

    let mut stream = server.connect();
    let response = roundtrip(&mut stream, b"GET /f HTTP/1.1\r\nHost: x\r\nRange: bytes=garbage\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("abcdefghijklmnopqrstuvwxyz"));
}
