//! End-to-end scenarios over a real TCP connection, grounded in spec.md
//! §8's concrete scenarios S1-S6.

mod common;

use common::{roundtrip, Ok200, TestServer};
use std::io::Write;

#[tokio::test]
async fn s1_hello_get() {
    let server = TestServer::spawn(|srv, _dir| {
        srv.add_context("", "/hello", &["GET"], std::sync::Arc::new(Ok200));
    })
    .await;

    let mut stream = server.connect();
    let response = roundtrip(&mut stream, b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n");

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: text/plain"));
    assert!(response.contains("Content-Length: 5"));
    assert!(response.contains("Date:"));
    assert!(response.contains("Server:"));
    assert!(response.ends_with("Hello"));
}

#[tokio::test]
async fn s2_range_on_file() {
    let server = TestServer::spawn(|srv, dir| {
        std::fs::write(dir.path().join("f"), b"abcdefghijklmnopqrstuvwxyz").unwrap();
        let handler = std::sync::Arc::new(litehttp::fileserving::FileServingHandler::new(
            dir.path(),
            "/",
            std::sync::Arc::clone(&srv.mime_registry),
            std::sync::Arc::clone(&srv.directory_index),
            false,
        ));
        srv.add_context("", "/", &["GET"], handler);
    })
    .await;

    let mut stream = server.connect();
    let response = roundtrip(&mut stream, b"GET /f HTTP/1.1\r\nHost: x\r\nRange: bytes=5-9\r\n\r\n");

    assert!(response.starts_with("HTTP/1.1 206 Partial Content\r\n"));
    assert!(response.contains("Content-Range: bytes 5-9/26"));
    assert!(response.contains("Content-Length: 5"));
    assert!(response.ends_with("fghij"));
}

#[tokio::test]
async fn s3_if_none_match_hit() {
    let server = TestServer::spawn(|srv, dir| {
        std::fs::write(dir.path().join("f"), b"abcdefghijklmnopqrstuvwxyz").unwrap();
        let handler = std::sync::Arc::new(litehttp::fileserving::FileServingHandler::new(
            dir.path(),
            "/",
            std::sync::Arc::clone(&srv.mime_registry),
            std::sync::Arc::clone(&srv.directory_index),
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
    let request = format!("GET /f HTTP/1.1\r\nHost: x\r\nIf-None-Match: {etag}\r\n\r\n");
    let response = roundtrip(&mut stream, request.as_bytes());

    assert!(response.starts_with("HTTP/1.1 304 Not Modified\r\n"));
    assert!(!response.contains("Content-Type"));
    assert!(response.contains("ETag:"));
    assert!(response.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn s4_chunked_request_body_then_next_request_on_same_connection() {
    struct Echo;
    #[async_trait::async_trait]
    impl litehttp::server::Handler for Echo {
        async fn handle(
            &self,
            req: &mut litehttp::Request<'_>,
            resp: &mut litehttp::Response<'_>,
        ) -> std::io::Result<u32> {
            let mut body = Vec::new();
            req.body_mut().read_to_end(&mut body).await?;
            resp.send(200, &String::from_utf8_lossy(&body)).await?;
            Ok(0)
        }
    }

    let server = TestServer::spawn(|srv, _dir| {
        srv.add_context("", "/echo", &["POST"], std::sync::Arc::new(Echo));
        srv.add_context("", "/hello", &["GET"], std::sync::Arc::new(Ok200));
    })
    .await;

    let mut stream = server.connect();
    stream
        .write_all(b"POST /echo HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n")
        .unwrap();
    stream
        .write_all(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    stream.set_read_timeout(Some(std::time::Duration::from_millis(500))).unwrap();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        use std::io::Read;
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => break,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    let response = String::from_utf8_lossy(&buf);

    assert!(response.contains("hello"));
    assert!(response.matches("HTTP/1.1 200 OK").count() == 2);
}

#[tokio::test]
async fn s5_head_on_get_handler() {
    let server = TestServer::spawn(|srv, _dir| {
        srv.add_context("", "/hello", &["GET"], std::sync::Arc::new(Ok200));
    })
    .await;

    let mut stream = server.connect();
    let response = roundtrip(&mut stream, b"HEAD /hello HTTP/1.1\r\nHost: x\r\n\r\n");

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Length: 5"));
    assert!(response.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn s6_missing_host_on_1_1_is_400() {
    let server = TestServer::spawn(|srv, _dir| {
        srv.add_context("", "/", &["GET"], std::sync::Arc::new(Ok200));
    })
    .await;

    let mut stream = server.connect();
    let response = roundtrip(&mut stream, b"GET / HTTP/1.1\r\n\r\n");

    assert!(response.starts_with("HTTP/1.1 400"));
    assert!(response.contains("Connection: close"));
}
