//! Shared harness for the integration suites: spins up a real `litehttp`
//! server on an ephemeral port and gives tests a plain `TcpStream` to talk
//! to it with.

use litehttp::server::{Handler, Server, ServerConfig};
use litehttp::{Request, Response};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub struct TestServer {
    pub addr: SocketAddr,
    _dir: TempDir,
}

impl TestServer {
    pub async fn spawn(configure: impl FnOnce(&mut Server, &TempDir)) -> TestServer {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut server = Server::new(ServerConfig::default()).expect("server config");
        configure(&mut server, &dir);

        let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let server = Arc::new(server);
        tokio::spawn(async move {
            let _ = server.serve_on(listener).await;
        });

        // Give the spawned accept loop a moment to be ready to accept.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        TestServer { addr, _dir: dir }
    }

    pub fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).expect("connect to test server")
    }
}

/// Sends raw bytes and reads the whole response until the peer closes (or
/// `read_timeout` elapses for keep-alive connections the caller keeps open).
pub fn roundtrip(stream: &mut TcpStream, request: &[u8]) -> String {
    stream.write_all(request).expect("write request");
    stream
        .set_read_timeout(Some(std::time::Duration::from_millis(500)))
        .expect("set read timeout");
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

pub struct Ok200;

#[async_trait::async_trait]
impl Handler for Ok200 {
    async fn handle(&self, _req: &mut Request<'_>, resp: &mut Response<'_>) -> std::io::Result<u32> {
        resp.headers_mut().replace("Content-Type", "text/plain");
        resp.send(200, "Hello").await?;
        Ok(0)
    }
}
