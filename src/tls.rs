//! Pluggable plain/TLS listener: `SocketFactory` plus a default
//! `rustls`-backed implementation. Feature-gated behind `tls` so the
//! `tokio-rustls` stack stays an optional dependency, the way the pack's
//! HTTP servers keep their TLS backends behind an opt-in feature.

use crate::conn::BoxedConn;
use crate::server::Server;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::ServerConfig as TlsServerConfig;
use tokio_rustls::TlsAcceptor;

/// Turns an accepted `TcpStream` into a boxed connection, plain or over
/// TLS. Embedders who need a different TLS backend implement this instead
/// of `RustlsSocketFactory`.
#[async_trait]
pub trait SocketFactory: Send + Sync {
    async fn accept_plain(&self, stream: TcpStream) -> io::Result<BoxedConn> {
        Ok(Box::new(stream))
    }

    async fn accept_tls(&self, stream: TcpStream) -> io::Result<BoxedConn>;
}

/// Default `SocketFactory`: terminates TLS with `rustls` from a PEM
/// certificate chain and private key.
pub struct RustlsSocketFactory {
    acceptor: TlsAcceptor,
}

impl RustlsSocketFactory {
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> io::Result<Self> {
        let certs = load_certs(cert_path)?;
        let key = load_key(key_path)?;
        let config = TlsServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        Ok(RustlsSocketFactory { acceptor: TlsAcceptor::from(Arc::new(config)) })
    }
}

#[async_trait]
impl SocketFactory for RustlsSocketFactory {
    async fn accept_tls(&self, stream: TcpStream) -> io::Result<BoxedConn> {
        let tls_stream = self.acceptor.accept(stream).await?;
        Ok(Box::new(tls_stream))
    }
}

fn load_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path)?;
    let mut reader = io::BufReader::new(file);
    rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()
}

fn load_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)?;
    let mut reader = io::BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no private key in file"))
}

impl Server {
    /// Binds the listening socket and runs the accept loop exactly like
    /// `start()`, but terminates TLS on every accepted connection through
    /// `factory` before handing it to the transaction engine.
    pub async fn start_tls(self: Arc<Self>, factory: Arc<dyn SocketFactory>) -> io::Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.config.port).into();
        let listener = TcpListener::bind(addr).await?;
        log::info!("listening (tls) on {addr}");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    log::warn!("accept failed: {e}");
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                log::warn!("failed to set TCP_NODELAY for {peer}: {e}");
            }
            let local_host = stream.local_addr().map(|a| a.ip().to_string()).unwrap_or_else(|_| "localhost".to_string());
            let port = self.config.port;
            let server = Arc::clone(&self);
            let factory = Arc::clone(&factory);
            tokio::spawn(async move {
                let conn = match factory.accept_tls(stream).await {
                    Ok(conn) => conn,
                    Err(e) => {
                        log::debug!("TLS handshake with {peer} failed: {e}");
                        return;
                    }
                };
                if let Err(e) = crate::transaction::serve(conn, server, true, local_host, port, peer).await {
                    log::debug!("connection from {peer} ended: {e}");
                }
            });
        }
    }
}
