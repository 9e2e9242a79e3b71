//! The connection abstraction the rest of the engine is built on: a boxed,
//! type-erased duplex stream so the transaction loop doesn't care whether
//! it's driving a plain `TcpStream` or a TLS session.

use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter, ReadHalf, WriteHalf};

/// Any duplex, unpin, send-able byte stream can serve as a connection.
/// Blanket-implemented for `TcpStream`, `tokio_rustls::server::TlsStream`,
/// and anything else the embedder's `SocketFactory` produces.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + ?Sized> Connection for T {}

/// A type-erased connection, as handed off by a `SocketFactory`.
pub type BoxedConn = Box<dyn Connection>;

/// The 4 KiB buffered read half shared by every request on a connection.
pub type ConnReader = BufReader<ReadHalf<BoxedConn>>;

/// The 4 KiB buffered write half shared by every response on a connection.
pub type ConnWriter = BufWriter<WriteHalf<BoxedConn>>;

pub const BUFFER_SIZE: usize = 4096;

pub fn split(conn: BoxedConn) -> (ConnReader, ConnWriter) {
    let (read_half, write_half) = tokio::io::split(conn);
    (
        BufReader::with_capacity(BUFFER_SIZE, read_half),
        BufWriter::with_capacity(BUFFER_SIZE, write_half),
    )
}
