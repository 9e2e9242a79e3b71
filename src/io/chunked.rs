//! Chunked transfer-coding decoder and encoder (RFC 7230 §4.1).
//!
//! The decoder is expressed as a handful of plain `async fn`s rather than a
//! hand-rolled `poll_read` state machine: chunk boundaries require reading a
//! line, then a fixed number of body bytes, then verifying a trailing
//! CRLF — a sequence of suspension points that `async`/`.await` expresses
//! directly, the same shape `hyper`'s and `dacha`'s chunked decoders use.

use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::io::line::read_line_latin1;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Decodes a chunked request body, one `read` call at a time.
pub struct ChunkedStream<R> {
    inner: R,
    limit: u64,
    initialized: bool,
    finished: bool,
    trailers: Headers,
}

impl<R: AsyncBufRead + Unpin> ChunkedStream<R> {
    pub fn new(inner: R) -> Self {
        ChunkedStream {
            inner,
            limit: 0,
            initialized: false,
            finished: false,
            trailers: Headers::new(),
        }
    }

    /// Trailer headers read after the terminating zero-size chunk. Empty
    /// until the stream has been fully consumed.
    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }

    async fn advance_chunk(&mut self) -> Result<()> {
        if self.initialized {
            // Verify and discard the trailing CRLF of the previous chunk.
            let crlf = read_line_latin1(&mut self.inner).await?;
            if !crlf.is_empty() {
                return Err(Error::Protocol("malformed chunk terminator".into()));
            }
        }
        self.initialized = true;

        let line = read_line_latin1(&mut self.inner).await?;
        let size_part = line.split(';').next().unwrap_or("").trim();
        let size = u64::from_str_radix(size_part, 16)
            .map_err(|_| Error::Protocol(format!("malformed chunk size: {line:?}")))?;

        if size == 0 {
            self.finished = true;
            // Optional trailer headers, terminated by an empty line.
            self.trailers = Headers::read_from(&mut self.inner).await?;
        } else {
            self.limit = size;
        }
        Ok(())
    }

    /// Reads into `buf`, returning the number of bytes read (0 at the true
    /// end of the chunked body, after trailers have been consumed).
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.finished {
                return Ok(0);
            }
            if self.limit == 0 {
                self.advance_chunk()
                    .await
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
                continue;
            }
            let want = (self.limit as usize).min(buf.len()).max(1).min(buf.len());
            let n = self.inner.read(&mut buf[..want]).await?;
            if n == 0 {
                return Err(super::unexpected_eof("truncated chunk body"));
            }
            self.limit -= n as u64;
            return Ok(n);
        }
    }

    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> io::Result<usize> {
        let mut buf = [0u8; 4096];
        let start = out.len();
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out.len() - start)
    }
}

/// Encodes a response body as chunked transfer-coding: each `write` call
/// becomes exactly one chunk.
pub struct ChunkedOutputStream<W> {
    inner: W,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> ChunkedOutputStream<W> {
    pub fn new(inner: W) -> Self {
        ChunkedOutputStream { inner, closed: false }
    }

    pub async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let header = format!("{:x}\r\n", data.len());
        self.inner.write_all(header.as_bytes()).await?;
        self.inner.write_all(data).await?;
        self.inner.write_all(b"\r\n").await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }

    /// Writes the zero-size terminator chunk and an empty trailer. Does
    /// not close the underlying stream.
    pub async fn close(&mut self) -> io::Result<()> {
        if !self.closed {
            self.closed = true;
            self.inner.write_all(b"0\r\n\r\n").await?;
            self.inner.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn decodes_simple_chunks() {
        let data = b"5\r\nhello\r\n0\r\n\r\n".to_vec();
        let mut s = ChunkedStream::new(BufReader::new(Cursor::new(data)));
        let mut out = Vec::new();
        s.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn decodes_multiple_chunks_and_trailers() {
        let data = b"3\r\nfoo\r\n3\r\nbar\r\n0\r\nX-Trailer: yes\r\n\r\n".to_vec();
        let mut s = ChunkedStream::new(BufReader::new(Cursor::new(data)));
        let mut out = Vec::new();
        s.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"foobar");
        assert_eq!(s.trailers().get("x-trailer"), Some("yes"));
    }

    #[tokio::test]
    async fn malformed_size_fails() {
        let data = b"zz\r\nhello\r\n".to_vec();
        let mut s = ChunkedStream::new(BufReader::new(Cursor::new(data)));
        let mut out = Vec::new();
        assert!(s.read_to_end(&mut out).await.is_err());
    }

    #[tokio::test]
    async fn chunk_size_with_extension_is_ignored() {
        let data = b"5;foo=bar\r\nhello\r\n0\r\n\r\n".to_vec();
        let mut s = ChunkedStream::new(BufReader::new(Cursor::new(data)));
        let mut out = Vec::new();
        s.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn encoder_roundtrips_through_decoder() {
        let mut buf = Vec::new();
        {
            let mut enc = ChunkedOutputStream::new(&mut buf);
            enc.write(b"hello").await.unwrap();
            enc.write(b"world").await.unwrap();
            enc.close().await.unwrap();
        }
        let mut dec = ChunkedStream::new(BufReader::new(Cursor::new(buf)));
        let mut out = Vec::new();
        dec.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"helloworld");
    }

    #[tokio::test]
    async fn encoder_close_is_idempotent_and_does_not_close_inner() {
        let mut buf = Vec::new();
        let mut enc = ChunkedOutputStream::new(&mut buf);
        enc.close().await.unwrap();
        enc.close().await.unwrap();
        assert_eq!(buf, b"0\r\n\r\n");
    }
}
