//! The request body, framed per RFC 7230 §3.3.3: Content-Length
//! (`Limited`), chunked transfer-coding (`Chunked`), or stream-until-close
//! (`UntilClose`, used only for legacy HTTP/1.0 bodies with neither
//! header). Borrows the connection's buffered reader for the lifetime of
//! one transaction.

use crate::conn::ConnReader;
use crate::headers::Headers;
use crate::io::chunked::ChunkedStream;
use crate::io::limited::LimitedStream;
use crate::io::transfer::transfer;
use crate::io::PrematureEof;
use std::io;
use tokio::io::AsyncWrite;

pub enum Body<'r> {
    Limited(LimitedStream<&'r mut ConnReader>),
    Chunked(Box<ChunkedStream<&'r mut ConnReader>>),
    UntilClose(LimitedStream<&'r mut ConnReader>),
    Empty,
}

impl<'r> Body<'r> {
    pub fn limited(reader: &'r mut ConnReader, len: u64) -> Self {
        Body::Limited(LimitedStream::new(reader, len, PrematureEof::Fail))
    }

    pub fn chunked(reader: &'r mut ConnReader) -> Self {
        Body::Chunked(Box::new(ChunkedStream::new(reader)))
    }

    pub fn until_close(reader: &'r mut ConnReader) -> Self {
        Body::UntilClose(LimitedStream::new(reader, u64::MAX, PrematureEof::TreatAsEof))
    }

    pub fn empty() -> Self {
        Body::Empty
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Body::Limited(s) | Body::UntilClose(s) => {
                use tokio::io::AsyncReadExt;
                s.read(buf).await
            }
            Body::Chunked(s) => s.read(buf).await,
            Body::Empty => Ok(0),
        }
    }

    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> io::Result<usize> {
        match self {
            Body::Limited(s) | Body::UntilClose(s) => {
                use tokio::io::AsyncReadExt;
                s.read_to_end(out).await
            }
            Body::Chunked(s) => s.read_to_end(out).await,
            Body::Empty => Ok(0),
        }
    }

    /// Reads and discards the body to a null sink, aligning the connection
    /// stream for the next request. Mandatory between transactions — a
    /// handler that didn't fully read the body would otherwise leave the
    /// next request's bytes misaligned on the wire.
    pub async fn drain(&mut self) -> io::Result<u64> {
        let mut buf = [0u8; 4096];
        let mut total = 0u64;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            total += n as u64;
        }
        Ok(total)
    }

    /// Trailer headers from a chunked body; empty for any other framing or
    /// before the body has been fully consumed.
    pub fn trailers(&self) -> Headers {
        match self {
            Body::Chunked(s) => s.trailers().clone(),
            _ => Headers::new(),
        }
    }

    /// Copies at most `limit` bytes (or to EOF if `None`) of this body to
    /// `sink`. Used by TRACE to echo the request body.
    pub async fn copy_to<W: AsyncWrite + Unpin + ?Sized>(
        &mut self,
        sink: &mut W,
        limit: Option<u64>,
    ) -> io::Result<u64> {
        match self {
            Body::Limited(s) | Body::UntilClose(s) => transfer(s, Some(sink), limit).await,
            Body::Chunked(_) => {
                let mut buf = Vec::new();
                self.read_to_end(&mut buf).await?;
                let n = match limit {
                    Some(limit) => (limit as usize).min(buf.len()),
                    None => buf.len(),
                };
                tokio::io::AsyncWriteExt::write_all(sink, &buf[..n]).await?;
                Ok(n as u64)
            }
            Body::Empty => Ok(0),
        }
    }
}
