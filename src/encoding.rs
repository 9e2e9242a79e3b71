//! Content-coding negotiation (RFC 7231 §5.3.4 `Accept-Encoding`) and the
//! gzip/deflate streaming encoders layered onto the response's chunked write
//! chain. Compression is only ever selected together with chunked
//! transfer-coding, so these encoders compose directly onto a
//! `ChunkedOutputStream` rather than a bare `AsyncWrite` sink.

use crate::io::chunked::ChunkedOutputStream;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::io::{self, Write};
use tokio::io::AsyncWrite;

/// Default compressible-type patterns, matched against the response's
/// content-type (suffix before `;` stripped by the caller).
pub const DEFAULT_COMPRESSIBLE_PATTERNS: &[&str] =
    &["text/*", "*/javascript", "*icon", "*+xml", "*/json"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentCoding {
    Gzip,
    Deflate,
}

impl ContentCoding {
    pub fn token(&self) -> &'static str {
        match self {
            ContentCoding::Gzip => "gzip",
            ContentCoding::Deflate => "deflate",
        }
    }
}

/// Picks the first codec the client's `Accept-Encoding` list accepts,
/// preferring gzip over deflate when both are present.
pub fn negotiate(accept_encoding: Option<&str>) -> Option<ContentCoding> {
    let list = accept_encoding?;
    let tokens = crate::util::split_element_list(list);
    let accepts = |name: &str| {
        tokens.iter().any(|t| {
            let coding = t.split(';').next().unwrap_or("").trim();
            coding.eq_ignore_ascii_case(name)
        })
    };
    if accepts("gzip") {
        Some(ContentCoding::Gzip)
    } else if accepts("deflate") {
        Some(ContentCoding::Deflate)
    } else {
        None
    }
}

/// Matches a content-type (before any `;` parameters) against one pattern:
/// exact, `*suffix`, or `prefix*`.
fn matches_pattern(content_type: &str, pattern: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        content_type.ends_with(suffix)
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        content_type.starts_with(prefix)
    } else {
        content_type == pattern
    }
}

pub fn is_compressible(content_type: &str, patterns: &[String]) -> bool {
    let bare = content_type.split(';').next().unwrap_or("").trim();
    patterns.iter().any(|p| matches_pattern(bare, p))
}

/// gzip compression wrapped around a chunked-encoded sink: each flush of
/// newly-compressed bytes becomes one chunk.
pub struct ChunkedGzipWriter<W> {
    chunked: ChunkedOutputStream<W>,
    encoder: GzEncoder<Vec<u8>>,
}

impl<W: AsyncWrite + Unpin> ChunkedGzipWriter<W> {
    pub fn new(inner: W, level: Compression) -> Self {
        ChunkedGzipWriter {
            chunked: ChunkedOutputStream::new(inner),
            encoder: GzEncoder::new(Vec::new(), level),
        }
    }

    pub async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.encoder.write_all(buf)?;
        flush_pending(&mut self.chunked, self.encoder.get_mut()).await
    }

    /// Finalizes the gzip trailer, flushes it as a final chunk, and writes
    /// the chunked terminator. Does not close the underlying sink.
    pub async fn close(mut self) -> io::Result<()> {
        let trailer = self.encoder.finish()?;
        if !trailer.is_empty() {
            self.chunked.write(&trailer).await?;
        }
        self.chunked.close().await
    }
}

/// zlib/deflate counterpart of `ChunkedGzipWriter`.
pub struct ChunkedDeflateWriter<W> {
    chunked: ChunkedOutputStream<W>,
    encoder: ZlibEncoder<Vec<u8>>,
}

impl<W: AsyncWrite + Unpin> ChunkedDeflateWriter<W> {
    pub fn new(inner: W, level: Compression) -> Self {
        ChunkedDeflateWriter {
            chunked: ChunkedOutputStream::new(inner),
            encoder: ZlibEncoder::new(Vec::new(), level),
        }
    }

    pub async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.encoder.write_all(buf)?;
        flush_pending(&mut self.chunked, self.encoder.get_mut()).await
    }

    pub async fn close(mut self) -> io::Result<()> {
        let trailer = self.encoder.finish()?;
        if !trailer.is_empty() {
            self.chunked.write(&trailer).await?;
        }
        self.chunked.close().await
    }
}

async fn flush_pending<W: AsyncWrite + Unpin>(
    chunked: &mut ChunkedOutputStream<W>,
    pending: &mut Vec<u8>,
) -> io::Result<()> {
    if !pending.is_empty() {
        let data = std::mem::take(pending);
        chunked.write(&data).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::chunked::ChunkedStream;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[test]
    fn negotiate_prefers_gzip_over_deflate() {
        assert_eq!(negotiate(Some("deflate, gzip")), Some(ContentCoding::Gzip));
    }

    #[test]
    fn negotiate_falls_back_to_deflate() {
        assert_eq!(negotiate(Some("deflate")), Some(ContentCoding::Deflate));
    }

    #[test]
    fn negotiate_none_when_unsupported() {
        assert_eq!(negotiate(Some("br")), None);
        assert_eq!(negotiate(None), None);
    }

    fn patterns() -> Vec<String> {
        DEFAULT_COMPRESSIBLE_PATTERNS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn compressible_patterns_match() {
        let p = patterns();
        assert!(is_compressible("text/plain; charset=utf-8", &p));
        assert!(is_compressible("application/javascript", &p));
        assert!(is_compressible("image/x-icon", &p));
        assert!(is_compressible("application/xhtml+xml", &p));
        assert!(is_compressible("application/json", &p));
        assert!(!is_compressible("image/png", &p));
    }

    async fn unchunk(buf: Vec<u8>) -> Vec<u8> {
        let mut dec = ChunkedStream::new(BufReader::new(Cursor::new(buf)));
        let mut out = Vec::new();
        dec.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn gzip_chunked_roundtrips_through_decoders() {
        let mut out = Vec::new();
        {
            let mut enc = ChunkedGzipWriter::new(&mut out, Compression::default());
            enc.write(b"hello ").await.unwrap();
            enc.write(b"world").await.unwrap();
            enc.close().await.unwrap();
        }
        let compressed = unchunk(out).await;
        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        let mut decoded = String::new();
        std::io::Read::read_to_string(&mut decoder, &mut decoded).unwrap();
        assert_eq!(decoded, "hello world");
    }

    #[tokio::test]
    async fn deflate_chunked_roundtrips_through_decoders() {
        let mut out = Vec::new();
        {
            let mut enc = ChunkedDeflateWriter::new(&mut out, Compression::default());
            enc.write(b"hello world").await.unwrap();
            enc.close().await.unwrap();
        }
        let compressed = unchunk(out).await;
        let mut decoder = flate2::read::ZlibDecoder::new(&compressed[..]);
        let mut decoded = String::new();
        std::io::Read::read_to_string(&mut decoder, &mut decoded).unwrap();
        assert_eq!(decoded, "hello world");
    }
}
