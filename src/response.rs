//! Response writer: header-sending rule, streaming-encoder chain, and the
//! `send`/`sendError`/`redirect`/`sendBody` convenience layer.

use crate::conditional::ByteRange;
use crate::conn::ConnWriter;
use crate::encoding::{self, ChunkedDeflateWriter, ChunkedGzipWriter, ContentCoding};
use crate::headers::Headers;
use crate::io::chunked::ChunkedOutputStream;
use crate::io::transfer::transfer;
use crate::request::HttpVersion;
use crate::util::{clamp_to_now, format_http_date, reason_phrase};
use flate2::Compression;
use std::io;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// `Response` state machine: headers may only be mutated before they're
/// sent, and sending is idempotently one-shot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseState {
    NothingSent,
    HeadersSent,
    Closed,
}

/// The lazily-built encoder chain `getBody` composes. Compression is only
/// ever selected alongside chunked transfer-coding (see §4.4's framing
/// rule), so the compressed variants wrap a `ChunkedOutputStream` directly
/// rather than a bare connection writer.
pub enum BodyWriter<'w> {
    Identity(&'w mut ConnWriter),
    Chunked(ChunkedOutputStream<&'w mut ConnWriter>),
    GzipChunked(ChunkedGzipWriter<&'w mut ConnWriter>),
    DeflateChunked(ChunkedDeflateWriter<&'w mut ConnWriter>),
}

impl<'w> BodyWriter<'w> {
    pub async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            BodyWriter::Identity(w) => w.write_all(buf).await,
            BodyWriter::Chunked(c) => c.write(buf).await,
            BodyWriter::GzipChunked(c) => c.write(buf).await,
            BodyWriter::DeflateChunked(c) => c.write(buf).await,
        }
    }

    /// Closes the outermost encoder, cascading to the layers beneath it,
    /// then flushes — but never closes — the underlying connection stream.
    pub async fn close(self) -> io::Result<()> {
        match self {
            BodyWriter::Identity(w) => w.flush().await,
            BodyWriter::Chunked(mut c) => c.close().await,
            BodyWriter::GzipChunked(c) => c.close().await,
            BodyWriter::DeflateChunked(c) => c.close().await,
        }
    }
}

/// Per-transaction response. Borrows the connection's buffered writer for
/// this transaction's lifetime; the writer moves into the lazily-built body
/// encoder on first `body()` call.
pub struct Response<'w> {
    writer: Option<&'w mut ConnWriter>,
    body: Option<BodyWriter<'w>>,
    headers: Headers,
    state: ResponseState,
    status: u16,
    discard_body: bool,
    client_is_1_1: bool,
    client_wants_close: bool,
    accept_encoding: Option<String>,
    compressible_patterns: Vec<String>,
    compression_level: Compression,
    selected_coding: Option<ContentCoding>,
    force_close: bool,
}

impl<'w> Response<'w> {
    pub fn new(
        writer: &'w mut ConnWriter,
        client_version: HttpVersion,
        client_wants_close: bool,
        accept_encoding: Option<String>,
    ) -> Self {
        Response {
            writer: Some(writer),
            body: None,
            headers: Headers::new(),
            state: ResponseState::NothingSent,
            status: 200,
            discard_body: false,
            client_is_1_1: client_version.is_1_1(),
            client_wants_close,
            accept_encoding,
            compressible_patterns: encoding::DEFAULT_COMPRESSIBLE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            compression_level: Compression::default(),
            selected_coding: None,
            force_close: false,
        }
    }

    pub fn set_compressible_patterns(&mut self, patterns: Vec<String>) {
        self.compressible_patterns = patterns;
    }

    pub fn set_compression_level(&mut self, level: Compression) {
        self.compression_level = level;
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Suppresses any body output — set for HEAD.
    pub fn set_discard_body(&mut self, discard: bool) {
        self.discard_body = discard;
    }

    /// Whether the connection must close after this response: either the
    /// client asked for it, or the server had to fall back to
    /// stream-until-close framing for a pre-1.1 client with unknown length.
    pub fn connection_will_close(&self) -> bool {
        self.client_wants_close || self.force_close
    }

    /// Mutable header access, valid only before headers are sent. This is
    /// the caller's responsibility to respect; like the rest of this
    /// engine's header collection, mutation after send is a programming
    /// error rather than a checked one.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Implements the header-sending rule and framing selection, then
    /// writes the status line and headers. `length` is the body's
    /// known length, if any; `range`, when set, rewrites 200 to 206 and
    /// adds `Content-Range`.
    pub async fn send_headers(
        &mut self,
        status: u16,
        length: Option<u64>,
        last_modified: Option<SystemTime>,
        etag: Option<&str>,
        content_type: Option<&str>,
        range: Option<ByteRange>,
    ) -> io::Result<()> {
        if self.state != ResponseState::NothingSent {
            return Err(io::Error::new(io::ErrorKind::Other, "headers already sent"));
        }

        self.status = if range.is_some() && status == 200 { 206 } else { status };

        if let Some(r) = range {
            if !self.headers.contains("Content-Range") {
                let total = length.map(|l| l.to_string()).unwrap_or_else(|| "*".to_string());
                self.headers.replace("Content-Range", format!("bytes {}-{}/{total}", r.start, r.end));
            }
        }

        if !self.headers.contains("Content-Type") {
            self.headers.replace("Content-Type", content_type.unwrap_or("application/octet-stream"));
        }

        if !self.headers.contains("Vary") {
            self.headers.add("Vary", "Accept-Encoding");
        }

        if let Some(lm) = last_modified {
            if !self.headers.contains("Last-Modified") {
                self.headers.replace("Last-Modified", format_http_date(clamp_to_now(lm)));
            }
        }

        if let Some(etag) = etag {
            if !self.headers.contains("ETag") {
                self.headers.replace("ETag", etag.to_string());
            }
        }

        if self.client_wants_close && !self.headers.contains("Connection") {
            self.headers.replace("Connection", "close");
        }

        self.select_framing(length, range);
        self.write_status_and_headers().await?;
        self.state = ResponseState::HeadersSent;
        Ok(())
    }

    /// Framing selection, applied only when the caller hasn't already set
    /// Content-Length or Transfer-Encoding by hand.
    /// `length` is the full resource length (used above for Content-Range);
    /// the actual bytes transferred — and hence Content-Length — is the
    /// range's own length when a range applies.
    fn select_framing(&mut self, length: Option<u64>, range: Option<ByteRange>) {
        if self.headers.contains("Content-Length") || self.headers.contains("Transfer-Encoding") {
            return;
        }

        if let Some(r) = range {
            // A satisfied range always has an exact length; never compress
            // or chunk a partial-content response.
            self.headers.replace("Content-Length", r.len().to_string());
            return;
        }

        if self.client_is_1_1 {
            let content_type = self.headers.get("Content-Type").unwrap_or("application/octet-stream").to_string();
            let compressible = encoding::is_compressible(&content_type, &self.compressible_patterns);
            let length_favors_compression = length.map(|l| l > 300).unwrap_or(true);

            if compressible && length_favors_compression {
                if let Some(coding) = encoding::negotiate(self.accept_encoding.as_deref()) {
                    self.headers.replace("Transfer-Encoding", "chunked");
                    self.headers.replace("Content-Encoding", coding.token());
                    self.selected_coding = Some(coding);
                    return;
                }
            }

            if let Some(len) = length {
                self.headers.replace("Content-Length", len.to_string());
            } else {
                self.headers.replace("Transfer-Encoding", "chunked");
            }
        } else if let Some(len) = length {
            self.headers.replace("Content-Length", len.to_string());
        } else {
            // Pre-1.1 client, unknown length: stream until close.
            self.force_close = true;
            if !self.headers.contains("Connection") {
                self.headers.replace("Connection", "close");
            }
        }
    }

    async fn write_status_and_headers(&mut self) -> io::Result<()> {
        if !self.headers.contains("Date") {
            self.headers.replace("Date", format_http_date(SystemTime::now()));
        }
        if !self.headers.contains("Server") {
            self.headers.replace("Server", "litehttp");
        }

        let mut out = String::new();
        out.push_str(&format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status)));
        self.headers.write_to(&mut out);

        let writer = self.writer.as_deref_mut().expect("writer available before body is fetched");
        writer.write_all(out.as_bytes()).await
    }

    /// Writes an interim `100 Continue` status line ahead of the real
    /// response, for `Expect: 100-continue` (RFC 7231 §5.1.1). Leaves
    /// response state untouched — the real status and headers are still
    /// pending.
    pub async fn send_continue(&mut self) -> io::Result<()> {
        let writer = self.writer.as_deref_mut().expect("writer available before body is fetched");
        writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
        writer.flush().await
    }

    /// Sends a bare-headers response (status + ETag/Vary/Last-Modified/Date
    /// /Server only, no body) — used for 304 Not Modified (RFC 7232 §4.1)
    /// and 412 Precondition Failed (RFC 7232 §4.2).
    pub async fn send_bare_status(
        &mut self,
        status: u16,
        last_modified: Option<SystemTime>,
        etag: Option<&str>,
    ) -> io::Result<()> {
        self.headers.replace("Content-Length", "0");
        self.send_headers(status, None, last_modified, etag, None, None).await?;
        self.close().await
    }

    /// Sends 416 with `Content-Range: bytes */<total_len>` and no body, for
    /// a `Range` request whose start is at or past the resource's length.
    pub async fn send_range_not_satisfiable(&mut self, total_len: u64) -> io::Result<()> {
        self.headers.replace("Content-Range", format!("bytes */{total_len}"));
        self.headers.replace("Content-Length", "0");
        self.send_headers(416, None, None, None, None, None).await?;
        self.close().await
    }

    /// Lazily builds (on first call) and returns the body encoder chain.
    /// Returns `None` when the body is suppressed (HEAD) or headers have
    /// not yet been sent.
    pub fn body(&mut self) -> Option<&mut BodyWriter<'w>> {
        if self.discard_body || self.state != ResponseState::HeadersSent {
            return None;
        }
        if self.body.is_none() {
            let writer = self.writer.take()?;
            let chunked = self
                .headers
                .get("Transfer-Encoding")
                .map(|v| encoding_contains(v, "chunked"))
                .unwrap_or(false);

            let built = if chunked {
                match self.selected_coding {
                    Some(ContentCoding::Gzip) => {
                        BodyWriter::GzipChunked(ChunkedGzipWriter::new(writer, self.compression_level))
                    }
                    Some(ContentCoding::Deflate) => {
                        BodyWriter::DeflateChunked(ChunkedDeflateWriter::new(writer, self.compression_level))
                    }
                    None => BodyWriter::Chunked(ChunkedOutputStream::new(writer)),
                }
            } else {
                BodyWriter::Identity(writer)
            };
            self.body = Some(built);
        }
        self.body.as_mut()
    }

    /// Closes the body encoder chain (if any was built) and flushes the
    /// connection writer. Idempotent-safe to call even with no body ever
    /// requested (e.g. a HEAD response, or `Content-Length: 0`).
    pub async fn close(&mut self) -> io::Result<()> {
        if self.state == ResponseState::Closed {
            return Ok(());
        }
        if let Some(body) = self.body.take() {
            body.close().await?;
        } else if let Some(writer) = self.writer.as_deref_mut() {
            writer.flush().await?;
        }
        self.state = ResponseState::Closed;
        Ok(())
    }

    /// Transfers `length` bytes (or `range.end - range.start + 1` when a
    /// range is set) from `src` through the body encoder chain. If a range
    /// is set, `src` must already be positioned at `range.start`.
    pub async fn send_body<R: AsyncRead + Unpin + ?Sized>(
        &mut self,
        src: &mut R,
        length: u64,
        range: Option<ByteRange>,
    ) -> io::Result<u64> {
        let want = range.map(|r| r.len()).unwrap_or(length);
        match self.body() {
            Some(body) => copy_through(body, src, want).await,
            None => transfer(src, None::<&mut tokio::io::Empty>, Some(want)).await,
        }
    }

    /// `send(status, text)`: writes a UTF-8 text body with a weak ETag
    /// derived from its content, defaulting Content-Type to
    /// `text/html; charset=utf-8`.
    pub async fn send(&mut self, status: u16, text: &str) -> io::Result<()> {
        if !self.headers.contains("Content-Type") {
            self.headers.replace("Content-Type", "text/html; charset=utf-8");
        }
        let bytes = text.as_bytes();
        let etag = format!("W/\"{:x}\"", fnv1a(bytes));
        if !self.headers.contains("ETag") {
            self.headers.replace("ETag", etag);
        }
        self.send_headers(status, Some(bytes.len() as u64), None, None, None, None).await?;
        if let Some(body) = self.body() {
            body.write(bytes).await?;
        }
        self.close().await
    }

    /// `sendError(status, msg)`: a minimal HTML page with an escaped
    /// message.
    pub async fn send_error(&mut self, status: u16, msg: &str) -> io::Result<()> {
        let escaped = html_escape(msg);
        let body = format!(
            "<html><head><title>{status} {reason}</title></head><body><h1>{status} {reason}</h1><p>{escaped}</p></body></html>",
            reason = reason_phrase(status),
        );
        self.send(status, &body).await
    }

    /// `redirect(url, permanent)`: 301 or 302 with a `Location` header and a
    /// short body for clients that expect one.
    pub async fn redirect(&mut self, url: &str, permanent: bool) -> io::Result<()> {
        let status = if permanent { 301 } else { 302 };
        let normalized = url.chars().map(|c| if c.is_ascii() { c } else { '?' }).collect::<String>();
        self.headers.replace("Location", normalized.clone());
        let body = format!(
            "<html><body>Redirecting to <a href=\"{normalized}\">{normalized}</a></body></html>"
        );
        self.send(status, &body).await
    }
}

fn encoding_contains(value: &str, token: &str) -> bool {
    crate::util::split_element_list(value).iter().any(|t| t.eq_ignore_ascii_case(token))
}

async fn copy_through<R: AsyncRead + Unpin + ?Sized>(
    body: &mut BodyWriter<'_>,
    src: &mut R,
    limit: u64,
) -> io::Result<u64> {
    use tokio::io::AsyncReadExt;
    let mut buf = [0u8; 4096];
    let mut total = 0u64;
    while total < limit {
        let want = ((limit - total) as usize).min(buf.len());
        let n = src.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(crate::io::unexpected_eof("short read while sending body"));
        }
        body.write(&buf[..n]).await?;
        total += n as u64;
    }
    Ok(total)
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
