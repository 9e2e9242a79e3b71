//! The request parser: reads the request line and headers off the wire and
//! wraps the body in the framing RFC 7230 §3.3.3 selects.

use crate::body::Body;
use crate::conn::ConnReader;
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::io::line::read_line_latin1;
use crate::util::{split_element_list, trim_duplicates};
use once_cell::unsync::OnceCell;
use std::collections::HashMap;
use url::{form_urlencoded, Url};

/// The three wire versions this engine understands. Anything else is an
/// unparsed token the transaction engine rejects with 400.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpVersion {
    Http09,
    Http10,
    Http11,
}

impl HttpVersion {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "HTTP/1.1" => Some(HttpVersion::Http11),
            "HTTP/1.0" => Some(HttpVersion::Http10),
            "HTTP/0.9" => Some(HttpVersion::Http09),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http11 => "HTTP/1.1",
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http09 => "HTTP/0.9",
        }
    }

    pub fn is_1_1(&self) -> bool {
        matches!(self, HttpVersion::Http11)
    }
}

/// Up to 2 MiB of a form-urlencoded body is consumed to build `params()`.
/// Declared once here since both the parser and its doc comment need it.
const MAX_FORM_BODY: usize = 2 * 1024 * 1024;

/// A parsed HTTP request, borrowing the connection's buffered reader for the
/// body stream for the lifetime of one transaction.
pub struct Request<'r> {
    method: String,
    raw_target: String,
    version_raw: String,
    version: Option<HttpVersion>,
    headers: Headers,
    body: Body<'r>,
    secure: bool,
    local_host: String,
    port: u16,
    base_url: OnceCell<Option<Url>>,
    params: OnceCell<HashMap<String, Vec<String>>>,
    range_spec: OnceCell<Option<String>>,
}

impl<'r> Request<'r> {
    /// Reads one request off `reader`: skips leading blank lines, parses the
    /// request line and headers, and selects body framing per RFC 7230
    /// §3.3.3. A clean EOF before any request-line bytes surfaces as
    /// `Error::MissingRequestLine`, which the transaction engine treats as
    /// an idle connection close rather than a protocol failure.
    pub async fn parse(
        reader: &'r mut ConnReader,
        secure: bool,
        local_host: &str,
        port: u16,
    ) -> Result<Request<'r>> {
        let request_line = loop {
            let line = read_line_latin1(reader).await?;
            if !line.is_empty() {
                break line;
            }
        };

        let tokens: Vec<&str> = request_line.split(' ').filter(|s| !s.is_empty()).collect();
        if tokens.len() != 3 {
            return Err(Error::Protocol(format!(
                "malformed request line: {request_line:?}"
            )));
        }

        let method = tokens[0].to_string();
        let raw_target = trim_duplicates('/', tokens[1]);
        let version_raw = tokens[2].to_string();
        let version = HttpVersion::parse(&version_raw);

        let headers = Headers::read_from(reader).await?;
        let body = Self::frame_body(reader, &headers)?;

        Ok(Request {
            method,
            raw_target,
            version_raw,
            version,
            headers,
            body,
            secure,
            local_host: local_host.to_string(),
            port,
            base_url: OnceCell::new(),
            params: OnceCell::new(),
            range_spec: OnceCell::new(),
        })
    }

    fn frame_body(reader: &'r mut ConnReader, headers: &Headers) -> Result<Body<'r>> {
        if let Some(te) = headers.get("Transfer-Encoding") {
            if !te.eq_ignore_ascii_case("identity") {
                let elements = split_element_list(te);
                let chunked = elements.iter().any(|e| e.eq_ignore_ascii_case("chunked"));
                return Ok(if chunked {
                    Body::chunked(reader)
                } else {
                    Body::until_close(reader)
                });
            }
        }

        if let Some(len) = headers.get("Content-Length") {
            let len = crate::util::parse_ulong(len)
                .ok_or_else(|| Error::Protocol(format!("invalid Content-Length: {len:?}")))?;
            return Ok(Body::limited(reader, len));
        }

        Ok(Body::empty())
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Overwrites the method in place. Used by the transaction engine to
    /// rewrite HEAD into GET before invoking the GET handler.
    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = method.into();
    }

    pub fn raw_target(&self) -> &str {
        &self.raw_target
    }

    /// The request-target's path component, with any query string removed.
    pub fn path(&self) -> &str {
        self.raw_target.split('?').next().unwrap_or(&self.raw_target)
    }

    /// Replaces the path in place, preserving any existing query string.
    /// Used for the directory-welcome convention (§4.6), which temporarily
    /// appends the index filename before falling back to the original path.
    pub fn set_path(&mut self, path: &str) {
        let query = self.query().map(str::to_string);
        self.raw_target = match query {
            Some(q) => format!("{path}?{q}"),
            None => path.to_string(),
        };
        self.base_url = OnceCell::new();
    }

    pub fn query(&self) -> Option<&str> {
        self.raw_target.split_once('?').map(|(_, q)| q)
    }

    pub fn version(&self) -> Option<HttpVersion> {
        self.version
    }

    pub fn version_raw(&self) -> &str {
        &self.version_raw
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body_mut(&mut self) -> &mut Body<'r> {
        &mut self.body
    }

    /// True when the client (via `Connection:` or an HTTP/1.0 default)
    /// wants this to be the last transaction on the connection.
    pub fn wants_close(&self) -> bool {
        match self.headers.get("Connection") {
            Some(v) => split_element_list(v).iter().any(|t| t.eq_ignore_ascii_case("close")),
            None => !matches!(self.version, Some(HttpVersion::Http11)),
        }
    }

    /// The requested `Expect` behavior: `Some(true)` for 100-continue,
    /// `Some(false)` for any other (unsupported) expectation, `None` if
    /// absent.
    pub fn expect_header(&self) -> Option<bool> {
        self.headers
            .get("Expect")
            .map(|v| v.eq_ignore_ascii_case("100-continue"))
    }

    /// Removes every header named in a `Connection:` token list — deliberate,
    /// literal HTTP/1.0 hop-by-hop scrubbing. This can strip a conditional
    /// header the client also named in `Connection`; that is the documented
    /// legacy behavior, not a bug.
    pub fn strip_hop_by_hop(&mut self) {
        if let Some(value) = self.headers.get("Connection").map(str::to_string) {
            for token in split_element_list(&value) {
                self.headers.remove(token);
            }
        }
    }

    /// scheme + host + port, memoized. `None` when the effective host
    /// cannot be turned into a valid URL authority.
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url
            .get_or_init(|| self.compute_base_url())
            .as_ref()
    }

    fn compute_base_url(&self) -> Option<Url> {
        let scheme = if self.secure { "https" } else { "http" };
        let host = self.effective_host();
        Url::parse(&format!("{scheme}://{host}:{port}/", port = self.port)).ok()
    }

    fn effective_host(&self) -> String {
        if let Ok(absolute) = Url::parse(&self.raw_target) {
            if let Some(host) = absolute.host_str() {
                return host.to_string();
            }
        }
        if let Some(host_header) = self.headers.get("Host") {
            return host_header
                .rsplit_once(':')
                .map(|(h, _)| h)
                .unwrap_or(host_header)
                .trim()
                .to_string();
        }
        self.local_host.clone()
    }

    /// The `bytes=` range spec, prefix stripped, memoized. `None` when no
    /// `Range` header was sent or it lacks the `bytes=` prefix.
    pub fn range_spec(&self) -> Option<&str> {
        self.range_spec
            .get_or_init(|| {
                self.headers
                    .get("Range")
                    .and_then(|v| v.strip_prefix("bytes="))
                    .map(str::to_string)
            })
            .as_deref()
    }

    /// Combines the URI query with, for `application/x-www-form-urlencoded`
    /// requests, the URL-decoded body (read once, up to 2 MiB). After this
    /// call, a chunked or content-length body that was consumed here will
    /// report EOF on further `body_mut()` reads — this coupling is
    /// deliberate and documented here rather than papered over with a
    /// rewindable buffer.
    pub async fn params(&mut self) -> &HashMap<String, Vec<String>> {
        if self.params.get().is_none() {
            let computed = self.compute_params().await;
            let _ = self.params.set(computed);
        }
        self.params.get().expect("params populated above")
    }

    async fn compute_params(&mut self) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();

        if let Some(query) = self.query() {
            for (k, v) in form_urlencoded::parse(query.as_bytes()) {
                map.entry(k.into_owned()).or_default().push(v.into_owned());
            }
        }

        let is_form = self
            .headers
            .get("Content-Type")
            .map(|ct| Headers::parse_parameters(ct).0.eq_ignore_ascii_case("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        if is_form {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            while buf.len() < MAX_FORM_BODY {
                let want = (MAX_FORM_BODY - buf.len()).min(chunk.len());
                match self.body.read(&mut chunk[..want]).await {
                    Ok(0) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    Err(_) => break,
                }
            }
            for (k, v) in form_urlencoded::parse(&buf) {
                map.entry(k.into_owned()).or_default().push(v.into_owned());
            }
        }

        map
    }
}
