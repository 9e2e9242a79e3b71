//! Shared low-level helpers: the reason-phrase table, HTTP date parsing in
//! the three legacy formats, and small string utilities used throughout the
//! parser and response writer.

use std::time::{Duration, SystemTime};

/// Looks up the reason phrase for a status code, covering the codes this
/// engine emits itself. Unknown codes get a placeholder rather than an
/// error — arbitrary codes are permitted.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown Status",
    }
}

/// Formats a `SystemTime` as an RFC 1123 date in GMT, the only format the
/// engine ever emits. Delegates to `httpdate`, which supports the full
/// 0001-9999 year range.
pub fn format_http_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

/// Parses a date header value accepting the three formats RFC 7231 §7.1.1.1
/// names: RFC 1123, RFC 850, and asctime. `httpdate::parse_http_date`
/// already accepts all three.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(value.trim()).ok()
}

/// Clamps a `Last-Modified` candidate to "now" — RFC 7232 §2.2.1 requires a
/// server never advertise a modification time in the future.
pub fn clamp_to_now(time: SystemTime) -> SystemTime {
    let now = SystemTime::now();
    if time > now {
        now
    } else {
        time
    }
}

/// Strips consecutive duplicate occurrences of `ch`, e.g.
/// `trim_duplicates('/', "/a//b///c") == "/a/b/c"`.
pub fn trim_duplicates(ch: char, s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if c == ch && prev == Some(ch) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

/// Parses an unsigned long the way the engine's byte-range and
/// content-length parsing requires: digits only, no leading `+`/`-`, no
/// surrounding whitespace.
pub fn parse_ulong(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Trims ASCII whitespace (space, tab, CR, LF) from both ends, matching the
/// tolerant trimming the header collection performs on values.
pub fn trim_ascii_ws(s: &str) -> &str {
    s.trim_matches(|c: char| c == ' ' || c == '\t' || c == '\r' || c == '\n')
}

/// Splits a comma-separated element list (as used by `Connection`,
/// `Transfer-Encoding`, `Accept-Encoding`, `If-Match`, ...), trimming each
/// element and dropping empties.
pub fn split_element_list(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(trim_ascii_ws)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Duration since the epoch truncated to whole seconds, the precision HTTP
/// dates carry.
pub fn truncate_to_secs(time: SystemTime) -> SystemTime {
    let secs = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs();
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}
