//! Conditional-request evaluation (RFC 7232) and byte-range parsing (RFC
//! 7233 / RFC 2616 §14.35.1).

use crate::headers::Headers;
use crate::util::{parse_http_date, parse_ulong};
use std::time::SystemTime;

/// A normalized, inclusive byte-range envelope: `start..=end`, both valid
/// indices into a resource of some known length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Outcome of attempting to apply a `Range` header against a resource of
/// known `length`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No (valid) range requested, or the header was present but
    /// unparseable — RFC 2616 §14.35.1 says to ignore it and serve the
    /// full resource.
    None,
    /// A satisfiable range.
    Satisfiable(ByteRange),
    /// The range's start was at or past `length`; caller must reply 416.
    Unsatisfiable,
}

/// Parses a `Range: bytes=...` value (the `bytes=` prefix already
/// stripped) against a resource of `length` bytes, per RFC 2616 §14.35.1.
/// Accepts `-N` (suffix), `N-` (open), and `N-M` (explicit) specs,
/// comma-separated, and returns the envelope `[min-start, max-end]`
/// covering all of them (this engine does not serve multipart/byteranges).
pub fn parse_range(spec: &str, length: u64) -> RangeOutcome {
    if length == 0 {
        return RangeOutcome::None;
    }

    let mut min_start: Option<u64> = None;
    let mut max_end: Option<u64> = None;
    let mut any = false;

    for part in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some(("", suffix)) => {
                let n = match parse_ulong(suffix) {
                    Some(n) => n,
                    None => return RangeOutcome::None,
                };
                if n == 0 {
                    return RangeOutcome::None;
                }
                let start = length.saturating_sub(n);
                (start, length - 1)
            }
            Some((start_s, "")) => {
                let start = match parse_ulong(start_s) {
                    Some(n) => n,
                    None => return RangeOutcome::None,
                };
                (start, length - 1)
            }
            Some((start_s, end_s)) => {
                let start = match parse_ulong(start_s) {
                    Some(n) => n,
                    None => return RangeOutcome::None,
                };
                let end = match parse_ulong(end_s) {
                    Some(n) => n,
                    None => return RangeOutcome::None,
                };
                if end < start {
                    return RangeOutcome::None;
                }
                (start, end)
            }
            None => return RangeOutcome::None,
        };

        any = true;
        min_start = Some(min_start.map_or(start, |m| m.min(start)));
        max_end = Some(max_end.map_or(end, |m| m.max(end)));
    }

    if !any {
        return RangeOutcome::None;
    }

    let min = min_start.unwrap();
    let mut max = max_end.unwrap();

    if min >= length {
        return RangeOutcome::Unsatisfiable;
    }
    if max >= length {
        max = length - 1;
    }

    RangeOutcome::Satisfiable(ByteRange { start: min, end: max })
}

/// Strong equality per RFC 7232 §2.3.2: both tags must be "strong" (not
/// `W/`-prefixed) and byte-equal.
fn strong_match(a: &str, b: &str) -> bool {
    !a.starts_with("W/") && !b.starts_with("W/") && a == b
}

/// Weak equality per RFC 7232 §2.3.2: compares the opaque tag ignoring any
/// `W/` prefix.
fn weak_match(a: &str, b: &str) -> bool {
    a.trim_start_matches("W/") == b.trim_start_matches("W/")
}

fn etag_list_contains(list: &str, tag: &str, strong: bool) -> bool {
    if list.trim() == "*" {
        return true;
    }
    list.split(',').map(str::trim).any(|candidate| {
        if strong {
            strong_match(candidate, tag)
        } else {
            weak_match(candidate, tag)
        }
    })
}

/// Evaluates `If-Range` per RFC 7233 §3.2: a byte
/// range is only honored if the validator carried in `If-Range` still
/// matches the current representation. A missing header always permits the
/// range. The value may be either an HTTP-date (compared against
/// `last_modified` the same way `If-Modified-Since` is) or an entity-tag
/// (compared against `etag` with weak equality, since this engine's own
/// tags are always weak).
pub fn if_range_permits_range(headers: &Headers, last_modified: SystemTime, etag: &str) -> bool {
    let value = match headers.get("If-Range") {
        Some(v) => v.trim(),
        None => return true,
    };

    if let Some(date) = parse_http_date(value) {
        return last_modified <= date;
    }

    weak_match(value, etag)
}

/// Computes the conditional status, honoring RFC 7232 precedence:
/// If-Match > If-Unmodified-Since > If-None-Match > If-Modified-Since.
pub fn conditional_status(
    headers: &Headers,
    method: &str,
    last_modified: SystemTime,
    etag: &str,
) -> u16 {
    let mut force_200 = false;

    if let Some(if_match) = headers.get("If-Match") {
        if !etag_list_contains(if_match, etag, true) {
            return 412;
        }
    }

    if let Some(value) = headers.get("If-Unmodified-Since") {
        if let Some(time) = parse_http_date(value) {
            if last_modified > time {
                return 412;
            }
        }
    }

    let mut tentative_304 = false;
    if let Some(value) = headers.get("If-Modified-Since") {
        if let Some(time) = parse_http_date(value) {
            if time <= SystemTime::now() {
                if last_modified > time {
                    force_200 = true;
                } else {
                    tentative_304 = true;
                }
            }
        }
    }

    if let Some(if_none_match) = headers.get("If-None-Match") {
        if etag_list_contains(if_none_match, etag, false) {
            if method == "GET" || method == "HEAD" {
                return if force_200 { 200 } else { 304 };
            }
            return 412;
        } else {
            force_200 = true;
            tentative_304 = false;
        }
    }

    if force_200 {
        200
    } else if tentative_304 {
        304
    } else {
        200
    }
}
