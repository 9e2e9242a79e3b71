//! Ordered, case-insensitive header collection and the folded-line parser
//! that builds one from the wire.

use crate::error::{Error, Result};
use crate::io::line::read_line_latin1;
use std::fmt;
use tokio::io::AsyncBufRead;

const MAX_HEADER_LINES: usize = 100;

/// A single `name: value` pair. Immutable once built; `name` compares
/// case-insensitively everywhere it's looked up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Header {
            name: name.into(),
            value: crate::util::trim_ascii_ws(&value.into()).to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    fn name_matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Ordered multimap of headers backed by a flat `Vec`, linear-scanned the
/// way HTTP headers usually warrant (typically fewer than a dozen per
/// message, so a hash map buys nothing).
#[derive(Clone, Debug, Default)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Headers { entries: Vec::new() }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.name_matches(name))
            .map(|h| h.value())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|h| h.name_matches(name))
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(Header::new(name, value));
    }

    /// Replaces the first occurrence of `name` (returning the replaced
    /// header), or appends a new one if absent.
    pub fn replace(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<Header> {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|h| h.name_matches(&name)) {
            let old = slot.clone();
            *slot = Header::new(name, value);
            Some(old)
        } else {
            self.entries.push(Header::new(name, value));
            None
        }
    }

    /// Removes every header whose name matches, case-insensitively.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|h| !h.name_matches(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes `Name: Value\r\n` for each header followed by the terminating
    /// blank line.
    pub fn write_to(&self, out: &mut String) {
        for h in &self.entries {
            out.push_str(h.name());
            out.push_str(": ");
            out.push_str(h.value());
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
    }

    /// Parses a single header value into a first-key-is-bare-value plus
    /// `name=value` parameter pairs, stripping surrounding quotes from
    /// quoted values. E.g. `"multipart/form-data; boundary=abc"` yields
    /// `("multipart/form-data", {"boundary": "abc"})`.
    pub fn parse_parameters(value: &str) -> (String, Vec<(String, String)>) {
        let mut parts = value.split(';');
        let bare = parts.next().unwrap_or("").trim().to_string();
        let mut params = Vec::new();
        for part in parts {
            let part = part.trim();
            if let Some((k, v)) = part.split_once('=') {
                let k = k.trim().to_string();
                let mut v = v.trim();
                if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
                    v = &v[1..v.len() - 1];
                }
                params.push((k, v.to_string()));
            }
        }
        (bare, params)
    }

    /// Reads headers from `reader` per RFC 7230 §3.2: repeated lines, an
    /// empty line terminates, leading whitespace folds into the previous
    /// line with a single space, otherwise split at the first `:`.
    /// Non-folded lines sharing a name with a prior header are joined with
    /// `", "` (element-list concatenation), distinguishing repeats from
    /// folds.
    pub async fn read_from<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Headers> {
        let mut headers = Headers::new();
        let mut last_name: Option<String> = None;
        let mut lines_read = 0usize;

        loop {
            let line = read_line_latin1(reader).await?;
            if line.is_empty() {
                break;
            }
            lines_read += 1;
            if lines_read > MAX_HEADER_LINES {
                return Err(Error::Protocol("too many header lines".into()));
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                // Continuation: fold into the previous header's value.
                let name = last_name
                    .clone()
                    .ok_or_else(|| Error::Protocol("header continuation with no prior header".into()))?;
                let folded = crate::util::trim_ascii_ws(&line);
                if let Some(existing) = headers.entries.iter_mut().rev().find(|h| h.name_matches(&name)) {
                    existing.value.push(' ');
                    existing.value.push_str(folded);
                }
                continue;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::Protocol("header line missing ':'".into()))?;
            let name = name.trim().to_string();
            let value = crate::util::trim_ascii_ws(value).to_string();

            if let Some(existing) = headers.entries.iter_mut().rev().find(|h| h.name_matches(&name)) {
                // Repeated (non-folded) header with the same name, however
                // far back it was first seen: join as an element list, per
                // RFC 7230 §3.2.2.
                existing.value.push_str(", ");
                existing.value.push_str(&value);
            } else {
                headers.add(name.clone(), value);
            }
            last_name = Some(name);
        }

        Ok(headers)
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for h in &self.entries {
            writeln!(f, "{}: {}\r", h.name(), h.value())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    fn reader(s: &str) -> BufReader<Cursor<Vec<u8>>> {
        BufReader::new(Cursor::new(s.as_bytes().to_vec()))
    }

    #[tokio::test]
    async fn parses_simple_headers() {
        let mut r = reader("Host: example.com\r\nContent-Length: 5\r\n\r\n");
        let h = Headers::read_from(&mut r).await.unwrap();
        assert_eq!(h.get("host"), Some("example.com"));
        assert_eq!(h.get("Content-Length"), Some("5"));
    }

    #[tokio::test]
    async fn folds_continuation_lines() {
        let mut r = reader("X-Thing: first\r\n second\r\n\r\n");
        let h = Headers::read_from(&mut r).await.unwrap();
        assert_eq!(h.get("x-thing"), Some("first second"));
    }

    #[tokio::test]
    async fn joins_repeated_header_names() {
        let mut r = reader("Accept: text/html\r\nAccept: application/json\r\n\r\n");
        let h = Headers::read_from(&mut r).await.unwrap();
        assert_eq!(h.get("accept"), Some("text/html, application/json"));
    }

    #[tokio::test]
    async fn missing_colon_is_protocol_error() {
        let mut r = reader("garbage line\r\n\r\n");
        assert!(Headers::read_from(&mut r).await.is_err());
    }

    #[tokio::test]
    async fn too_many_lines_fails() {
        let mut s = String::new();
        for i in 0..101 {
            s.push_str(&format!("X-{i}: v\r\n"));
        }
        s.push_str("\r\n");
        let mut r = reader(&s);
        assert!(Headers::read_from(&mut r).await.is_err());
    }

    #[test]
    fn replace_returns_old_or_appends() {
        let mut h = Headers::new();
        assert!(h.replace("A", "1").is_none());
        let old = h.replace("A", "2").unwrap();
        assert_eq!(old.value(), "1");
        assert_eq!(h.get("a"), Some("2"));
    }

    #[test]
    fn remove_is_case_insensitive_and_compacts() {
        let mut h = Headers::new();
        h.add("A", "1");
        h.add("a", "2");
        h.add("B", "3");
        h.remove("a");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("b"), Some("3"));
    }

    #[test]
    fn parse_parameters_strips_quotes() {
        let (bare, params) = Headers::parse_parameters(r#"multipart/form-data; boundary="abc123""#);
        assert_eq!(bare, "multipart/form-data");
        assert_eq!(params, vec![("boundary".to_string(), "abc123".to_string())]);
    }
}
