//! `multipart/form-data` body iterator. Layers over a `Request`'s body plus
//! its `boundary` parameter, yielding `(name, filename, headers, body)`
//! parts per RFC 2046 §5.1.1.

use crate::body::Body;
use crate::headers::Headers;
use std::io;

/// One part of a multipart body. `body` is fully read into memory bounded
/// by the distance to the next boundary — not the whole request body at
/// once, since parts are read and discarded one at a time by the caller.
pub struct Part {
    pub name: Option<String>,
    pub filename: Option<String>,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Iterates the parts of a `multipart/form-data` body. Construct from the
/// `boundary` parameter parsed out of the request's `Content-Type` header
/// via `Headers::parse_parameters`.
pub struct MultipartReader<'a, 'r> {
    body: &'a mut Body<'r>,
    boundary: Vec<u8>,
    buf: Vec<u8>,
    started: bool,
    finished: bool,
}

const READ_CHUNK: usize = 8192;
/// Hard cap on a single part's buffered body — prevents an unbounded
/// in-memory part from exhausting the process on a hostile upload.
const MAX_PART_SIZE: usize = 16 * 1024 * 1024;

impl<'a, 'r> MultipartReader<'a, 'r> {
    pub fn new(body: &'a mut Body<'r>, boundary: &str) -> Self {
        MultipartReader {
            body,
            boundary: format!("--{boundary}").into_bytes(),
            buf: Vec::new(),
            started: false,
            finished: false,
        }
    }

    async fn fill(&mut self) -> io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.body.read(&mut chunk).await?;
        if n == 0 {
            return Ok(false);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(true)
    }

    /// Locates the byte offset of the boundary marker in `self.buf`, if it's
    /// fully present, reading more of the body until it is (or EOF).
    async fn find_boundary(&mut self) -> io::Result<Option<usize>> {
        loop {
            if let Some(pos) = find_subslice(&self.buf, &self.boundary) {
                return Ok(Some(pos));
            }
            if self.buf.len() > MAX_PART_SIZE + self.boundary.len() {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "multipart part too large"));
            }
            if !self.fill().await? {
                return Ok(None);
            }
        }
    }

    /// Returns the next part, or `None` once the closing boundary has been
    /// consumed.
    pub async fn next_part(&mut self) -> io::Result<Option<Part>> {
        if self.finished {
            return Ok(None);
        }

        if !self.started {
            // Discard everything up to and including the first boundary line.
            let pos = self
                .find_boundary()
                .await?
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no multipart boundary found"))?;
            self.buf.drain(..pos + self.boundary.len());
            self.started = true;
        }

        // Either "--\r\n" (final boundary) or "\r\n" then headers follow.
        while self.buf.len() < 2 {
            if !self.fill().await? {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated multipart body"));
            }
        }
        if self.buf.starts_with(b"--") {
            self.finished = true;
            return Ok(None);
        }
        if self.buf.starts_with(b"\r\n") {
            self.buf.drain(..2);
        }

        let headers = self.read_part_headers().await?;
        let pos = self
            .find_boundary()
            .await?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated multipart part body"))?;

        // Strip the CRLF immediately preceding the boundary, which belongs
        // to the boundary line, not the part body.
        let body_end = pos.saturating_sub(2).min(pos);
        let body_end = if pos >= 2 && &self.buf[pos - 2..pos] == b"\r\n" { pos - 2 } else { body_end };
        let body: Vec<u8> = self.buf[..body_end].to_vec();
        self.buf.drain(..pos + self.boundary.len());

        let (name, filename) = parse_content_disposition(&headers);
        Ok(Some(Part { name, filename, headers, body }))
    }

    async fn read_part_headers(&mut self) -> io::Result<Headers> {
        loop {
            if let Some(pos) = find_subslice(&self.buf, b"\r\n\r\n") {
                let header_bytes = self.buf[..pos].to_vec();
                self.buf.drain(..pos + 4);
                let text = String::from_utf8_lossy(&header_bytes);
                let mut headers = Headers::new();
                for line in text.split("\r\n") {
                    if let Some((name, value)) = line.split_once(':') {
                        headers.add(name.trim(), value.trim());
                    }
                }
                return Ok(headers);
            }
            if self.buf.len() > MAX_PART_SIZE {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "multipart part headers too large"));
            }
            if !self.fill().await? {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated multipart part headers"));
            }
        }
    }
}

fn parse_content_disposition(headers: &Headers) -> (Option<String>, Option<String>) {
    let Some(value) = headers.get("Content-Disposition") else {
        return (None, None);
    };
    let (_, params) = Headers::parse_parameters(value);
    let name = params.iter().find(|(k, _)| k == "name").map(|(_, v)| v.clone());
    let filename = params.iter().find(|(k, _)| k == "filename").map(|(_, v)| v.clone());
    (name, filename)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::{self, BoxedConn};
    use tokio::io::AsyncWriteExt;

    async fn body_with(data: &[u8]) -> (crate::conn::ConnReader, u64) {
        let (mut client, server) = tokio::io::duplex(65536);
        client.write_all(data).await.unwrap();
        drop(client);
        let (reader, _writer) = conn::split(Box::new(server) as BoxedConn);
        (reader, data.len() as u64)
    }

    #[tokio::test]
    async fn parses_two_text_parts() {
        let raw = concat!(
            "--BOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"field1\"\r\n",
            "\r\n",
            "value1\r\n",
            "--BOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"file1\"; filename=\"a.txt\"\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "file contents\r\n",
            "--BOUNDARY--\r\n",
        );
        let (mut reader, len) = body_with(raw.as_bytes()).await;
        let mut body = Body::limited(&mut reader, len);
        let mut mp = MultipartReader::new(&mut body, "BOUNDARY");

        let p1 = mp.next_part().await.unwrap().unwrap();
        assert_eq!(p1.name.as_deref(), Some("field1"));
        assert_eq!(p1.body, b"value1");

        let p2 = mp.next_part().await.unwrap().unwrap();
        assert_eq!(p2.name.as_deref(), Some("file1"));
        assert_eq!(p2.filename.as_deref(), Some("a.txt"));
        assert_eq!(p2.headers.get("content-type"), Some("text/plain"));
        assert_eq!(p2.body, b"file contents");

        assert!(mp.next_part().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn single_part() {
        let raw = "--B\r\nContent-Disposition: form-data; name=\"x\"\r\n\r\nhi\r\n--B--\r\n";
        let (mut reader, len) = body_with(raw.as_bytes()).await;
        let mut body = Body::limited(&mut reader, len);
        let mut mp = MultipartReader::new(&mut body, "B");
        let p = mp.next_part().await.unwrap().unwrap();
        assert_eq!(p.body, b"hi");
        assert!(mp.next_part().await.unwrap().is_none());
    }
}
