//! Static file serving: the `Handler` embedders register to answer GET/HEAD
//! requests out of a directory tree. Ties together path resolution,
//! conditional/range evaluation, and directory listing.

use crate::conditional::{conditional_status, if_range_permits_range, parse_range, RangeOutcome};
use crate::index::DirectoryIndex;
use crate::mime::MimeRegistry;
use crate::request::Request;
use crate::response::Response;
use crate::server::Handler;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::File;

/// Serves files out of `root`, mounted at `prefix` in the context tree.
/// Construct one per directory tree and register it with
/// `Server::add_context` for `["GET"]` (HEAD is handled by the transaction
/// engine rewriting into GET with body discarded).
pub struct FileServingHandler {
    root: PathBuf,
    prefix: String,
    mime_registry: Arc<MimeRegistry>,
    directory_index: Arc<dyn DirectoryIndex>,
    allow_generated_index: bool,
}

/// Outcome of resolving a request path against `root`: a real path, a path
/// that simply isn't there (or is hidden), or one that exists but is
/// off-limits (traversal attempt, or unreadable).
enum Resolution {
    Found(PathBuf),
    NotFound,
    Forbidden,
}

impl FileServingHandler {
    pub fn new(
        root: impl Into<PathBuf>,
        prefix: impl Into<String>,
        mime_registry: Arc<MimeRegistry>,
        directory_index: Arc<dyn DirectoryIndex>,
        allow_generated_index: bool,
    ) -> Self {
        FileServingHandler {
            root: root.into(),
            prefix: prefix.into(),
            mime_registry,
            directory_index,
            allow_generated_index,
        }
    }

    /// Resolves a request path to a filesystem path under `root`, separating
    /// "doesn't exist" (a missing file, or a hidden/dot-prefixed segment)
    /// from "exists but is off-limits" (a `..` traversal attempt, or a
    /// canonical path that escapes `root`) so the caller can answer 404 vs.
    /// 403 accordingly.
    fn resolve(&self, request_path: &str) -> Resolution {
        let relative = request_path.strip_prefix(&self.prefix).unwrap_or(request_path);
        let decoded = percent_decode(relative);

        let mut candidate = self.root.clone();
        for segment in decoded.split('/') {
            if segment.is_empty() || segment == "." {
                continue;
            }
            if segment == ".." {
                return Resolution::Forbidden;
            }
            if segment.starts_with('.') {
                return Resolution::NotFound;
            }
            candidate.push(segment);
        }

        let root_canon = match self.root.canonicalize() {
            Ok(p) => p,
            Err(_) => return Resolution::NotFound,
        };
        if candidate == self.root {
            return Resolution::Found(candidate);
        }
        match candidate.canonicalize() {
            Ok(resolved) if resolved.starts_with(&root_canon) => Resolution::Found(resolved),
            Ok(_) => Resolution::Forbidden,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Resolution::Forbidden,
            Err(_) => Resolution::NotFound,
        }
    }

    async fn serve_directory(
        &self,
        dir: &Path,
        display_path: &str,
        resp: &mut Response<'_>,
    ) -> io::Result<u32> {
        if !self.allow_generated_index {
            return Ok(403);
        }
        let html = self.directory_index.render(dir, display_path)?;
        resp.send(200, &html).await?;
        Ok(0)
    }

    async fn serve_file(
        &self,
        path: &Path,
        req: &mut Request<'_>,
        resp: &mut Response<'_>,
    ) -> io::Result<u32> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(404),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => return Ok(403),
            Err(e) => return Err(e),
        };
        let length = metadata.len();
        let last_modified = metadata.modified().unwrap_or(UNIX_EPOCH);
        let etag = weak_etag(last_modified);

        let status = conditional_status(req.headers(), req.method(), last_modified, &etag);
        if status == 304 || status == 412 {
            resp.send_bare_status(status, Some(last_modified), Some(&etag)).await?;
            return Ok(0);
        }

        let content_type = self.mime_registry.lookup(path);
        let mut file = File::open(path).await?;

        // RFC 7233 §3.2: an `If-Range` validator that no longer matches the
        // current representation means the full resource goes out instead
        // of the requested range.
        let range = if if_range_permits_range(req.headers(), last_modified, &etag) {
            match req.range_spec() {
                Some(spec) => match parse_range(spec, length) {
                    RangeOutcome::Satisfiable(r) => Some(r),
                    RangeOutcome::Unsatisfiable => {
                        resp.send_range_not_satisfiable(length).await?;
                        return Ok(0);
                    }
                    RangeOutcome::None => None,
                },
                None => None,
            }
        } else {
            None
        };

        if let Some(r) = range {
            use tokio::io::AsyncSeekExt;
            file.seek(io::SeekFrom::Start(r.start)).await?;
        }

        resp.send_headers(200, Some(length), Some(last_modified), Some(&etag), Some(&content_type), range)
            .await?;
        resp.send_body(&mut file, length, range).await?;
        resp.close().await?;
        Ok(0)
    }
}

#[async_trait]
impl Handler for FileServingHandler {
    async fn handle(&self, req: &mut Request<'_>, resp: &mut Response<'_>) -> io::Result<u32> {
        let request_path = req.path().to_string();
        let resolved = match self.resolve(&request_path) {
            Resolution::Found(p) => p,
            Resolution::NotFound => return Ok(404),
            Resolution::Forbidden => return Ok(403),
        };

        let metadata = match tokio::fs::metadata(&resolved).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(404),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => return Ok(403),
            Err(e) => return Err(e),
        };

        if metadata.is_dir() {
            if !request_path.ends_with('/') {
                resp.redirect(&format!("{request_path}/"), true).await?;
                return Ok(0);
            }
            return self.serve_directory(&resolved, &request_path, resp).await;
        }

        // The request named a directory (trailing slash) but resolved to a
        // plain file: no such directory exists at that path.
        if request_path.ends_with('/') {
            return Ok(404);
        }

        self.serve_file(&resolved, req, resp).await
    }
}

/// A weak tag derived from modification time, matching the engine-wide
/// convention (`send`'s content-hash tag is also weak) without needing to
/// read the file twice.
fn weak_etag(last_modified: SystemTime) -> String {
    let secs = last_modified.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    format!("W/\"{secs}\"")
}

/// Minimal percent-decoder for request-target path segments. Invalid
/// escapes pass through literally rather than failing the request.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
