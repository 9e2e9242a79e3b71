//! MIME-type registry: a default table plus an optional `mime.types`-style
//! bootstrap file, so the engine has a working default out of the box
//! without depending on the host system's own `mime.types`.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::path::Path;

/// Default extension → MIME-type table, covering the common web types. Seeds
/// every new `MimeRegistry`.
const DEFAULT_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("mjs", "text/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("txt", "text/plain"),
    ("md", "text/plain"),
    ("csv", "text/csv"),
    ("ico", "image/x-icon"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("pdf", "application/pdf"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("eot", "application/vnd.ms-fontobject"),
    ("wasm", "application/wasm"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
];

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// String→string extension lookup, guarded by `parking_lot::RwLock` so it
/// can be updated after `Server::start` — the one registry in this engine
/// that's meant to keep growing while the server is serving traffic.
#[derive(Debug)]
pub struct MimeRegistry {
    table: RwLock<FxHashMap<String, String>>,
}

impl Default for MimeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MimeRegistry {
    pub fn new() -> Self {
        let mut table = FxHashMap::default();
        for (ext, mime) in DEFAULT_TYPES {
            table.insert((*ext).to_string(), (*mime).to_string());
        }
        MimeRegistry { table: RwLock::new(table) }
    }

    /// Looks up the MIME type for a file path by its extension
    /// (case-insensitive), falling back to `application/octet-stream`.
    pub fn lookup(&self, path: &Path) -> String {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.table.read().get(&ext.to_ascii_lowercase()).cloned())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
    }

    pub fn insert(&self, ext: impl Into<String>, mime_type: impl Into<String>) {
        self.table.write().insert(ext.into().to_ascii_lowercase(), mime_type.into());
    }

    /// Extends the registry from a `/etc/mime.types`-style file: lines of
    /// `type ext1 ext2 ...`, `#` comments, blank lines ignored.
    pub fn load_str(&self, contents: &str) {
        for line in contents.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let mime_type = match tokens.next() {
                Some(t) => t,
                None => continue,
            };
            for ext in tokens {
                self.insert(ext, mime_type);
            }
        }
    }

    pub fn load_file(&self, path: &Path) -> std::io::Result<()> {
        let contents = std::fs::read_to_string(path)?;
        self.load_str(&contents);
        Ok(())
    }
}
