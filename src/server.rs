//! The virtual-host/context registry and the listening-socket accept loop.

use crate::index::{DirectoryIndex, HtmlDirectoryIndex};
use crate::mime::MimeRegistry;
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use flate2::Compression;
use rustc_hash::FxHashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Built-in methods every context answers without a registered handler,
/// regardless of what the handler itself registers (RFC 7231 §4.3.7, the
/// `OPTIONS *` server-wide form).
const BUILTIN_METHODS: &[&str] = &["GET", "HEAD", "TRACE", "OPTIONS"];

/// A request handler. Implemented with `#[async_trait]` so embedders can
/// write ordinary `async fn` bodies; the dispatch tables below store it
/// behind `Arc<dyn Handler>` since the same handler may be invoked by many
/// concurrent connections.
///
/// Returns 0 if the handler fully produced a response itself; a nonzero
/// value asks the transaction engine to send a default error response with
/// that status.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, req: &mut Request<'_>, resp: &mut Response<'_>) -> io::Result<u32>;
}

pub type BoxedHandler = Arc<dyn Handler>;

/// An object that bulk-registers a set of (path, methods, handler) triples
/// under one host — an explicit list in place of annotation-based route
/// registration.
pub trait HandlerGroup {
    fn into_registrations(self) -> Vec<(String, Vec<String>, BoxedHandler)>;
}

/// A single registered (path prefix, method table) pair. Two special
/// contexts never live in a `VirtualHost`'s map directly: the empty
/// context (no match, triggers 404) and the per-host method aggregate used
/// for `OPTIONS *`.
#[derive(Default)]
pub struct ContextInfo {
    pub path: String,
    handlers: FxHashMap<String, BoxedHandler>,
}

impl ContextInfo {
    fn new(path: impl Into<String>) -> Self {
        ContextInfo { path: path.into(), handlers: FxHashMap::default() }
    }

    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.handlers.keys().cloned().collect();
        methods.sort();
        methods
    }

    pub fn handler_for(&self, method: &str) -> Option<&BoxedHandler> {
        self.handlers.get(method)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Built-ins unioned with this context's own registered methods, for the
    /// `Allow` header on `OPTIONS` and 405 responses (RFC 7231 §4.3.7,
    /// RFC 7231 §6.5.5).
    pub fn allowed_methods(&self) -> Vec<String> {
        let mut methods: std::collections::BTreeSet<String> = BUILTIN_METHODS.iter().map(|s| s.to_string()).collect();
        methods.extend(self.handlers.keys().cloned());
        methods.into_iter().collect()
    }
}

/// A named (plus aliased) partition of contexts, selected by the request's
/// effective host name. The default host (empty-string key in `Server`)
/// always exists and matches when no named host does.
pub struct VirtualHost {
    pub name: Option<String>,
    pub aliases: Vec<String>,
    pub directory_index: Option<String>,
    pub allow_generated_index: bool,
    contexts: FxHashMap<String, ContextInfo>,
}

impl VirtualHost {
    pub fn new(name: Option<String>) -> Self {
        VirtualHost {
            name,
            aliases: Vec::new(),
            directory_index: None,
            allow_generated_index: false,
            contexts: FxHashMap::default(),
        }
    }

    pub fn add_context(&mut self, path: &str, methods: &[&str], handler: BoxedHandler) {
        let ctx = self
            .contexts
            .entry(path.to_string())
            .or_insert_with(|| ContextInfo::new(path));
        for method in methods {
            ctx.handlers.insert(method.to_uppercase(), Arc::clone(&handler));
        }
    }

    /// Longest-prefix match: strip trailing `/`-segments from `path` until
    /// a registered context is found. Returns `None` (triggers 404) if
    /// even "/" has none.
    pub fn get_context(&self, path: &str) -> Option<&ContextInfo> {
        let mut candidate: &str = if path.is_empty() { "/" } else { path };
        loop {
            if let Some(ctx) = self.contexts.get(candidate) {
                return Some(ctx);
            }
            if candidate == "/" {
                return None;
            }
            let trimmed = candidate.trim_end_matches('/');
            candidate = match trimmed.rfind('/') {
                Some(idx) => &candidate[..=idx],
                None => "/",
            };
        }
    }

    /// Union of every method registered across all contexts on this host,
    /// used for `OPTIONS *`.
    pub fn all_methods(&self) -> Vec<String> {
        let mut methods: std::collections::BTreeSet<String> = BUILTIN_METHODS.iter().map(|s| s.to_string()).collect();
        for ctx in self.contexts.values() {
            for m in ctx.handlers.keys() {
                methods.insert(m.clone());
            }
        }
        methods.into_iter().collect()
    }
}

/// Pre-`start()` configuration. Populated via the builder methods, then
/// handed to `Server::new`; post-start mutation is undefined.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub socket_timeout: Duration,
    pub compressible_patterns: Vec<String>,
    pub compression_level: Compression,
    pub mime_bootstrap: Option<std::path::PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 8080,
            socket_timeout: Duration::from_secs(30),
            compressible_patterns: crate::encoding::DEFAULT_COMPRESSIBLE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            compression_level: Compression::default(),
            mime_bootstrap: None,
        }
    }
}

impl ServerConfig {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    pub fn compressible_patterns(mut self, patterns: Vec<String>) -> Self {
        self.compressible_patterns = patterns;
        self
    }

    pub fn compression_level(mut self, level: Compression) -> Self {
        self.compression_level = level;
        self
    }

    pub fn mime_bootstrap(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.mime_bootstrap = Some(path.into());
        self
    }
}

/// The server: a port, its virtual hosts (default host lives under the
/// empty-string key), and the ambient registries shared read-only across
/// connections after `start()`.
pub struct Server {
    pub config: ServerConfig,
    hosts: FxHashMap<String, VirtualHost>,
    pub mime_registry: Arc<MimeRegistry>,
    pub directory_index: Arc<dyn DirectoryIndex>,
}

impl Server {
    pub fn new(config: ServerConfig) -> io::Result<Self> {
        let mime_registry = MimeRegistry::new();
        if let Some(path) = &config.mime_bootstrap {
            mime_registry.load_file(path)?;
        }
        let mut hosts = FxHashMap::default();
        hosts.insert(String::new(), VirtualHost::new(None));
        Ok(Server {
            config,
            hosts,
            mime_registry: Arc::new(mime_registry),
            directory_index: Arc::new(HtmlDirectoryIndex),
        })
    }

    pub fn set_directory_index(&mut self, generator: Arc<dyn DirectoryIndex>) {
        self.directory_index = generator;
    }

    /// Looks up a virtual host by name, falling back to the default host
    /// (the empty-string key) when `name` is `None` or unregistered.
    pub fn get_virtual_host(&self, name: Option<&str>) -> &VirtualHost {
        name.and_then(|n| self.hosts.get(n))
            .unwrap_or_else(|| self.hosts.get("").expect("default host always present"))
    }

    pub fn host_mut(&mut self, host: &str) -> &mut VirtualHost {
        self.hosts.entry(host.to_string()).or_insert_with(|| VirtualHost::new(Some(host.to_string())))
    }

    pub fn add_context(&mut self, host: &str, path: &str, methods: &[&str], handler: BoxedHandler) {
        self.host_mut(host).add_context(path, methods, handler);
    }

    /// Registers every (path, methods, handler) triple a `HandlerGroup`
    /// produces under one host.
    pub fn register_handlers<T: HandlerGroup>(&mut self, host: &str, group: T) {
        for (path, methods, handler) in group.into_registrations() {
            let method_refs: Vec<&str> = methods.iter().map(String::as_str).collect();
            self.add_context(host, &path, &method_refs, handler);
        }
    }

    /// Records an alias name for `host`. Aliases are folded in at this
    /// pre-start step only; `resolve_alias` is what the transaction engine
    /// consults to map an alias back to its host key.
    pub fn add_alias(&mut self, host: &str, alias: &str) {
        self.host_mut(host).aliases.push(alias.to_string());
    }

    /// Binds the listening socket and runs the accept loop: one `tokio`
    /// task per accepted connection, each driving `transaction::serve` to
    /// completion. Returns only on a listener error; in-flight connections
    /// are not cancelled when this future is dropped — stopping the server
    /// closes the listening socket only.
    pub async fn start(self: Arc<Self>) -> io::Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.config.port).into();
        let listener = TcpListener::bind(addr).await?;
        log::info!("listening on {addr}");
        self.serve_on(listener).await
    }

    /// Like `start`, but against a caller-supplied listener. Lets a test (or
    /// an embedder with its own socket-activation setup) bind port 0, read
    /// back the ephemeral address, and only then hand the listener off.
    pub async fn serve_on(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    log::warn!("accept failed: {e}");
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                log::warn!("failed to set TCP_NODELAY for {peer}: {e}");
            }
            let local_host = stream
                .local_addr()
                .map(|a| a.ip().to_string())
                .unwrap_or_else(|_| "localhost".to_string());
            let port = self.config.port;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                let conn: crate::conn::BoxedConn = Box::new(stream);
                if let Err(e) = crate::transaction::serve(conn, server, false, local_host, port, peer).await {
                    log::debug!("connection from {peer} ended: {e}");
                }
            });
        }
    }

    /// Folds every registered host's contexts, used by the resolved
    /// effective-host lookup at dispatch time when the request names a
    /// host via an alias.
    pub fn resolve_alias(&self, name: &str) -> Option<&str> {
        for (key, host) in &self.hosts {
            if host.aliases.iter().any(|a| a.eq_ignore_ascii_case(name)) {
                return Some(key);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request as Req;
    use crate::response::Response as Resp;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn handle(&self, _req: &mut Req<'_>, resp: &mut Resp<'_>) -> io::Result<u32> {
            resp.send(200, "ok").await?;
            Ok(0)
        }
    }

    fn host_with_contexts() -> VirtualHost {
        let mut host = VirtualHost::new(None);
        host.add_context("/", &["GET"], Arc::new(Echo));
        host.add_context("/api/", &["GET", "POST"], Arc::new(Echo));
        host
    }

    #[test]
    fn longest_prefix_match_picks_deepest_context() {
        let host = host_with_contexts();
        assert_eq!(host.get_context("/api/widgets").unwrap().path, "/api/");
        assert_eq!(host.get_context("/elsewhere").unwrap().path, "/");
    }

    #[test]
    fn missing_root_context_yields_none() {
        let mut host = VirtualHost::new(None);
        host.add_context("/api/", &["GET"], Arc::new(Echo));
        assert!(host.get_context("/elsewhere").is_none());
    }

    #[test]
    fn context_reports_sorted_methods() {
        let host = host_with_contexts();
        let ctx = host.get_context("/api/x").unwrap();
        assert_eq!(ctx.methods(), vec!["GET".to_string(), "POST".to_string()]);
    }

    #[test]
    fn all_methods_includes_builtins_and_registered() {
        let host = host_with_contexts();
        let methods = host.all_methods();
        assert!(methods.contains(&"OPTIONS".to_string()));
        assert!(methods.contains(&"POST".to_string()));
    }

    #[test]
    fn default_host_lookup_falls_back_for_unknown_name() {
        let server = Server::new(ServerConfig::default()).unwrap();
        let host = server.get_virtual_host(Some("unknown.example"));
        assert!(host.name.is_none());
    }
}
