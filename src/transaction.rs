//! The per-connection transaction loop.

use crate::conn::{self, BoxedConn, ConnReader, ConnWriter};
use crate::error::{Error, Result};
use crate::request::{HttpVersion, Request};
use crate::response::{Response, ResponseState};
use crate::server::{BoxedHandler, Handler, Server, VirtualHost};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Drives one connection to completion: repeatedly reads a request, runs
/// preprocess + dispatch, and closes the response, continuing only while
/// both sides keep the connection alive. Performs the teardown half-close
/// and drain once the loop ends.
pub async fn serve(
    conn: BoxedConn,
    server: Arc<Server>,
    secure: bool,
    local_host: String,
    port: u16,
    peer: SocketAddr,
) -> Result<()> {
    let (mut reader, mut writer) = conn::split(conn);
    let timeout = server.config.socket_timeout;

    loop {
        match one_transaction(&mut reader, &mut writer, &server, secure, &local_host, port, timeout).await {
            Ok(true) => continue,
            Ok(false) => break,
            Err(e) => {
                log::debug!("connection from {peer} aborted: {e}");
                break;
            }
        }
    }

    teardown(&mut reader, &mut writer, secure).await;
    Ok(())
}

/// Half-closes the write side and drains remaining input so the client can
/// finish its own close, then lets both halves drop. Skipped for TLS
/// sockets, which close directly.
async fn teardown(reader: &mut ConnReader, writer: &mut ConnWriter, secure: bool) {
    if secure {
        return;
    }
    if let Err(e) = writer.shutdown().await {
        log::debug!("half-close failed: {e}");
        return;
    }
    let mut sink = [0u8; 1024];
    let drain = async {
        loop {
            match reader.read(&mut sink).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    };
    let _ = tokio::time::timeout(Duration::from_secs(5), drain).await;
}

/// Runs one request/response transaction. Returns whether the connection
/// should stay open for another.
async fn one_transaction(
    reader: &mut ConnReader,
    writer: &mut ConnWriter,
    server: &Server,
    secure: bool,
    local_host: &str,
    port: u16,
    timeout: Duration,
) -> Result<bool> {
    let parsed = tokio::time::timeout(timeout, Request::parse(reader, secure, local_host, port)).await;

    let mut request = match parsed {
        Err(_elapsed) => {
            let mut resp = Response::new(writer, HttpVersion::Http11, true, None);
            let _ = resp.send_error(408, "request timeout").await;
            return Ok(false);
        }
        // A clean close before any request-line bytes arrived: an idle
        // keep-alive connection the client simply hung up on.
        Ok(Err(Error::MissingRequestLine)) => return Ok(false),
        Ok(Err(Error::Timeout)) => {
            let mut resp = Response::new(writer, HttpVersion::Http11, true, None);
            let _ = resp.send_error(408, "request timeout").await;
            return Ok(false);
        }
        Ok(Err(e)) => {
            let status = e.status_code();
            let mut resp = Response::new(writer, HttpVersion::Http11, true, None);
            let _ = resp.send_error(status, &e.message()).await;
            return Ok(false);
        }
        Ok(Ok(req)) => req,
    };

    let version = match request.version() {
        Some(v) => v,
        None => {
            let mut resp = Response::new(writer, HttpVersion::Http11, true, None);
            let _ = resp.send_error(400, "unsupported HTTP version").await;
            let _ = request.body_mut().drain().await;
            return Ok(false);
        }
    };

    let accept_encoding = request.headers().get("Accept-Encoding").map(str::to_string);
    let client_wants_close = request.wants_close();
    let mut response = Response::new(writer, version, client_wants_close, accept_encoding);
    response.set_compressible_patterns(server.config.compressible_patterns.clone());
    response.set_compression_level(server.config.compression_level);

    if version.is_1_1() {
        if !request.headers().contains("Host") {
            let _ = response.send_error(400, "Host header required").await;
            let _ = request.body_mut().drain().await;
            return Ok(keep_alive(version, &response));
        }
    } else {
        request.strip_hop_by_hop();
    }

    match request.expect_header() {
        Some(true) => {
            if let Err(e) = response.send_continue().await {
                log::debug!("failed to write 100-continue: {e}");
            }
        }
        Some(false) => {
            let _ = response.send_error(417, "unsupported expectation").await;
            let _ = request.body_mut().drain().await;
            return Ok(keep_alive(version, &response));
        }
        None => {}
    }

    if let Err(e) = dispatch(&mut request, &mut response, server).await {
        if response.state() == ResponseState::NothingSent {
            let _ = response.send_error(500, &e.to_string()).await;
        } else {
            // Headers already went out; there is no well-formed response
            // left to send, so the connection is aborted.
            let _ = request.body_mut().drain().await;
            return Err(e);
        }
    }

    let _ = response.close().await;
    let _ = request.body_mut().drain().await;
    Ok(keep_alive(version, &response))
}

fn keep_alive(version: HttpVersion, response: &Response<'_>) -> bool {
    version.is_1_1() && !response.connection_will_close()
}

fn host_name_from_request(request: &Request<'_>) -> Option<String> {
    request.headers().get("Host").map(|h| {
        h.rsplit_once(':').map(|(name, _)| name).unwrap_or(h).trim().to_string()
    })
}

/// Method dispatch: `TRACE`/`OPTIONS` are built in, `HEAD` is rewritten
/// into a discard-body `GET`, and everything else goes through the matched
/// context's method table.
async fn dispatch(request: &mut Request<'_>, response: &mut Response<'_>, server: &Server) -> Result<()> {
    let host_name = host_name_from_request(request);
    let host = match host_name.as_deref() {
        Some(name) => {
            let canonical = server.resolve_alias(name).unwrap_or(name);
            server.get_virtual_host(Some(canonical))
        }
        None => server.get_virtual_host(None),
    };

    if request.raw_target() == "*" {
        return if request.method() == "OPTIONS" {
            send_options(response, &host.all_methods()).await
        } else {
            response.send_error(501, "method not implemented for *").await.map_err(Error::Io)
        };
    }

    let method = request.method().to_string();
    match method.as_str() {
        "TRACE" => handle_trace(request, response).await,
        "OPTIONS" => match host.get_context(request.path()) {
            Some(ctx) => send_options(response, &ctx.allowed_methods()).await,
            None => response.send_error(404, "no such context").await.map_err(Error::Io),
        },
        "HEAD" => {
            request.set_method("GET");
            response.set_discard_body(true);
            dispatch_method(request, response, host, "GET").await
        }
        other => dispatch_method(request, response, host, other).await,
    }
}

async fn dispatch_method(
    request: &mut Request<'_>,
    response: &mut Response<'_>,
    host: &VirtualHost,
    method: &str,
) -> Result<()> {
    let ctx = match host.get_context(request.path()) {
        Some(ctx) => ctx,
        None => return response.send_error(404, "no such context").await.map_err(Error::Io),
    };

    // Supported by the host but not this context -> 405; not supported
    // anywhere on the host -> 501.
    let handler = match ctx.handler_for(method) {
        Some(handler) => handler.clone(),
        None if host.all_methods().iter().any(|m| m == method) => {
            response.headers_mut().replace("Allow", ctx.allowed_methods().join(", "));
            return response.send_error(405, "method not allowed").await.map_err(Error::Io);
        }
        None => return response.send_error(501, "method not implemented").await.map_err(Error::Io),
    };

    if method == "GET" {
        invoke_get(&handler, request, response, host).await
    } else {
        run_handler(&handler, request, response).await
    }
}

/// The directory-welcome convention: if the path ends with `/` and the host
/// has a directory-index filename, invoke the handler against the path with
/// that filename appended first. If that welcomed lookup comes back 404
/// without sending anything — no such index file — the original directory
/// path is tried instead (letting a file-serving handler fall back to a
/// generated listing); only if that also produces nothing is the 404 final.
async fn invoke_get(
    handler: &BoxedHandler,
    request: &mut Request<'_>,
    response: &mut Response<'_>,
    host: &VirtualHost,
) -> Result<()> {
    if request.path().ends_with('/') {
        if let Some(index_name) = host.directory_index.clone() {
            let original_path = request.path().to_string();
            request.set_path(&format!("{original_path}{index_name}"));
            match handler.handle(request, response).await {
                Ok(404) if response.state() == ResponseState::NothingSent => {
                    request.set_path(&original_path);
                }
                other => return interpret_outcome(other, response).await,
            }
        }
    }
    run_handler(handler, request, response).await
}

async fn interpret_outcome(outcome: io::Result<u32>, response: &mut Response<'_>) -> Result<()> {
    match outcome {
        Ok(0) => Ok(()),
        Ok(status) if response.state() == ResponseState::NothingSent => response
            .send_error(status as u16, crate::util::reason_phrase(status as u16))
            .await
            .map_err(Error::Io),
        Ok(_) => Ok(()),
        Err(e) if response.state() == ResponseState::NothingSent => {
            response.send_error(500, &e.to_string()).await.map_err(Error::Io)
        }
        Err(e) => Err(Error::Io(e)),
    }
}

/// Interprets a handler's returned status: 0 means fully handled, nonzero
/// asks for a default error response of that status (unless the handler
/// already sent headers, which is a programming error the engine
/// tolerates), and an `Err` aborts the connection once headers have gone
/// out.
async fn run_handler(handler: &BoxedHandler, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<()> {
    let outcome = handler.handle(request, response).await;
    interpret_outcome(outcome, response).await
}

async fn send_options(response: &mut Response<'_>, methods: &[String]) -> Result<()> {
    response.headers_mut().replace("Allow", methods.join(", "));
    response.send_headers(200, Some(0), None, None, None, None).await.map_err(Error::Io)?;
    response.close().await.map_err(Error::Io)
}

async fn handle_trace(request: &mut Request<'_>, response: &mut Response<'_>) -> Result<()> {
    let mut payload = format!("{} {} {}\r\n", request.method(), request.raw_target(), request.version_raw());
    for h in request.headers().iter() {
        payload.push_str(h.name());
        payload.push_str(": ");
        payload.push_str(h.value());
        payload.push_str("\r\n");
    }
    payload.push_str("\r\n");
    let mut bytes = payload.into_bytes();
    request.body_mut().read_to_end(&mut bytes).await.map_err(Error::Io)?;

    response
        .send_headers(200, Some(bytes.len() as u64), None, None, Some("message/http"), None)
        .await
        .map_err(Error::Io)?;
    if let Some(body) = response.body() {
        body.write(&bytes).await.map_err(Error::Io)?;
    }
    response.close().await.map_err(Error::Io)
}
