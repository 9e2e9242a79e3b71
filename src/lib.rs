//! An embeddable HTTP/1.1 server core: connection lifecycle, message
//! parsing, streaming response encoding, virtual-host/context dispatch, and
//! conditional/range file serving, built directly on `tokio`.

pub mod body;
pub mod conditional;
pub mod conn;
pub mod encoding;
pub mod error;
pub mod fileserving;
pub mod headers;
pub mod index;
pub mod io;
pub mod mime;
pub mod multipart;
pub mod request;
pub mod response;
pub mod server;
mod transaction;

#[cfg(feature = "tls")]
pub mod tls;

pub mod util;

pub use error::{Error, Result};
pub use request::{HttpVersion, Request};
pub use response::Response;
pub use server::{BoxedHandler, ContextInfo, Handler, HandlerGroup, Server, ServerConfig, VirtualHost};
pub use transaction::serve;
