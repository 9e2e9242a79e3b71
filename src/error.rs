use std::fmt;
use std::io;

/// Errors that can surface while parsing a request or driving a response.
///
/// Kept dependency-free (no `thiserror`/`anyhow`) the same way the engine
/// this crate grew out of stuck to `std::error::Error` by hand.
#[derive(Debug)]
pub enum Error {
    /// The connection closed (or timed out) before a request line arrived.
    /// The transaction loop treats this as a quiet, expected close.
    MissingRequestLine,
    /// A read timed out while a request was in flight; maps to 408.
    Timeout,
    /// A malformed request line, header block, or framing header; maps to 400.
    Protocol(String),
    /// The client asked for something the engine refuses to do; carries the
    /// status code that should be sent (e.g. 417 for an unsupported Expect).
    Status(u16, String),
    /// Propagated I/O failure (socket reset, disk error, etc).
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingRequestLine => write!(f, "connection closed before a request line"),
            Error::Timeout => write!(f, "timed out waiting for data"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Status(code, msg) => write!(f, "{code}: {msg}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock {
            Error::Timeout
        } else {
            Error::Io(e)
        }
    }
}

impl Error {
    /// The status code the transaction engine should reply with for this
    /// error, if the error occurred before headers were sent.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MissingRequestLine => 0, // handled specially: silent close
            Error::Timeout => 408,
            Error::Protocol(_) => 400,
            Error::Status(code, _) => *code,
            Error::Io(_) => 500,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Error::MissingRequestLine => String::new(),
            Error::Timeout => "request timeout".to_string(),
            Error::Protocol(msg) => msg.clone(),
            Error::Status(_, msg) => msg.clone(),
            Error::Io(e) => e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
