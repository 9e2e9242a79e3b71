//! Byte I/O primitives: bounded line/token readers, the Content-Length and
//! chunked body framings (decoder and encoder), and a bounded copy routine.

pub mod chunked;
pub mod limited;
pub mod line;
pub mod transfer;

use std::io;

/// Shared EOF-handling policy for stream wrappers that can be configured to
/// either treat premature underlying EOF as a clean end (bodies framed by
/// connection close) or as an error (bodies with a declared length).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrematureEof {
    TreatAsEof,
    Fail,
}

pub(crate) fn unexpected_eof(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, msg.to_string())
}
