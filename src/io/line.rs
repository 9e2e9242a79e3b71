//! Bounded line and token readers. The request line, header lines, and
//! chunk-size lines are all ISO-8859-1 (Latin-1) on the wire: every byte
//! value maps 1:1 to the Unicode scalar of the same value, so decoding is a
//! straight `as char` cast, never a UTF-8 validation step.

use crate::error::{Error, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Maximum size of a single line (request line or header line). A hostile
/// or broken client sending an unterminated line must not be allowed to
/// grow this buffer without bound.
pub const MAX_LINE_LEN: usize = 8192;

/// Reads bytes until LF (inclusive), decodes as ISO-8859-1, and strips a
/// single trailing CR. Fails on overflow past `MAX_LINE_LEN` or on EOF
/// before any LF is seen.
pub async fn read_line_latin1<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String> {
    read_token_latin1(reader, b'\n', MAX_LINE_LEN).await
}

/// Generalized bounded token reader: reads until `delim` (inclusive) or EOF
/// if `delim` is absent conceptually (callers needing read-to-EOF should
/// use a dedicated loop instead — every caller in this engine has a finite
/// delimiter). The internal buffer starts at 256 bytes and doubles up to
/// `max_len`. If `delim` is LF, a preceding CR is stripped.
pub async fn read_token_latin1<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    delim: u8,
    max_len: usize,
) -> Result<String> {
    let mut buf: Vec<u8> = Vec::with_capacity(256.min(max_len.max(1)));
    let mut found = false;

    loop {
        let available = match reader.fill_buf().await {
            Ok(buf) => buf,
            Err(e) => return Err(Error::from(e)),
        };
        if available.is_empty() {
            break; // EOF
        }
        if let Some(pos) = available.iter().position(|&b| b == delim) {
            if buf.len() + pos + 1 > max_len {
                return Err(Error::Protocol("line too long".into()));
            }
            buf.extend_from_slice(&available[..=pos]);
            reader.consume(pos + 1);
            found = true;
            break;
        } else {
            if buf.len() + available.len() > max_len {
                return Err(Error::Protocol("line too long".into()));
            }
            let n = available.len();
            buf.extend_from_slice(available);
            reader.consume(n);
        }
    }

    if !found {
        if buf.is_empty() {
            // Clean EOF before any bytes: the caller (request parser)
            // distinguishes this as "missing request line" when reading
            // the very first line of a transaction.
            return Err(Error::MissingRequestLine);
        }
        return Err(Error::Protocol("unexpected EOF before delimiter".into()));
    }

    // Strip the delimiter itself, and a preceding CR when delim is LF.
    buf.pop();
    if delim == b'\n' && buf.last() == Some(&b'\r') {
        buf.pop();
    }

    Ok(buf.into_iter().map(|b| b as char).collect())
}
