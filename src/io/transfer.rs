//! Buffered transfer: copies bytes from a source to an optional sink using
//! a 4 KiB buffer.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const BUF_SIZE: usize = 4096;

/// Copies up to `limit` bytes (or until EOF if `limit` is `None`) from
/// `src` to `sink`. A `None` sink discards the bytes (used to drain an
/// unread request body between transactions). Reaching EOF before `limit`
/// bytes have been copied is an error when `limit` is `Some`; with `limit =
/// None` it is simply the end of the transfer.
pub async fn transfer<R, W>(src: &mut R, mut sink: Option<&mut W>, limit: Option<u64>) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = [0u8; BUF_SIZE];
    let mut total: u64 = 0;

    loop {
        if let Some(limit) = limit {
            if total >= limit {
                break;
            }
        }
        let want = match limit {
            Some(limit) => ((limit - total) as usize).min(BUF_SIZE),
            None => BUF_SIZE,
        };
        let n = src.read(&mut buf[..want]).await?;
        if n == 0 {
            if let Some(limit) = limit {
                if total < limit {
                    return Err(super::unexpected_eof("short read during buffered transfer"));
                }
            }
            break;
        }
        if let Some(sink) = sink.as_deref_mut() {
            sink.write_all(&buf[..n]).await?;
        }
        total += n as u64;
    }

    Ok(total)
}
