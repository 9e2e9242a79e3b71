//! `LimitedStream`: exposes at most N further bytes of an underlying
//! reader, for framing a Content-Length-delimited body (RFC 7230 §3.3.3).

use super::PrematureEof;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

pub struct LimitedStream<R> {
    inner: R,
    remaining: u64,
    on_premature_eof: PrematureEof,
    exhausted: bool,
}

impl<R: AsyncRead + Unpin> LimitedStream<R> {
    pub fn new(inner: R, limit: u64, on_premature_eof: PrematureEof) -> Self {
        LimitedStream {
            inner,
            remaining: limit,
            on_premature_eof,
            exhausted: false,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Marks the stream exhausted without touching the underlying reader —
    /// "closing" a LimitedStream never closes what it wraps.
    pub fn close(&mut self) {
        self.exhausted = true;
        self.remaining = 0;
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for LimitedStream<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.exhausted || self.remaining == 0 {
            return Poll::Ready(Ok(()));
        }

        let remaining = self.remaining;
        let before = buf.filled().len();

        // Cap the caller's buffer to at most `remaining` bytes so a read
        // never crosses past the declared length into the next message.
        let max = remaining.min(buf.remaining() as u64) as usize;
        let mut limited = buf.take(max);

        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_read(cx, &mut limited) {
            Poll::Ready(Ok(())) => {
                let n = limited.filled().len();
                buf.advance(n);
                let read = buf.filled().len() - before;
                if read == 0 {
                    // Underlying EOF before we'd delivered `remaining` bytes.
                    if self.on_premature_eof == PrematureEof::Fail {
                        return Poll::Ready(Err(super::unexpected_eof(
                            "premature EOF in Content-Length body",
                        )));
                    }
                    self.exhausted = true;
                    self.remaining = 0;
                } else {
                    self.remaining -= read as u64;
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }
}
