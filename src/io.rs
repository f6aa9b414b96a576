// Copyright (c) 2026 the replisource developers. Licensed under the MIT license.
// See LICENSE file in the project root for full license text.

//! Stream adapters: single-byte lookahead and raw-byte fan-out.
//!
//! [`PeekableReader`] is the format prober's pushback buffer: it reads one
//! byte ahead without discarding it from the logical stream, so an
//! AOF-declared file can be sniffed for an embedded snapshot header before
//! an engine is chosen. The peeked byte is replayed on the first real read;
//! no byte is dropped or duplicated.
//!
//! [`TeeReader`] forwards every chunk it reads to the facade's shared
//! raw-byte listener set before the decoders see it. The set is shared via
//! `Arc<Mutex<..>>` so listeners registered after engine construction (or
//! while streaming) take effect for chunks read after the mutation.

use crate::listener::{ListenerSet, RawByteListener};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// Raw-byte listener set shared between a facade core and its tee.
pub type SharedRawListeners = Arc<Mutex<ListenerSet<dyn RawByteListener>>>;

/// A reader with non-destructive single-byte lookahead.
///
/// Lookahead never grows beyond one byte; that is all the format prober
/// needs to disambiguate a command log from a mixed file.
pub struct PeekableReader<R> {
    inner: R,
    peeked: Option<u8>,
}

impl<R: AsyncRead + Unpin> PeekableReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            peeked: None,
        }
    }

    /// Look at the next byte without consuming it.
    ///
    /// Returns `None` when the stream is already exhausted. Repeated peeks
    /// return the same byte; the next read through this reader yields it
    /// first.
    pub async fn peek(&mut self) -> io::Result<Option<u8>> {
        if let Some(b) = self.peeked {
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        loop {
            match self.inner.read(&mut buf).await? {
                0 => return Ok(None),
                _ => {
                    self.peeked = Some(buf[0]);
                    return Ok(Some(buf[0]));
                }
            }
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for PeekableReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(b) = this.peeked.take() {
            if buf.remaining() == 0 {
                this.peeked = Some(b);
                return Poll::Ready(Ok(()));
            }
            buf.put_slice(&[b]);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

/// A reader that fans every chunk out to the raw-byte listener set.
pub struct TeeReader<R> {
    inner: R,
    listeners: SharedRawListeners,
}

impl<R: AsyncRead + Unpin> TeeReader<R> {
    pub fn new(inner: R, listeners: SharedRawListeners) -> Self {
        Self { inner, listeners }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TeeReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let chunk = &buf.filled()[before..];
                if !chunk.is_empty() {
                    let listeners = this
                        .listeners
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    for listener in listeners.iter() {
                        listener.handle(chunk);
                    }
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
