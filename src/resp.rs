// Copyright (c) 2026 the replisource developers. Licensed under the MIT license.
// See LICENSE file in the project root for full license text.

//! RESP (REdis Serialization Protocol) reader and the few writes the
//! replication handshake needs.
//!
//! Command logs and the post-handshake replication stream are sequences of
//! RESP arrays of bulk strings, one array per command. Masters interleave
//! bare `\n` keepalives between frames while busy; the command reader
//! skips those. Inline commands are not valid in either stream shape and
//! are rejected as decode errors.
//!
//! The reader counts every byte it consumes ([`RespReader::position`]);
//! the live-socket engine uses position deltas to maintain the
//! replication offset it acknowledges.

use crate::error::{ReplicationError, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

const CONTEXT: &str = "resp";

/// A single non-array RESP reply, as seen during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    NullBulk,
}

/// Incremental RESP reader over any byte stream.
pub struct RespReader<R> {
    inner: R,
    pos: u64,
}

impl<R: AsyncRead + Unpin> RespReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }

    /// Total bytes consumed through this reader.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Access the underlying stream (used to splice in the RDB bulk
    /// payload during PSYNC, which is not RESP-framed).
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Read one byte; `None` on clean end of stream.
    async fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        if self.inner.read(&mut buf).await? == 0 {
            return Ok(None);
        }
        self.pos += 1;
        Ok(Some(buf[0]))
    }

    async fn require_byte(&mut self) -> Result<u8> {
        self.read_byte().await?.ok_or_else(|| {
            ReplicationError::decode_at(CONTEXT, self.pos, "unexpected end of stream")
        })
    }

    /// Read the first byte of a frame, skipping `\n` keepalives.
    /// `None` means the stream ended cleanly at a frame boundary.
    async fn frame_byte(&mut self) -> Result<Option<u8>> {
        loop {
            match self.read_byte().await? {
                None => return Ok(None),
                Some(b'\n') => continue,
                Some(b) => return Ok(Some(b)),
            }
        }
    }

    /// Read bytes up to (not including) the CRLF terminator.
    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        loop {
            match self.require_byte().await? {
                b'\r' => {
                    let b = self.require_byte().await?;
                    if b != b'\n' {
                        return Err(ReplicationError::decode_at(
                            CONTEXT,
                            self.pos,
                            "CR not followed by LF",
                        ));
                    }
                    return Ok(line);
                }
                b'\n' => {
                    return Err(ReplicationError::decode_at(
                        CONTEXT,
                        self.pos,
                        "bare LF inside line",
                    ))
                }
                b => line.push(b),
            }
        }
    }

    async fn read_int_line(&mut self) -> Result<i64> {
        let line = self.read_line().await?;
        std::str::from_utf8(&line)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| {
                ReplicationError::decode_at(
                    CONTEXT,
                    self.pos,
                    format!("invalid integer {:?}", String::from_utf8_lossy(&line)),
                )
            })
    }

    async fn read_bulk_body(&mut self, len: u64) -> Result<Vec<u8>> {
        let mut body = vec![0u8; len as usize];
        self.inner.read_exact(&mut body).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ReplicationError::decode_at(CONTEXT, self.pos, "truncated bulk string")
            } else {
                ReplicationError::Io(e)
            }
        })?;
        self.pos += len;
        let line = self.read_line().await?;
        if !line.is_empty() {
            return Err(ReplicationError::decode_at(
                CONTEXT,
                self.pos,
                "bulk string not terminated by CRLF",
            ));
        }
        Ok(body)
    }

    /// Read one non-array reply, skipping keepalive newlines first.
    ///
    /// `None` on clean end of stream. Used for handshake replies; the
    /// command stream goes through [`read_command`](Self::read_command).
    pub async fn read_reply(&mut self) -> Result<Option<RespValue>> {
        let Some(marker) = self.frame_byte().await? else {
            return Ok(None);
        };
        let value = match marker {
            b'+' => RespValue::Simple(String::from_utf8_lossy(&self.read_line().await?).into_owned()),
            b'-' => RespValue::Error(String::from_utf8_lossy(&self.read_line().await?).into_owned()),
            b':' => RespValue::Integer(self.read_int_line().await?),
            b'$' => {
                let len = self.read_int_line().await?;
                if len < 0 {
                    RespValue::NullBulk
                } else {
                    RespValue::Bulk(self.read_bulk_body(len as u64).await?)
                }
            }
            other => {
                return Err(ReplicationError::decode_at(
                    CONTEXT,
                    self.pos,
                    format!("unexpected reply marker 0x{other:02x}"),
                ))
            }
        };
        Ok(Some(value))
    }

    /// Read a bulk-payload header (`$<len>\r\n`), skipping keepalive
    /// newlines. The payload itself is left in the stream for the caller
    /// to consume, and is not counted into [`position`](Self::position).
    pub async fn read_bulk_header(&mut self) -> Result<u64> {
        let Some(marker) = self.frame_byte().await? else {
            return Err(ReplicationError::decode_at(
                CONTEXT,
                self.pos,
                "unexpected end of stream before bulk payload",
            ));
        };
        if marker != b'$' {
            return Err(ReplicationError::decode_at(
                CONTEXT,
                self.pos,
                format!("expected bulk payload marker '$', got 0x{marker:02x}"),
            ));
        }
        let len = self.read_int_line().await?;
        u64::try_from(len).map_err(|_| {
            ReplicationError::decode_at(CONTEXT, self.pos, "negative bulk payload length")
        })
    }

    /// Read one command frame (a RESP array of bulk strings).
    ///
    /// `None` on clean end of stream at a frame boundary; a stream that
    /// ends mid-frame is a decode error.
    pub async fn read_command(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        let Some(marker) = self.frame_byte().await? else {
            return Ok(None);
        };
        if marker != b'*' {
            return Err(ReplicationError::decode_at(
                CONTEXT,
                self.pos,
                format!("expected array marker '*', got 0x{marker:02x} (inline commands are not supported)"),
            ));
        }
        let count = self.read_int_line().await?;
        if count < 0 {
            return Err(ReplicationError::decode_at(
                CONTEXT,
                self.pos,
                "null array in command stream",
            ));
        }
        let mut args = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let marker = self.require_byte().await?;
            if marker != b'$' {
                return Err(ReplicationError::decode_at(
                    CONTEXT,
                    self.pos,
                    format!("expected bulk string marker '$', got 0x{marker:02x}"),
                ));
            }
            let len = self.read_int_line().await?;
            if len < 0 {
                return Err(ReplicationError::decode_at(
                    CONTEXT,
                    self.pos,
                    "null bulk string inside command",
                ));
            }
            args.push(self.read_bulk_body(len as u64).await?);
        }
        Ok(Some(args))
    }
}

/// Encode one command as a RESP array of bulk strings.
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}
