// Copyright (c) 2026 the replisource developers. Licensed under the MIT license.
// See LICENSE file in the project root for full license text.

//! Engine for live sources: connect, run the replication handshake,
//! stream the bulk snapshot, then follow the command stream.
//!
//! The handshake is the replica side of PSYNC: optional `AUTH`, `PING`,
//! `REPLCONF listening-port`, `REPLCONF capa psync2`, then `PSYNC ? -1`.
//! Only full resynchronization is requested (we never hold a prior
//! replication id), so the master answers `+FULLRESYNC <replid> <offset>`
//! followed by the snapshot as one length-prefixed bulk payload. The
//! diskless EOF-delimited transfer is deliberately not negotiated; the
//! length prefix keeps the snapshot/stream boundary exact.
//!
//! After the snapshot the master streams commands indefinitely. The
//! engine answers `REPLCONF GETACK` probes with the replication offset
//! it has consumed; it does not send unsolicited periodic acks. A master
//! that closes the connection mid-stream is a protocol error so callers
//! can distinguish it from a finite file source draining.

use super::{ReplicatorCore, Replicator};
use crate::error::{ReplicationError, Result};
use crate::io::PeekableReader;
use crate::metrics;
use crate::resp::{encode_command, RespReader, RespValue};
use futures::future::BoxFuture;
use std::io;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace, warn};

/// Streams from a live master over TCP until closed or disconnected.
pub struct SocketReplicator {
    core: ReplicatorCore,
    host: String,
    port: u16,
}

impl SocketReplicator {
    pub(crate) fn new(host: String, port: u16, core: ReplicatorCore) -> Self {
        Self { core, host, port }
    }

    async fn connect(&self) -> Result<TcpStream> {
        let connect_timeout = self.core.config().connect_timeout_duration();
        let attempts = self.core.config().retries.max(1);
        let target = format!("{}:{}", self.host, self.port);
        let mut last_error: Option<io::Error> = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.core.config().backoff_for_attempt(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying connection");
                sleep(delay).await;
            }
            match timeout(connect_timeout, TcpStream::connect(&target)).await {
                Ok(Ok(stream)) => {
                    metrics::record_connect(&self.host, true);
                    info!(target = %target, attempt, "connected to master");
                    return Ok(stream);
                }
                Ok(Err(error)) => {
                    warn!(target = %target, attempt, %error, "connection attempt failed");
                    metrics::record_connect(&self.host, false);
                    last_error = Some(error);
                }
                Err(_) => {
                    warn!(target = %target, attempt, "connection attempt timed out");
                    metrics::record_connect(&self.host, false);
                    last_error = Some(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "connection attempt timed out",
                    ));
                }
            }
        }
        Err(ReplicationError::Unreachable {
            target,
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no attempts made")),
        })
    }

    async fn run(&mut self) -> Result<()> {
        if self.core.config().ssl {
            return Err(ReplicationError::Config(
                "TLS requested but not supported by this build".to_string(),
            ));
        }

        let stream = self.connect().await?;
        let local_port = stream.local_addr()?.port();
        let (read_half, mut write) = stream.into_split();
        let mut reader = self.core.wrap_reader(PeekableReader::new(read_half));
        let mut resp = RespReader::new(&mut reader);
        let read_timeout = self.core.config().read_timeout_duration();

        let handshake_started = Instant::now();
        let auth_user = self.core.config().auth_user.clone();
        if let Some(password) = self.core.config().auth_password.clone() {
            let reply = match &auth_user {
                Some(user) => {
                    exchange(
                        &mut write,
                        &mut resp,
                        read_timeout,
                        &[b"AUTH", user.as_bytes(), password.as_bytes()],
                    )
                    .await?
                }
                None => {
                    exchange(
                        &mut write,
                        &mut resp,
                        read_timeout,
                        &[b"AUTH", password.as_bytes()],
                    )
                    .await?
                }
            };
            expect_simple("AUTH", reply)?;
        }

        let reply = exchange(&mut write, &mut resp, read_timeout, &[b"PING"]).await?;
        expect_simple("PING", reply)?;

        // Masters may reject either REPLCONF option; neither is fatal.
        let port_arg = local_port.to_string();
        let reply = exchange(
            &mut write,
            &mut resp,
            read_timeout,
            &[b"REPLCONF", b"listening-port", port_arg.as_bytes()],
        )
        .await?;
        if let RespValue::Error(message) = reply {
            warn!(%message, "master rejected REPLCONF listening-port, continuing");
        }
        let reply = exchange(
            &mut write,
            &mut resp,
            read_timeout,
            &[b"REPLCONF", b"capa", b"psync2"],
        )
        .await?;
        if let RespValue::Error(message) = reply {
            warn!(%message, "master rejected REPLCONF capa, continuing");
        }

        let reply = exchange(&mut write, &mut resp, read_timeout, &[b"PSYNC", b"?", b"-1"]).await?;
        let (replid, fullresync_offset) = parse_fullresync(reply)?;
        metrics::record_handshake_latency(handshake_started.elapsed());
        info!(replid = %replid, offset = fullresync_offset, "full resynchronization granted");

        let snapshot_len = resp.read_bulk_header().await?;
        {
            let mut snapshot = (&mut *resp.get_mut()).take(snapshot_len);
            let events = super::drive_snapshot(&mut self.core, &mut snapshot).await?;
            // The transfer length is authoritative; drain whatever the
            // structural walk left behind so the command stream starts
            // at the right byte.
            tokio::io::copy(&mut snapshot, &mut tokio::io::sink()).await?;
            metrics::record_snapshot_loaded("socket");
            debug!(events, snapshot_len, "snapshot transfer complete");
        }

        let stream_base = resp.position();
        loop {
            let frame = timeout(read_timeout, resp.read_command())
                .await
                .map_err(|_| {
                    io::Error::new(io::ErrorKind::TimedOut, "replication stream read timed out")
                })??;
            let Some(raw) = frame else {
                return Err(ReplicationError::Protocol(
                    "master closed connection".to_string(),
                ));
            };
            if is_getack(&raw) {
                let ack = fullresync_offset + (resp.position() - stream_base);
                let ack_arg = ack.to_string();
                write
                    .write_all(&encode_command(&[b"REPLCONF", b"ACK", ack_arg.as_bytes()]))
                    .await?;
                trace!(ack, "acknowledged replication offset");
            }
            self.core.handle_command(raw)?;
        }
    }
}

impl Replicator for SocketReplicator {
    fn core(&self) -> &ReplicatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ReplicatorCore {
        &mut self.core
    }

    fn open(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.core.begin_streaming()?;
            let result = self.run().await;
            self.core.finish(result)
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.core.mark_closed();
            Ok(())
        })
    }
}

/// Send one command and wait for its (non-array) reply.
async fn exchange<R: AsyncRead + Unpin>(
    write: &mut OwnedWriteHalf,
    resp: &mut RespReader<R>,
    read_timeout: Duration,
    args: &[&[u8]],
) -> Result<RespValue> {
    write.write_all(&encode_command(args)).await?;
    let reply = timeout(read_timeout, resp.read_reply())
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "handshake reply timed out"))??;
    reply.ok_or_else(|| {
        ReplicationError::Protocol("master closed connection during handshake".to_string())
    })
}

fn expect_simple(stage: &str, reply: RespValue) -> Result<()> {
    match reply {
        RespValue::Simple(_) => Ok(()),
        RespValue::Error(message) => Err(ReplicationError::Protocol(format!(
            "{stage} rejected by master: {message}"
        ))),
        other => Err(ReplicationError::Protocol(format!(
            "unexpected {stage} reply: {other:?}"
        ))),
    }
}

fn parse_fullresync(reply: RespValue) -> Result<(String, u64)> {
    let RespValue::Simple(line) = reply else {
        return Err(ReplicationError::Protocol(format!(
            "expected +FULLRESYNC, got {reply:?}"
        )));
    };
    let mut parts = line.split_whitespace();
    if parts.next() != Some("FULLRESYNC") {
        return Err(ReplicationError::Protocol(format!(
            "expected +FULLRESYNC, got {line:?}"
        )));
    }
    let replid = parts
        .next()
        .map(str::to_string)
        .ok_or_else(|| ReplicationError::Protocol(format!("malformed FULLRESYNC reply {line:?}")))?;
    let offset = parts
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| ReplicationError::Protocol(format!("malformed FULLRESYNC reply {line:?}")))?;
    Ok((replid, offset))
}

fn is_getack(raw: &[Vec<u8>]) -> bool {
    raw.len() >= 2
        && raw[0].eq_ignore_ascii_case(b"REPLCONF")
        && raw[1].eq_ignore_ascii_case(b"GETACK")
}
