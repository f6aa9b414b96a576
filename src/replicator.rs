// Copyright (c) 2026 the replisource developers. Licensed under the MIT license.
// See LICENSE file in the project root for full license text.

//! The entry-point facade: resolve an identifier, select an engine,
//! present the uniform [`Replicator`] surface.
//!
//! Selection rules:
//!
//! - Live identifiers get the socket engine.
//! - Static identifiers declaring an unsupported kind fail with
//!   [`ReplicationError::UnsupportedFormat`] before the file is opened.
//! - Static identifiers declaring `rdb` or `mixed` get that engine
//!   directly, with no content probe.
//! - Static identifiers declaring `aof` are probed: a file whose first
//!   byte is the snapshot magic is actually a mixed file (a snapshot
//!   with a command-log tail) and gets the mixed engine. The probed
//!   byte is replayed, so decoding and raw-byte forwarding both see
//!   the complete stream.
//!
//! The facade registers the built-in command parsers at construction;
//! callers can add, replace or remove parsers before `open()`.

use crate::config::{ConfigOverlay, Configuration};
use crate::engine::{
    AofReplicator, MixReplicator, RdbReplicator, Replicator, ReplicatorCore, SocketReplicator,
};
use crate::error::{ReplicationError, Result};
use crate::io::PeekableReader;
use crate::rdb::RDB_MAGIC;
use crate::uri::{FileType, RedisUri, SourceTarget};
use futures::future::BoxFuture;
use tokio::fs::File;
use tracing::{debug, info};

/// A replication source behind the engine selected for its identifier.
pub struct RedisReplicator {
    uri: RedisUri,
    inner: Box<dyn Replicator>,
}

impl std::fmt::Debug for RedisReplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisReplicator")
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

impl RedisReplicator {
    /// Resolve `uri`, merge `overlay` over the identifier-derived
    /// configuration, and construct the matching engine.
    ///
    /// Static files are opened (and, for declared command logs, probed)
    /// here; streaming starts at [`open`](Replicator::open).
    pub async fn new(uri: &str, overlay: ConfigOverlay) -> Result<Self> {
        let uri = RedisUri::parse(uri)?;
        let config = overlay.merge(Configuration::from_uri(&uri)?);
        let inner = select_engine(&uri, config).await?;
        let mut replicator = Self { uri, inner };
        replicator.builtin_command_parser_register();
        Ok(replicator)
    }

    /// The resolved source identifier.
    pub fn uri(&self) -> &RedisUri {
        &self.uri
    }
}

impl Replicator for RedisReplicator {
    fn core(&self) -> &ReplicatorCore {
        self.inner.core()
    }

    fn core_mut(&mut self) -> &mut ReplicatorCore {
        self.inner.core_mut()
    }

    fn open(&mut self) -> BoxFuture<'_, Result<()>> {
        self.inner.open()
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        self.inner.close()
    }
}

async fn select_engine(uri: &RedisUri, config: Configuration) -> Result<Box<dyn Replicator>> {
    match uri.target() {
        SourceTarget::Live { host, port } => {
            info!(host = %host, port, "selected socket engine");
            let core = ReplicatorCore::new(config, "socket");
            Ok(Box::new(SocketReplicator::new(host.clone(), *port, core)))
        }
        SourceTarget::Static { path, file_type } => {
            // Unsupported kinds fail before any file is touched.
            if let FileType::Unsupported(kind) = file_type {
                return Err(ReplicationError::UnsupportedFormat(kind.clone()));
            }
            let file = File::open(path)
                .await
                .map_err(|source| ReplicationError::Unreachable {
                    target: path.display().to_string(),
                    source,
                })?;
            let mut reader = PeekableReader::new(file);

            let mut resolved = file_type.clone();
            if resolved == FileType::Aof && reader.peek().await? == Some(RDB_MAGIC[0]) {
                debug!(
                    path = %path.display(),
                    "declared command log begins with snapshot magic, using mixed engine"
                );
                resolved = FileType::Mixed;
            }
            info!(path = %path.display(), file_type = ?resolved, "selected file engine");
            match resolved {
                FileType::Rdb => Ok(Box::new(RdbReplicator::new(
                    reader,
                    ReplicatorCore::new(config, "rdb"),
                ))),
                FileType::Aof => Ok(Box::new(AofReplicator::new(
                    reader,
                    ReplicatorCore::new(config, "aof"),
                ))),
                FileType::Mixed => Ok(Box::new(MixReplicator::new(
                    reader,
                    ReplicatorCore::new(config, "mix"),
                ))),
                FileType::Unsupported(kind) => Err(ReplicationError::UnsupportedFormat(kind)),
            }
        }
    }
}

/// Close a replicator that may not exist. `None` is a no-op.
pub async fn close(replicator: Option<&mut RedisReplicator>) -> Result<()> {
    match replicator {
        Some(replicator) => replicator.close().await,
        None => Ok(()),
    }
}

/// Close a replicator that may not exist, swallowing any failure.
pub async fn close_quietly(replicator: Option<&mut RedisReplicator>) {
    if let Some(replicator) = replicator {
        if let Err(error) = replicator.close().await {
            debug!(%error, "ignoring close failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_kind_fails_before_open() {
        // The path does not exist; selection must fail on the declared
        // kind, not on the missing file.
        let err = RedisReplicator::new(
            "redis:///no/such/file.aof?type=bogus",
            ConfigOverlay::default(),
        )
        .await
        .unwrap_err();
        match err {
            ReplicationError::UnsupportedFormat(kind) => assert_eq!(kind, "bogus"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_unreachable() {
        let err = RedisReplicator::new("redis:///no/such/file.rdb", ConfigOverlay::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_no_extension_no_type_is_unsupported() {
        let err = RedisReplicator::new("redis:///no/such/backup", ConfigOverlay::default())
            .await
            .unwrap_err();
        match err {
            ReplicationError::UnsupportedFormat(kind) => assert_eq!(kind, "unknown"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_helpers_accept_none() {
        close(None).await.unwrap();
        close_quietly(None).await;
    }
}
