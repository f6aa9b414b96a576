// Copyright (c) 2026 the replisource developers. Licensed under the MIT license.
// See LICENSE file in the project root for full license text.

//! Engine for pure RDB snapshot sources.

use super::{EngineReader, ReplicatorCore, Replicator};
use crate::error::{ReplicationError, Result};
use crate::io::PeekableReader;
use crate::metrics;
use futures::future::BoxFuture;
use tokio::io::AsyncRead;
use tracing::info;

/// Streams one snapshot from start to trailer, then closes.
pub struct RdbReplicator<R> {
    core: ReplicatorCore,
    reader: Option<EngineReader<R>>,
}

impl<R: AsyncRead + Unpin + Send> RdbReplicator<R> {
    pub(crate) fn new(reader: PeekableReader<R>, core: ReplicatorCore) -> Self {
        let reader = core.wrap_reader(reader);
        Self {
            core,
            reader: Some(reader),
        }
    }

    async fn run(&mut self) -> Result<()> {
        let mut reader = self
            .reader
            .take()
            .ok_or_else(|| ReplicationError::Protocol("source already consumed".to_string()))?;
        let events = super::drive_snapshot(&mut self.core, &mut reader).await?;
        metrics::record_snapshot_loaded("rdb");
        info!(events, "snapshot source exhausted");
        Ok(())
    }
}

impl<R: AsyncRead + Unpin + Send> Replicator for RdbReplicator<R> {
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
            self.reader = None;
            self.core.mark_closed();
            Ok(())
        })
    }
}
