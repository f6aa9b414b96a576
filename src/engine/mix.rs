// Copyright (c) 2026 the replisource developers. Licensed under the MIT license.
// See LICENSE file in the project root for full license text.

//! Engine for mixed files: an embedded snapshot followed by a command
//! log tail.
//!
//! Both stages run over one reader stack so no byte is lost at the
//! stage boundary. The snapshot's trailer (and its checksum, when the
//! format version carries one) marks the handoff; the very next byte
//! belongs to the command log.

use super::{EngineReader, ReplicatorCore, Replicator};
use crate::error::{ReplicationError, Result};
use crate::io::PeekableReader;
use crate::metrics;
use crate::resp::RespReader;
use futures::future::BoxFuture;
use tokio::io::AsyncRead;
use tracing::{debug, info};

/// Streams the snapshot stage, then the command tail, then closes.
pub struct MixReplicator<R> {
    core: ReplicatorCore,
    reader: Option<EngineReader<R>>,
}

impl<R: AsyncRead + Unpin + Send> MixReplicator<R> {
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
        metrics::record_snapshot_loaded("mix");
        debug!(events, "snapshot stage complete, switching to command log");

        let mut resp = RespReader::new(&mut reader);
        let frames = super::drive_commands(&self.core, &mut resp).await?;
        info!(events, frames, "mixed source exhausted");
        Ok(())
    }
}

impl<R: AsyncRead + Unpin + Send> Replicator for MixReplicator<R> {
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
