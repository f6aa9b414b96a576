// Copyright (c) 2026 the replisource developers. Licensed under the MIT license.
// See LICENSE file in the project root for full license text.

//! Engine for plain command-log (AOF) sources.

use super::{EngineReader, ReplicatorCore, Replicator};
use crate::error::{ReplicationError, Result};
use crate::io::PeekableReader;
use crate::resp::RespReader;
use futures::future::BoxFuture;
use tokio::io::AsyncRead;
use tracing::info;

/// Replays a command log frame by frame, then closes.
pub struct AofReplicator<R> {
    core: ReplicatorCore,
    reader: Option<EngineReader<R>>,
}

impl<R: AsyncRead + Unpin + Send> AofReplicator<R> {
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
        let mut resp = RespReader::new(&mut reader);
        let frames = super::drive_commands(&self.core, &mut resp).await?;
        info!(frames, "command log exhausted");
        Ok(())
    }
}

impl<R: AsyncRead + Unpin + Send> Replicator for AofReplicator<R> {
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
