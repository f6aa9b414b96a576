// Copyright (c) 2026 the replisource developers. Licensed under the MIT license.
// See LICENSE file in the project root for full license text.

//! The facade contract and its four conforming engines.
//!
//! [`Replicator`] is the uniform contract every engine satisfies; callers
//! never see which variant was selected. Each engine embeds a
//! [`ReplicatorCore`] holding the registries, configuration and lifecycle
//! status; the trait's provided methods forward registry operations to the
//! core, so an engine only implements `core()`, `core_mut()`, `open()` and
//! `close()`.
//!
//! # Lifecycle
//!
//! ```text
//!                open()
//! Constructed ───────────→ Streaming ───────────→ Closed
//!                              │   (stream ends |
//!                              │    close() |
//!                              │    unrecoverable error)
//! ```
//!
//! `Closed` is terminal. `open()` is only valid from `Constructed`;
//! `close()` is idempotent and fires close listeners exactly once,
//! whichever path reached the terminal state first.

mod aof;
mod mix;
mod rdb;
mod socket;

pub use aof::AofReplicator;
pub use mix::MixReplicator;
pub use rdb::RdbReplicator;
pub use socket::SocketReplicator;

use crate::cmd::{builtin_parsers, CommandName, CommandParser};
use crate::config::Configuration;
use crate::error::{ReplicationError, Result};
use crate::event::Event;
use crate::io::{PeekableReader, SharedRawListeners, TeeReader};
use crate::listener::{
    CloseListener, EventListener, ExceptionListener, ListenerSet, RawByteListener,
};
use crate::metrics;
use crate::module::{ModuleKey, ModuleParser};
use crate::rdb::{DefaultRdbVisitor, RdbParser, RdbVisitor};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, BufReader};
use tracing::{debug, warn};

/// Lifecycle status of a facade instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Engine selected and configured, stream not yet consumed.
    Constructed,
    /// `open()` in progress; records are flowing to listeners.
    Streaming,
    /// Terminal. The transport has been released.
    Closed,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Constructed => write!(f, "Constructed"),
            Status::Streaming => write!(f, "Streaming"),
            Status::Closed => write!(f, "Closed"),
        }
    }
}

/// Reader stack every engine drives: buffered, tee'd to raw-byte
/// listeners, with the prober's one-byte pushback at the bottom.
pub(crate) type EngineReader<R> = BufReader<TeeReader<PeekableReader<R>>>;

/// Shared registry, configuration and status state embedded by every
/// engine variant.
pub struct ReplicatorCore {
    config: Configuration,
    status: Status,
    engine_label: &'static str,
    command_parsers: HashMap<CommandName, Arc<dyn CommandParser>>,
    module_parsers: HashMap<ModuleKey, Arc<dyn ModuleParser>>,
    rdb_visitor: Box<dyn RdbVisitor>,
    raw_listeners: SharedRawListeners,
    event_listeners: ListenerSet<dyn EventListener>,
    close_listeners: ListenerSet<dyn CloseListener>,
    exception_listeners: ListenerSet<dyn ExceptionListener>,
}

impl ReplicatorCore {
    pub(crate) fn new(config: Configuration, engine_label: &'static str) -> Self {
        Self {
            config,
            status: Status::Constructed,
            engine_label,
            command_parsers: HashMap::new(),
            module_parsers: HashMap::new(),
            rdb_visitor: Box::new(DefaultRdbVisitor),
            raw_listeners: Arc::new(Mutex::new(ListenerSet::new())),
            event_listeners: ListenerSet::new(),
            close_listeners: ListenerSet::new(),
            exception_listeners: ListenerSet::new(),
        }
    }

    pub(crate) fn config(&self) -> &Configuration {
        &self.config
    }

    pub(crate) fn status(&self) -> Status {
        self.status
    }

    /// Wrap a probed stream in the standard engine reader stack.
    pub(crate) fn wrap_reader<R: AsyncRead + Unpin>(
        &self,
        reader: PeekableReader<R>,
    ) -> EngineReader<R> {
        BufReader::with_capacity(
            self.config.buffer_size,
            TeeReader::new(reader, self.raw_listeners.clone()),
        )
    }

    /// Guard and perform the `Constructed → Streaming` transition.
    pub(crate) fn begin_streaming(&mut self) -> Result<()> {
        if self.status != Status::Constructed {
            return Err(ReplicationError::InvalidState {
                expected: Status::Constructed.to_string(),
                actual: self.status.to_string(),
            });
        }
        self.status = Status::Streaming;
        Ok(())
    }

    /// Transition to `Closed`, firing close listeners exactly once.
    /// Safe to call from any state, any number of times.
    pub(crate) fn mark_closed(&mut self) {
        if self.status == Status::Closed {
            return;
        }
        self.status = Status::Closed;
        debug!(engine = self.engine_label, "replication source closed");
        for listener in self.close_listeners.iter() {
            listener.on_close();
        }
    }

    /// Standard `open()` epilogue: broadcast a failure to exception
    /// listeners, then perform the terminal close either way.
    pub(crate) fn finish(&mut self, result: Result<()>) -> Result<()> {
        if let Err(error) = &result {
            for listener in self.exception_listeners.iter() {
                listener.on_exception(error);
            }
        }
        self.mark_closed();
        result
    }

    /// Deliver one decoded event to every event listener, in order.
    pub(crate) fn emit_event(&self, event: &Event) {
        metrics::record_events(self.engine_label, 1);
        for listener in self.event_listeners.iter() {
            listener.on_event(event);
        }
    }

    /// Dispatch one raw command frame through the parser registry.
    ///
    /// Frames without a registered parser are skipped with a warning;
    /// parser failures propagate as decode errors.
    pub(crate) fn handle_command(&self, raw: Vec<Vec<u8>>) -> Result<()> {
        if raw.is_empty() {
            warn!(engine = self.engine_label, "skipping empty command frame");
            return Ok(());
        }
        let name = CommandName::from_bytes(&raw[0]);
        match self.command_parsers.get(&name) {
            Some(parser) => {
                let command = parser.parse(&raw, &self.config)?;
                metrics::record_command_parsed(self.engine_label);
                self.emit_event(&Event::Command(command));
                Ok(())
            }
            None => {
                warn!(
                    engine = self.engine_label,
                    command = %name,
                    "no parser registered, skipping command"
                );
                metrics::record_command_skipped(self.engine_label);
                Ok(())
            }
        }
    }

    /// Borrow the snapshot-decode collaborators in one split: the
    /// visitor mutably, the module registry and configuration shared.
    pub(crate) fn rdb_parts(
        &mut self,
    ) -> (
        &mut dyn RdbVisitor,
        &HashMap<ModuleKey, Arc<dyn ModuleParser>>,
        &Configuration,
    ) {
        (&mut *self.rdb_visitor, &self.module_parsers, &self.config)
    }

    fn add_raw_byte_listener(&mut self, listener: Arc<dyn RawByteListener>) -> bool {
        self.raw_listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .add(listener)
    }

    fn remove_raw_byte_listener(&mut self, listener: &Arc<dyn RawByteListener>) -> bool {
        self.raw_listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(listener)
    }
}

/// Decode one complete snapshot through the core's visitor and module
/// registry, emitting every surfaced record. Returns the event count.
pub(crate) async fn drive_snapshot<R: AsyncRead + Unpin>(
    core: &mut ReplicatorCore,
    reader: R,
) -> Result<u64> {
    let mut parser = RdbParser::new(reader);
    let version = parser.read_header().await?;
    let mut emitted = 0u64;
    if let Some(event) = core.rdb_parts().0.snapshot_started(version) {
        core.emit_event(&event);
        emitted += 1;
    }
    loop {
        let event = {
            let (visitor, modules, config) = core.rdb_parts();
            parser.next_record(visitor, modules, config).await?
        };
        match event {
            Some(event) => {
                core.emit_event(&event);
                emitted += 1;
            }
            None => return Ok(emitted),
        }
    }
}

/// Dispatch command frames from a RESP reader until clean end of stream.
/// Returns the number of frames read.
pub(crate) async fn drive_commands<R: AsyncRead + Unpin>(
    core: &ReplicatorCore,
    resp: &mut crate::resp::RespReader<R>,
) -> Result<u64> {
    let mut frames = 0u64;
    while let Some(raw) = resp.read_command().await? {
        core.handle_command(raw)?;
        frames += 1;
    }
    Ok(frames)
}

/// The uniform facade contract every engine variant satisfies.
///
/// All registry and query operations are provided methods forwarding to
/// the embedded [`ReplicatorCore`]; engines implement the lifecycle pair
/// plus the two core accessors.
pub trait Replicator: Send {
    fn core(&self) -> &ReplicatorCore;
    fn core_mut(&mut self) -> &mut ReplicatorCore;

    /// Start streaming. Valid only from `Constructed`; resolves when the
    /// stream is exhausted (static sources) or closed/errored (live
    /// sources). Mid-stream failures are broadcast to exception listeners
    /// before propagating, and always perform the terminal close.
    fn open(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Release the transport and transition to `Closed`. Idempotent;
    /// close listeners fire exactly once across all close paths.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;

    fn add_raw_byte_listener(&mut self, listener: Arc<dyn RawByteListener>) -> bool {
        self.core_mut().add_raw_byte_listener(listener)
    }

    fn remove_raw_byte_listener(&mut self, listener: &Arc<dyn RawByteListener>) -> bool {
        self.core_mut().remove_raw_byte_listener(listener)
    }

    /// Install the default command parsers. Idempotent.
    fn builtin_command_parser_register(&mut self) {
        for (name, parser) in builtin_parsers() {
            self.core_mut().command_parsers.insert(name, parser);
        }
    }

    fn get_command_parser(&self, name: &CommandName) -> Option<Arc<dyn CommandParser>> {
        self.core().command_parsers.get(name).cloned()
    }

    /// Install a parser for a command name, replacing any existing entry.
    fn add_command_parser(&mut self, name: CommandName, parser: Arc<dyn CommandParser>) {
        self.core_mut().command_parsers.insert(name, parser);
    }

    /// Uninstall and return the parser for a command name, if present.
    fn remove_command_parser(&mut self, name: &CommandName) -> Option<Arc<dyn CommandParser>> {
        self.core_mut().command_parsers.remove(name)
    }

    fn get_module_parser(&self, name: &str, version: u32) -> Option<Arc<dyn ModuleParser>> {
        self.core()
            .module_parsers
            .get(&(name.to_string(), version))
            .cloned()
    }

    fn add_module_parser(&mut self, name: &str, version: u32, parser: Arc<dyn ModuleParser>) {
        self.core_mut()
            .module_parsers
            .insert((name.to_string(), version), parser);
    }

    fn remove_module_parser(&mut self, name: &str, version: u32) -> Option<Arc<dyn ModuleParser>> {
        self.core_mut()
            .module_parsers
            .remove(&(name.to_string(), version))
    }

    fn rdb_visitor(&self) -> &dyn RdbVisitor {
        &*self.core().rdb_visitor
    }

    /// Replace the snapshot visitor entirely (no merging).
    fn set_rdb_visitor(&mut self, visitor: Box<dyn RdbVisitor>) {
        self.core_mut().rdb_visitor = visitor;
    }

    fn add_event_listener(&mut self, listener: Arc<dyn EventListener>) -> bool {
        self.core_mut().event_listeners.add(listener)
    }

    fn remove_event_listener(&mut self, listener: &Arc<dyn EventListener>) -> bool {
        self.core_mut().event_listeners.remove(listener)
    }

    fn add_close_listener(&mut self, listener: Arc<dyn CloseListener>) -> bool {
        self.core_mut().close_listeners.add(listener)
    }

    fn remove_close_listener(&mut self, listener: &Arc<dyn CloseListener>) -> bool {
        self.core_mut().close_listeners.remove(listener)
    }

    fn add_exception_listener(&mut self, listener: Arc<dyn ExceptionListener>) -> bool {
        self.core_mut().exception_listeners.add(listener)
    }

    fn remove_exception_listener(&mut self, listener: &Arc<dyn ExceptionListener>) -> bool {
        self.core_mut().exception_listeners.remove(listener)
    }

    /// Whether verbose/raw-byte forwarding is enabled for this facade.
    fn verbose(&self) -> bool {
        self.core().config().verbose
    }

    fn status(&self) -> Status {
        self.core().status()
    }

    fn configuration(&self) -> &Configuration {
        self.core().config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_status_display() {
        assert_eq!(Status::Constructed.to_string(), "Constructed");
        assert_eq!(Status::Streaming.to_string(), "Streaming");
        assert_eq!(Status::Closed.to_string(), "Closed");
    }

    #[test]
    fn test_begin_streaming_guard() {
        let mut core = ReplicatorCore::new(Configuration::default(), "test");
        assert!(core.begin_streaming().is_ok());
        let err = core.begin_streaming().unwrap_err();
        assert!(matches!(err, ReplicationError::InvalidState { .. }));
    }

    #[test]
    fn test_open_invalid_after_close() {
        let mut core = ReplicatorCore::new(Configuration::default(), "test");
        core.mark_closed();
        assert!(matches!(
            core.begin_streaming(),
            Err(ReplicationError::InvalidState { .. })
        ));
    }

    struct CloseCounter(AtomicUsize);

    impl CloseListener for CloseCounter {
        fn on_close(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_close_listeners_fire_exactly_once() {
        let mut core = ReplicatorCore::new(Configuration::default(), "test");
        let counter = Arc::new(CloseCounter(AtomicUsize::new(0)));
        core.close_listeners
            .add(counter.clone() as Arc<dyn CloseListener>);
        core.mark_closed();
        core.mark_closed();
        core.mark_closed();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    struct ExceptionCounter(AtomicUsize);

    impl ExceptionListener for ExceptionCounter {
        fn on_exception(&self, _error: &ReplicationError) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_finish_broadcasts_error_then_closes() {
        let mut core = ReplicatorCore::new(Configuration::default(), "test");
        let exceptions = Arc::new(ExceptionCounter(AtomicUsize::new(0)));
        let closes = Arc::new(CloseCounter(AtomicUsize::new(0)));
        core.exception_listeners
            .add(exceptions.clone() as Arc<dyn ExceptionListener>);
        core.close_listeners
            .add(closes.clone() as Arc<dyn CloseListener>);

        let result = core.finish(Err(ReplicationError::Protocol("boom".to_string())));
        assert!(result.is_err());
        assert_eq!(exceptions.0.load(Ordering::SeqCst), 1);
        assert_eq!(closes.0.load(Ordering::SeqCst), 1);
        assert_eq!(core.status(), Status::Closed);
    }

    #[test]
    fn test_finish_success_does_not_broadcast() {
        let mut core = ReplicatorCore::new(Configuration::default(), "test");
        let exceptions = Arc::new(ExceptionCounter(AtomicUsize::new(0)));
        core.exception_listeners
            .add(exceptions.clone() as Arc<dyn ExceptionListener>);
        assert!(core.finish(Ok(())).is_ok());
        assert_eq!(exceptions.0.load(Ordering::SeqCst), 0);
        assert_eq!(core.status(), Status::Closed);
    }

    struct EventCounter(AtomicUsize);

    impl EventListener for EventCounter {
        fn on_event(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_handle_command_skips_unregistered() {
        let mut core = ReplicatorCore::new(Configuration::default(), "test");
        let events = Arc::new(EventCounter(AtomicUsize::new(0)));
        core.event_listeners
            .add(events.clone() as Arc<dyn EventListener>);

        // Nothing registered: frame skipped, no event, no error
        core.handle_command(vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()])
            .unwrap();
        assert_eq!(events.0.load(Ordering::SeqCst), 0);

        for (name, parser) in builtin_parsers() {
            core.command_parsers.insert(name, parser);
        }
        core.handle_command(vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()])
            .unwrap();
        assert_eq!(events.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handle_command_parser_failure_propagates() {
        let mut core = ReplicatorCore::new(Configuration::default(), "test");
        for (name, parser) in builtin_parsers() {
            core.command_parsers.insert(name, parser);
        }
        let err = core
            .handle_command(vec![b"SELECT".to_vec(), b"nope".to_vec()])
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Decode { .. }));
    }
}
