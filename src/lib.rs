//! # replisource
//!
//! A uniform replication-source facade for Redis-compatible stores.
//!
//! ## Architecture
//!
//! One identifier string selects one of four engines behind a single
//! contract; callers attach listeners and call `open()` without knowing
//! which engine was picked:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           RedisReplicator                            │
//! │                                                                      │
//! │  redis://host:port ──────────────────────────► SocketReplicator      │
//! │  redis:///dump.rdb ──────────────────────────► RdbReplicator         │
//! │  redis:///file.aof ──┬── first byte 'R'? ────► MixReplicator         │
//! │                      └── otherwise ──────────► AofReplicator         │
//! │  redis:///backup?type=mixed ─────────────────► MixReplicator         │
//! │                                                                      │
//! │  ┌──────────────┐   ┌───────────────┐   ┌─────────────────────────┐  │
//! │  │ RespReader / │──►│ parser +      │──►│ Event / raw-byte /      │  │
//! │  │ RdbParser    │   │ visitor hooks │   │ close / exception       │  │
//! │  │ (one stack)  │   │ (registries)  │   │ listeners               │  │
//! │  └──────────────┘   └───────────────┘   └─────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Engines
//!
//! 1. **Snapshot** (`.rdb`): structural walk of one RDB file.
//! 2. **Command log** (`.aof`): RESP frame replay.
//! 3. **Mixed**: snapshot stage, then command-log tail, one reader.
//! 4. **Socket**: PSYNC handshake against a live master, bulk snapshot,
//!    then the endless command stream with `GETACK` acknowledgement.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use replisource::{ConfigOverlay, RedisReplicator, Replicator};
//!
//! #[tokio::main]
//! async fn main() -> replisource::Result<()> {
//!     let mut replicator =
//!         RedisReplicator::new("redis:///var/lib/redis/dump.rdb", ConfigOverlay::default())
//!             .await?;
//!     replicator.add_event_listener(std::sync::Arc::new(Printer));
//!     replicator.open().await
//! }
//!
//! struct Printer;
//!
//! impl replisource::EventListener for Printer {
//!     fn on_event(&self, event: &replisource::Event) {
//!         println!("{event:?}");
//!     }
//! }
//! ```

pub mod cmd;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod io;
pub mod listener;
pub mod metrics;
pub mod module;
pub mod rdb;
pub mod replicator;
pub mod resp;
pub mod uri;

pub use cmd::{Command, CommandName, CommandParser, DefaultCommandParser};
pub use config::{ConfigOverlay, Configuration};
pub use engine::{Replicator, Status};
pub use error::{ReplicationError, Result};
pub use event::{Event, Value};
pub use listener::{CloseListener, EventListener, ExceptionListener, RawByteListener};
pub use module::{Module, ModuleParser};
pub use rdb::{DefaultRdbVisitor, RdbVisitor};
pub use replicator::{close, close_quietly, RedisReplicator};
pub use uri::{FileType, RedisUri, SourceTarget};
