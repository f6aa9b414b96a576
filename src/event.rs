//! Decoded high-level events shared by all engines.
//!
//! Whatever the underlying source shape, registered event listeners see
//! one stream of these: snapshot framing records first (for snapshot,
//! mixed and live sources), then replayed write commands (for command-log,
//! mixed and live sources).

use crate::cmd::Command;
use crate::module::Module;

/// A decoded value from a snapshot record.
///
/// Only string-typed values are decoded structurally by the built-in
/// snapshot walk; richer value decoding belongs to a custom
/// [`RdbVisitor`](crate::rdb::RdbVisitor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(Vec<u8>),
}

/// A decoded record pushed to event listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Snapshot header seen; `version` is the RDB format version.
    SnapshotStarted { version: u32 },

    /// Auxiliary metadata field from the snapshot header area.
    Aux { key: Vec<u8>, value: Vec<u8> },

    /// Logical database switch.
    SelectDb { db: u64 },

    /// Database size hint (keys and keys-with-expiry counts).
    ResizeDb { db_size: u64, expires_size: u64 },

    /// One key/value record from the snapshot.
    KeyValue {
        db: u64,
        key: Vec<u8>,
        value: Value,
        /// Absolute expiry in milliseconds since the epoch, if any.
        expire_at_ms: Option<u64>,
    },

    /// One module (extension data-type) record from the snapshot.
    ModuleRecord {
        db: u64,
        key: Vec<u8>,
        module: Module,
    },

    /// Snapshot trailer seen. `checksum` is `None` when the file was
    /// written with checksumming disabled.
    SnapshotEnded { checksum: Option<u64> },

    /// One replayed write command.
    Command(Command),
}
