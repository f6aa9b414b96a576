// Copyright (c) 2026 the replisource developers. Licensed under the MIT license.
// See LICENSE file in the project root for full license text.

//! Error types for the replication source layer.
//!
//! Errors are categorized by the phase in which they surface: resolution
//! (parsing the source identifier), open (reaching the underlying resource)
//! and streaming (decoding records from it).
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Surfaces at | Description |
//! |---------------------|-----------|-------------|--------------------------------------------|
//! | `MalformedUri` | No | resolution | Identifier string cannot be parsed |
//! | `Unreachable` | Yes | open | File/endpoint cannot be opened or reached |
//! | `UnsupportedFormat` | No | selection | Declared kind has no matching engine |
//! | `Decode` | No | streaming | Record bytes violate the expected framing |
//! | `Protocol` | No | streaming | Handshake or mid-stream protocol violation |
//! | `Io` | Yes | any | Transport-level read/write failure |
//! | `InvalidState` | No | any | Lifecycle violation (e.g. double `open()`) |
//! | `Config` | No | open | Configuration cannot be honored |
//!
//! # Retry Behavior
//!
//! Use [`ReplicationError::is_retryable()`] to decide whether an operation
//! should be retried with backoff. Retryable errors indicate transient
//! network or availability issues; the rest indicate malformed input, data
//! corruption or caller bugs.

use thiserror::Error;

/// Result type alias for replication-source operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur while resolving, opening or streaming a source.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// The source identifier string cannot be parsed.
    ///
    /// Surfaced synchronously from [`RedisUri::parse`](crate::uri::RedisUri::parse),
    /// before any resource is touched.
    #[error("malformed uri {uri:?}: {reason}")]
    MalformedUri { uri: String, reason: String },

    /// A resolved source cannot actually be opened or reached.
    ///
    /// Resolution can succeed for a file that no longer exists or a host
    /// that is down; this surfaces at open time, not resolution time.
    #[error("unreachable source {target:?}: {source}")]
    Unreachable {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The declared (or inferred) file kind has no matching engine.
    #[error("unsupported source format {0:?}")]
    UnsupportedFormat(String),

    /// A record's bytes do not match the expected framing for its type.
    ///
    /// Carries the offending command or module identity in `context` and,
    /// when known, the byte offset within the current decode stage.
    #[error("decode error ({context}){}: {message}", .position.map(|p| format!(" at byte {p}")).unwrap_or_default())]
    Decode {
        context: String,
        position: Option<u64>,
        message: String,
    },

    /// A live-source handshake or mid-stream protocol violation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport-level read or write failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Lifecycle violation, e.g. calling `open()` twice on one facade.
    ///
    /// Not retryable; indicates a bug in the caller.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// The merged configuration asks for something this build cannot honor.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ReplicationError {
    /// Create a decode error without a position.
    pub fn decode(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            context: context.into(),
            position: None,
            message: message.into(),
        }
    }

    /// Create a decode error at a known byte offset.
    pub fn decode_at(
        context: impl Into<String>,
        position: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::Decode {
            context: context.into(),
            position: Some(position),
            message: message.into(),
        }
    }

    /// Create a malformed-uri error.
    pub fn malformed(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Create an unreachable-source error from the underlying I/O failure.
    pub fn unreachable(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::Unreachable {
            target: target.into(),
            source,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable { .. } => true, // Resource may come back
            Self::Io(_) => true,              // Network errors are retryable
            Self::MalformedUri { .. } => false,
            Self::UnsupportedFormat(_) => false,
            Self::Decode { .. } => false, // Data corruption
            Self::Protocol(_) => false,
            Self::InvalidState { .. } => false,
            Self::Config(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_with_position() {
        let err = ReplicationError::decode_at("SET", 42, "truncated bulk string");
        let msg = err.to_string();
        assert!(msg.contains("SET"));
        assert!(msg.contains("at byte 42"));
        assert!(msg.contains("truncated bulk string"));
    }

    #[test]
    fn test_decode_error_without_position() {
        let err = ReplicationError::decode("rdb", "missing magic");
        let msg = err.to_string();
        assert!(msg.contains("rdb"));
        assert!(!msg.contains("at byte"));
    }

    #[test]
    fn test_malformed_uri_display() {
        let err = ReplicationError::malformed("nonsense", "missing scheme");
        assert!(err.to_string().contains("nonsense"));
        assert!(err.to_string().contains("missing scheme"));
    }

    #[test]
    fn test_unreachable_is_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = ReplicationError::unreachable("/tmp/missing.rdb", io);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("/tmp/missing.rdb"));
    }

    #[test]
    fn test_not_retryable_decode() {
        assert!(!ReplicationError::decode("rdb", "bad opcode").is_retryable());
    }

    #[test]
    fn test_not_retryable_invalid_state() {
        let err = ReplicationError::InvalidState {
            expected: "Constructed".to_string(),
            actual: "Streaming".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Constructed"));
        assert!(err.to_string().contains("Streaming"));
    }

    #[test]
    fn test_not_retryable_unsupported_format() {
        let err = ReplicationError::UnsupportedFormat("bogus".to_string());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_io_error_is_retryable() {
        let err: ReplicationError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        assert!(err.is_retryable());
    }
}
