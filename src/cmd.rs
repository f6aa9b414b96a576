// Copyright (c) 2026 the replisource developers. Licensed under the MIT license.
// See LICENSE file in the project root for full license text.

//! Command names, decoded commands and the command-parser contract.
//!
//! A [`CommandParser`] is a pure decode function: it takes the raw argument
//! vector of one command frame plus the active configuration and produces a
//! [`Command`], or fails with a decode error naming the offending command.
//! Parsers are registered per [`CommandName`] on the facade; frames whose
//! name has no registered parser are skipped with a warning rather than
//! failing the stream.

use crate::config::Configuration;
use crate::error::{ReplicationError, Result};

/// A case-insensitive command-name token.
///
/// Normalized to uppercase on construction so `set`, `Set` and `SET` all
/// address the same registry slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandName(String);

impl CommandName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().to_ascii_uppercase())
    }

    /// Build a name from the first argument of a raw command frame.
    pub fn from_bytes(raw: &[u8]) -> Self {
        Self(String::from_utf8_lossy(raw).to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A decoded write command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: CommandName,
    /// The full argument vector, command name included, as raw bytes.
    pub args: Vec<Vec<u8>>,
}

/// Pure decode function for one command frame.
pub trait CommandParser: Send + Sync {
    fn parse(&self, raw: &[Vec<u8>], config: &Configuration) -> Result<Command>;
}

/// Parser that keeps the name and raw arguments as-is.
///
/// Sufficient for consumers that replay or inspect commands without
/// needing per-command field decoding.
pub struct DefaultCommandParser;

impl CommandParser for DefaultCommandParser {
    fn parse(&self, raw: &[Vec<u8>], _config: &Configuration) -> Result<Command> {
        let name = CommandName::from_bytes(&raw[0]);
        Ok(Command {
            name,
            args: raw.to_vec(),
        })
    }
}

/// Parser for `SELECT`, validating the database index argument.
pub struct SelectCommandParser;

impl CommandParser for SelectCommandParser {
    fn parse(&self, raw: &[Vec<u8>], _config: &Configuration) -> Result<Command> {
        if raw.len() != 2 {
            return Err(ReplicationError::decode(
                "SELECT",
                format!("expected 1 argument, got {}", raw.len() - 1),
            ));
        }
        std::str::from_utf8(&raw[1])
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| {
                ReplicationError::decode("SELECT", "database index is not an integer")
            })?;
        Ok(Command {
            name: CommandName::new("SELECT"),
            args: raw.to_vec(),
        })
    }
}

/// Command names covered by [`builtin_parsers`].
///
/// These are the write commands (plus replication-control frames) a master
/// replays over a replication link or an AOF records.
pub const BUILTIN_COMMANDS: &[&str] = &[
    "APPEND", "BITFIELD", "BITOP", "COPY", "DECR", "DECRBY", "DEL", "EXPIRE", "EXPIREAT",
    "FLUSHALL", "FLUSHDB", "GETSET", "GETDEL", "GETEX", "HDEL", "HINCRBY", "HINCRBYFLOAT",
    "HMSET", "HSET", "HSETNX", "INCR", "INCRBY", "INCRBYFLOAT", "LINSERT", "LMOVE", "LPOP",
    "LPUSH", "LPUSHX", "LREM", "LSET", "LTRIM", "MOVE", "MSET", "MSETNX", "MULTI", "EXEC",
    "PERSIST", "PEXPIRE", "PEXPIREAT", "PFADD", "PFCOUNT", "PFMERGE", "PING", "PSETEX",
    "PUBLISH", "RENAME", "RENAMENX", "REPLCONF", "RESTORE", "RPOP", "RPOPLPUSH", "RPUSH",
    "RPUSHX", "SADD", "SDIFFSTORE", "SET", "SETBIT", "SETEX", "SETNX", "SETRANGE",
    "SINTERSTORE", "SMOVE", "SPOP", "SREM", "SUNIONSTORE", "SWAPDB", "UNLINK", "XACK",
    "XADD", "XDEL", "XGROUP", "XSETID", "XTRIM", "ZADD", "ZDIFFSTORE", "ZINCRBY",
    "ZINTERSTORE", "ZPOPMAX", "ZPOPMIN", "ZREM", "ZREMRANGEBYLEX", "ZREMRANGEBYRANK",
    "ZREMRANGEBYSCORE", "ZUNIONSTORE",
];

/// The default parser table: every builtin command name mapped to its
/// parser. `SELECT` gets the validating parser, everything else the
/// pass-through default.
pub fn builtin_parsers() -> Vec<(CommandName, std::sync::Arc<dyn CommandParser>)> {
    use std::sync::Arc;
    let default: Arc<dyn CommandParser> = Arc::new(DefaultCommandParser);
    let mut table: Vec<(CommandName, Arc<dyn CommandParser>)> = BUILTIN_COMMANDS
        .iter()
        .map(|name| (CommandName::new(name), default.clone()))
        .collect();
    table.push((CommandName::new("SELECT"), Arc::new(SelectCommandParser)));
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name_case_insensitive() {
        assert_eq!(CommandName::new("set"), CommandName::new("SET"));
        assert_eq!(CommandName::from_bytes(b"Set").as_str(), "SET");
    }

    #[test]
    fn test_default_parser_keeps_args() {
        let raw = vec![b"set".to_vec(), b"k".to_vec(), b"v".to_vec()];
        let cmd = DefaultCommandParser
            .parse(&raw, &Configuration::default())
            .unwrap();
        assert_eq!(cmd.name.as_str(), "SET");
        assert_eq!(cmd.args, raw);
    }

    #[test]
    fn test_select_parser_accepts_integer_index() {
        let raw = vec![b"SELECT".to_vec(), b"7".to_vec()];
        let cmd = SelectCommandParser
            .parse(&raw, &Configuration::default())
            .unwrap();
        assert_eq!(cmd.args[1], b"7");
    }

    #[test]
    fn test_select_parser_rejects_non_integer() {
        let raw = vec![b"SELECT".to_vec(), b"seven".to_vec()];
        let err = SelectCommandParser
            .parse(&raw, &Configuration::default())
            .unwrap_err();
        assert!(err.to_string().contains("SELECT"));
    }

    #[test]
    fn test_select_parser_rejects_wrong_arity() {
        let raw = vec![b"SELECT".to_vec()];
        assert!(SelectCommandParser
            .parse(&raw, &Configuration::default())
            .is_err());
    }

    #[test]
    fn test_builtin_table_covers_core_write_commands() {
        let table = builtin_parsers();
        for name in ["SET", "DEL", "EXPIRE", "SELECT", "REPLCONF", "PING"] {
            assert!(
                table.iter().any(|(n, _)| n == &CommandName::new(name)),
                "missing builtin parser for {name}"
            );
        }
    }
}
