// Copyright (c) 2026 the replisource developers. Licensed under the MIT license.
// See LICENSE file in the project root for full license text.

//! RDB snapshot structural decoding.
//!
//! [`RdbParser`] walks the record stream of an RDB file: header magic and
//! version, aux fields, database selectors, expiry opcodes, string-typed
//! key/value records, module records and the EOF trailer. Decoded records
//! are handed to the swappable [`RdbVisitor`], which decides what (if
//! anything) to surface as an [`Event`].
//!
//! The walk is deliberately structural: string values and module framing
//! are decoded, richer value types (lists, hashes, sorted sets, stream
//! listpacks) are reported as decode errors rather than guessed at. The
//! trailer checksum is read but not verified.
//!
//! The leading byte of [`RDB_MAGIC`] doubles as the disambiguator for
//! AOF-declared files that actually begin with an embedded snapshot.

use crate::config::Configuration;
use crate::error::{ReplicationError, Result};
use crate::event::{Event, Value};
use crate::module::{Module, ModuleKey, ModuleParser};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Magic bytes opening every RDB snapshot.
pub const RDB_MAGIC: &[u8; 5] = b"REDIS";

const CONTEXT: &str = "rdb";

// Record opcodes.
const OP_MODULE_AUX: u8 = 0xF7;
const OP_IDLE: u8 = 0xF8;
const OP_FREQ: u8 = 0xF9;
const OP_AUX: u8 = 0xFA;
const OP_RESIZEDB: u8 = 0xFB;
const OP_EXPIRETIME_MS: u8 = 0xFC;
const OP_EXPIRETIME: u8 = 0xFD;
const OP_SELECTDB: u8 = 0xFE;
const OP_EOF: u8 = 0xFF;

// Value types the structural walk handles.
const TYPE_STRING: u8 = 0;
const TYPE_MODULE: u8 = 6;
const TYPE_MODULE_2: u8 = 7;

// Module serialization opcodes.
const MODULE_OP_EOF: u64 = 0;
const MODULE_OP_SINT: u64 = 1;
const MODULE_OP_UINT: u64 = 2;
const MODULE_OP_FLOAT: u64 = 3;
const MODULE_OP_DOUBLE: u64 = 4;
const MODULE_OP_STRING: u64 = 5;

const MODULE_NAME_CHARSET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Checksums appear in the trailer from this format version on.
const CHECKSUM_MIN_VERSION: u32 = 5;

/// Decode a 64-bit module type id into its (name, version) pair.
pub(crate) fn decode_module_id(id: u64) -> (String, u32) {
    let mut name = String::with_capacity(9);
    let chars = id >> 10;
    for j in 0..9 {
        let idx = ((chars >> (54 - 6 * j)) & 63) as usize;
        name.push(MODULE_NAME_CHARSET[idx] as char);
    }
    (name, (id & 1023) as u32)
}

/// Swappable callback object receiving decoded snapshot records.
///
/// Return `Some(event)` to surface a record to the event listeners,
/// `None` to suppress it.
pub trait RdbVisitor: Send + Sync {
    fn snapshot_started(&mut self, version: u32) -> Option<Event>;
    fn aux(&mut self, key: Vec<u8>, value: Vec<u8>) -> Option<Event>;
    fn select_db(&mut self, db: u64) -> Option<Event>;
    fn resize_db(&mut self, db_size: u64, expires_size: u64) -> Option<Event>;
    fn key_value(
        &mut self,
        db: u64,
        key: Vec<u8>,
        value: Value,
        expire_at_ms: Option<u64>,
    ) -> Option<Event>;
    fn module(&mut self, db: u64, key: Vec<u8>, module: Module) -> Option<Event>;
    fn snapshot_ended(&mut self, checksum: Option<u64>) -> Option<Event>;
}

/// Visitor that surfaces every record as the matching [`Event`].
#[derive(Debug, Default)]
pub struct DefaultRdbVisitor;

impl RdbVisitor for DefaultRdbVisitor {
    fn snapshot_started(&mut self, version: u32) -> Option<Event> {
        Some(Event::SnapshotStarted { version })
    }

    fn aux(&mut self, key: Vec<u8>, value: Vec<u8>) -> Option<Event> {
        Some(Event::Aux { key, value })
    }

    fn select_db(&mut self, db: u64) -> Option<Event> {
        Some(Event::SelectDb { db })
    }

    fn resize_db(&mut self, db_size: u64, expires_size: u64) -> Option<Event> {
        Some(Event::ResizeDb {
            db_size,
            expires_size,
        })
    }

    fn key_value(
        &mut self,
        db: u64,
        key: Vec<u8>,
        value: Value,
        expire_at_ms: Option<u64>,
    ) -> Option<Event> {
        Some(Event::KeyValue {
            db,
            key,
            value,
            expire_at_ms,
        })
    }

    fn module(&mut self, db: u64, key: Vec<u8>, module: Module) -> Option<Event> {
        Some(Event::ModuleRecord { db, key, module })
    }

    fn snapshot_ended(&mut self, checksum: Option<u64>) -> Option<Event> {
        Some(Event::SnapshotEnded { checksum })
    }
}

enum Length {
    Normal(u64),
    Special(u8),
}

/// Structural walker over one RDB record stream.
pub struct RdbParser<R> {
    inner: R,
    pos: u64,
    db: u64,
    version: u32,
    done: bool,
}

impl<R: AsyncRead + Unpin> RdbParser<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pos: 0,
            db: 0,
            version: 0,
            done: false,
        }
    }

    /// Bytes consumed so far within this snapshot.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Validate the magic and read the 4-digit format version.
    pub async fn read_header(&mut self) -> Result<u32> {
        let magic = self.read_bytes(5).await?;
        if &magic[..] != RDB_MAGIC {
            return Err(ReplicationError::decode_at(
                CONTEXT,
                0,
                "missing RDB magic",
            ));
        }
        let version_bytes = self.read_bytes(4).await?;
        let version = std::str::from_utf8(&version_bytes)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| {
                ReplicationError::decode_at(CONTEXT, 5, "non-numeric RDB version")
            })?;
        self.version = version;
        Ok(version)
    }

    /// Decode records until the visitor surfaces an event or the trailer
    /// is reached. `None` once the snapshot is fully consumed.
    pub async fn next_record(
        &mut self,
        visitor: &mut dyn RdbVisitor,
        modules: &HashMap<ModuleKey, Arc<dyn ModuleParser>>,
        config: &Configuration,
    ) -> Result<Option<Event>> {
        if self.done {
            return Ok(None);
        }
        let mut expire_at_ms: Option<u64> = None;
        loop {
            let op = self.read_u8().await?;
            match op {
                OP_AUX => {
                    let key = self.read_string().await?;
                    let value = self.read_string().await?;
                    if let Some(event) = visitor.aux(key, value) {
                        return Ok(Some(event));
                    }
                }
                OP_SELECTDB => {
                    let db = self.read_length_value().await?;
                    self.db = db;
                    if let Some(event) = visitor.select_db(db) {
                        return Ok(Some(event));
                    }
                }
                OP_RESIZEDB => {
                    let db_size = self.read_length_value().await?;
                    let expires_size = self.read_length_value().await?;
                    if let Some(event) = visitor.resize_db(db_size, expires_size) {
                        return Ok(Some(event));
                    }
                }
                OP_EXPIRETIME_MS => {
                    expire_at_ms = Some(self.read_u64_le().await?);
                }
                OP_EXPIRETIME => {
                    expire_at_ms = Some(u64::from(self.read_u32_le().await?) * 1000);
                }
                OP_FREQ => {
                    // LFU frequency hint, one byte, nothing to surface.
                    self.read_u8().await?;
                }
                OP_IDLE => {
                    // LRU idle time hint.
                    self.read_length_value().await?;
                }
                OP_MODULE_AUX => {
                    return Err(ReplicationError::decode_at(
                        CONTEXT,
                        self.pos,
                        "module aux records are not supported",
                    ));
                }
                OP_EOF => {
                    let checksum = if self.version >= CHECKSUM_MIN_VERSION {
                        let raw = self.read_u64_le().await?;
                        (raw != 0).then_some(raw)
                    } else {
                        None
                    };
                    self.done = true;
                    return Ok(visitor.snapshot_ended(checksum));
                }
                TYPE_STRING => {
                    let key = self.read_string().await?;
                    let value = self.read_string().await?;
                    let expiry = expire_at_ms.take();
                    if let Some(event) =
                        visitor.key_value(self.db, key, Value::String(value), expiry)
                    {
                        return Ok(Some(event));
                    }
                }
                TYPE_MODULE_2 => {
                    let key = self.read_string().await?;
                    let module = self.read_module(modules, config).await?;
                    expire_at_ms.take();
                    if let Some(event) = visitor.module(self.db, key, module) {
                        return Ok(Some(event));
                    }
                }
                TYPE_MODULE => {
                    return Err(ReplicationError::decode_at(
                        CONTEXT,
                        self.pos,
                        "pre-GA module records (type 6) are not supported",
                    ));
                }
                other => {
                    return Err(ReplicationError::decode_at(
                        CONTEXT,
                        self.pos,
                        format!(
                            "unsupported value type 0x{other:02x} (only string-typed values are decoded)"
                        ),
                    ));
                }
            }
        }
    }

    async fn read_module(
        &mut self,
        modules: &HashMap<ModuleKey, Arc<dyn ModuleParser>>,
        config: &Configuration,
    ) -> Result<Module> {
        let id = self.read_length_value().await?;
        let (name, version) = decode_module_id(id);
        let mut parts = Vec::new();
        loop {
            match self.read_length_value().await? {
                MODULE_OP_EOF => break,
                MODULE_OP_SINT | MODULE_OP_UINT => {
                    let v = self.read_length_value().await?;
                    parts.push(v.to_string().into_bytes());
                }
                MODULE_OP_FLOAT => {
                    let bytes = self.read_bytes(4).await?;
                    let v = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                    parts.push(v.to_string().into_bytes());
                }
                MODULE_OP_DOUBLE => {
                    let bytes = self.read_bytes(8).await?;
                    let v = f64::from_le_bytes(bytes.try_into().expect("8-byte read"));
                    parts.push(v.to_string().into_bytes());
                }
                MODULE_OP_STRING => parts.push(self.read_string().await?),
                other => {
                    return Err(ReplicationError::decode_at(
                        format!("module {name} v{version}"),
                        self.pos,
                        format!("unknown module opcode {other}"),
                    ));
                }
            }
        }
        match modules.get(&(name.clone(), version)) {
            Some(parser) => parser.parse(&name, version, &parts, config),
            None => Err(ReplicationError::decode_at(
                format!("module {name} v{version}"),
                self.pos,
                "no module parser registered",
            )),
        }
    }

    async fn read_length(&mut self) -> Result<Length> {
        let b = self.read_u8().await?;
        match b >> 6 {
            0b00 => Ok(Length::Normal(u64::from(b & 0x3F))),
            0b01 => {
                let lo = self.read_u8().await?;
                Ok(Length::Normal((u64::from(b & 0x3F) << 8) | u64::from(lo)))
            }
            0b10 => match b {
                0x80 => {
                    let bytes = self.read_bytes(4).await?;
                    Ok(Length::Normal(u64::from(u32::from_be_bytes(
                        bytes.try_into().expect("4-byte read"),
                    ))))
                }
                0x81 => {
                    let bytes = self.read_bytes(8).await?;
                    Ok(Length::Normal(u64::from_be_bytes(
                        bytes.try_into().expect("8-byte read"),
                    )))
                }
                _ => Err(ReplicationError::decode_at(
                    CONTEXT,
                    self.pos,
                    format!("invalid length byte 0x{b:02x}"),
                )),
            },
            _ => Ok(Length::Special(b & 0x3F)),
        }
    }

    async fn read_length_value(&mut self) -> Result<u64> {
        match self.read_length().await? {
            Length::Normal(n) => Ok(n),
            Length::Special(enc) => Err(ReplicationError::decode_at(
                CONTEXT,
                self.pos,
                format!("expected plain length, got special encoding {enc}"),
            )),
        }
    }

    async fn read_string(&mut self) -> Result<Vec<u8>> {
        match self.read_length().await? {
            Length::Normal(len) => self.read_bytes(len as usize).await,
            Length::Special(0) => {
                let v = self.read_u8().await? as i8;
                Ok(v.to_string().into_bytes())
            }
            Length::Special(1) => {
                let bytes = self.read_bytes(2).await?;
                let v = i16::from_le_bytes([bytes[0], bytes[1]]);
                Ok(v.to_string().into_bytes())
            }
            Length::Special(2) => {
                let bytes = self.read_bytes(4).await?;
                let v = i32::from_le_bytes(bytes.try_into().expect("4-byte read"));
                Ok(v.to_string().into_bytes())
            }
            Length::Special(3) => Err(ReplicationError::decode_at(
                CONTEXT,
                self.pos,
                "LZF-compressed strings are not supported",
            )),
            Length::Special(other) => Err(ReplicationError::decode_at(
                CONTEXT,
                self.pos,
                format!("unknown string encoding {other}"),
            )),
        }
    }

    async fn read_u8(&mut self) -> Result<u8> {
        let bytes = self.read_bytes(1).await?;
        Ok(bytes[0])
    }

    async fn read_u32_le(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4).await?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4-byte read")))
    }

    async fn read_u64_le(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8).await?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8-byte read")))
    }

    async fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ReplicationError::decode_at(CONTEXT, self.pos, "unexpected end of snapshot")
            } else {
                ReplicationError::Io(e)
            }
        })?;
        self.pos += len as u64;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn no_modules() -> HashMap<ModuleKey, Arc<dyn ModuleParser>> {
        HashMap::new()
    }

    fn len_str(s: &[u8]) -> Vec<u8> {
        assert!(s.len() < 64);
        let mut out = vec![s.len() as u8];
        out.extend_from_slice(s);
        out
    }

    /// REDIS0009 header, one aux field, selectdb 0, one string key, EOF.
    fn minimal_rdb() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"REDIS0009");
        out.push(OP_AUX);
        out.extend_from_slice(&len_str(b"redis-ver"));
        out.extend_from_slice(&len_str(b"7.0.0"));
        out.push(OP_SELECTDB);
        out.push(0);
        out.push(TYPE_STRING);
        out.extend_from_slice(&len_str(b"foo"));
        out.extend_from_slice(&len_str(b"bar"));
        out.push(OP_EOF);
        out.extend_from_slice(&[0u8; 8]); // checksum disabled
        out
    }

    async fn collect_events(bytes: Vec<u8>) -> Result<Vec<Event>> {
        let mut parser = RdbParser::new(Cursor::new(bytes));
        let mut visitor = DefaultRdbVisitor;
        let version = parser.read_header().await?;
        let mut events = vec![Event::SnapshotStarted { version }];
        let modules = no_modules();
        let config = Configuration::default();
        while let Some(event) = parser.next_record(&mut visitor, &modules, &config).await? {
            events.push(event);
        }
        Ok(events)
    }

    #[tokio::test]
    async fn test_minimal_snapshot() {
        let events = collect_events(minimal_rdb()).await.unwrap();
        assert_eq!(events[0], Event::SnapshotStarted { version: 9 });
        assert_eq!(
            events[1],
            Event::Aux {
                key: b"redis-ver".to_vec(),
                value: b"7.0.0".to_vec()
            }
        );
        assert_eq!(events[2], Event::SelectDb { db: 0 });
        assert_eq!(
            events[3],
            Event::KeyValue {
                db: 0,
                key: b"foo".to_vec(),
                value: Value::String(b"bar".to_vec()),
                expire_at_ms: None,
            }
        );
        assert_eq!(events[4], Event::SnapshotEnded { checksum: None });
    }

    #[tokio::test]
    async fn test_bad_magic() {
        let mut parser = RdbParser::new(Cursor::new(b"RUBIS0009".to_vec()));
        let err = parser.read_header().await.unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[tokio::test]
    async fn test_expiry_applies_to_next_key() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"REDIS0009");
        bytes.push(OP_EXPIRETIME_MS);
        bytes.extend_from_slice(&1_700_000_000_123u64.to_le_bytes());
        bytes.push(TYPE_STRING);
        bytes.extend_from_slice(&len_str(b"k"));
        bytes.extend_from_slice(&len_str(b"v"));
        bytes.push(TYPE_STRING);
        bytes.extend_from_slice(&len_str(b"k2"));
        bytes.extend_from_slice(&len_str(b"v2"));
        bytes.push(OP_EOF);
        bytes.extend_from_slice(&[0u8; 8]);

        let events = collect_events(bytes).await.unwrap();
        assert_eq!(
            events[1],
            Event::KeyValue {
                db: 0,
                key: b"k".to_vec(),
                value: Value::String(b"v".to_vec()),
                expire_at_ms: Some(1_700_000_000_123),
            }
        );
        // Expiry must not leak onto the following key
        assert!(matches!(
            events[2],
            Event::KeyValue {
                expire_at_ms: None,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_second_expiry_opcode() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"REDIS0009");
        bytes.push(OP_EXPIRETIME);
        bytes.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        bytes.push(TYPE_STRING);
        bytes.extend_from_slice(&len_str(b"k"));
        bytes.extend_from_slice(&len_str(b"v"));
        bytes.push(OP_EOF);
        bytes.extend_from_slice(&[0u8; 8]);

        let events = collect_events(bytes).await.unwrap();
        assert!(matches!(
            events[1],
            Event::KeyValue {
                expire_at_ms: Some(1_700_000_000_000),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_int_encoded_string_value() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"REDIS0009");
        bytes.push(TYPE_STRING);
        bytes.extend_from_slice(&len_str(b"n"));
        bytes.push(0xC0); // special encoding 0: int8
        bytes.push(42);
        bytes.push(OP_EOF);
        bytes.extend_from_slice(&[0u8; 8]);

        let events = collect_events(bytes).await.unwrap();
        assert_eq!(
            events[1],
            Event::KeyValue {
                db: 0,
                key: b"n".to_vec(),
                value: Value::String(b"42".to_vec()),
                expire_at_ms: None,
            }
        );
    }

    #[tokio::test]
    async fn test_fourteen_bit_length() {
        // 14-bit length 300: 0b01 prefix, 300 = 0x012C
        let mut parser = RdbParser::new(Cursor::new(vec![0x41, 0x2C]));
        match parser.read_length().await.unwrap() {
            Length::Normal(n) => assert_eq!(n, 300),
            Length::Special(_) => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_thirty_two_bit_length() {
        let mut bytes = vec![0x80];
        bytes.extend_from_slice(&100_000u32.to_be_bytes());
        let mut parser = RdbParser::new(Cursor::new(bytes));
        match parser.read_length().await.unwrap() {
            Length::Normal(n) => assert_eq!(n, 100_000),
            Length::Special(_) => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_checksum_surfaced_when_present() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"REDIS0009");
        bytes.push(OP_EOF);
        bytes.extend_from_slice(&0xDEADBEEFu64.to_le_bytes());
        let events = collect_events(bytes).await.unwrap();
        assert_eq!(
            events[1],
            Event::SnapshotEnded {
                checksum: Some(0xDEADBEEF)
            }
        );
    }

    #[tokio::test]
    async fn test_unsupported_value_type() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"REDIS0009");
        bytes.push(1); // list type, not structurally decoded
        let err = collect_events(bytes).await.unwrap_err();
        assert!(matches!(err, ReplicationError::Decode { .. }));
        assert!(err.to_string().contains("0x01"));
    }

    #[tokio::test]
    async fn test_truncated_snapshot() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"REDIS0009");
        bytes.push(TYPE_STRING);
        bytes.extend_from_slice(&len_str(b"foo"));
        // value missing
        let err = collect_events(bytes).await.unwrap_err();
        assert!(matches!(err, ReplicationError::Decode { .. }));
    }

    fn encode_module_id(name: &str, version: u32) -> u64 {
        let mut chars: u64 = 0;
        for (j, c) in name.bytes().enumerate() {
            let idx = MODULE_NAME_CHARSET.iter().position(|&b| b == c).unwrap() as u64;
            chars |= idx << (54 - 6 * j);
        }
        (chars << 10) | u64::from(version)
    }

    #[test]
    fn test_module_id_roundtrip() {
        let id = encode_module_id("tst-type_", 3);
        assert_eq!(decode_module_id(id), ("tst-type_".to_string(), 3));
    }

    #[tokio::test]
    async fn test_module_record_requires_parser() {
        let id = encode_module_id("tst-type_", 1);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"REDIS0009");
        bytes.push(TYPE_MODULE_2);
        bytes.extend_from_slice(&len_str(b"mkey"));
        // 64-bit length encoding of the module id
        bytes.push(0x81);
        bytes.extend_from_slice(&id.to_be_bytes());
        bytes.push(MODULE_OP_EOF as u8);

        let err = collect_events(bytes).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("tst-type_"));
        assert!(msg.contains("no module parser registered"));
    }

    #[tokio::test]
    async fn test_module_record_with_registered_parser() {
        use crate::module::DefaultModuleParser;

        let id = encode_module_id("tst-type_", 1);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"REDIS0009");
        bytes.push(TYPE_MODULE_2);
        bytes.extend_from_slice(&len_str(b"mkey"));
        bytes.push(0x81);
        bytes.extend_from_slice(&id.to_be_bytes());
        bytes.push(MODULE_OP_UINT as u8);
        bytes.push(7); // 6-bit length encoding of the integer 7
        bytes.push(MODULE_OP_STRING as u8);
        bytes.extend_from_slice(&len_str(b"payload"));
        bytes.push(MODULE_OP_EOF as u8);
        bytes.push(OP_EOF);
        bytes.extend_from_slice(&[0u8; 8]);

        let mut parser = RdbParser::new(Cursor::new(bytes));
        let mut visitor = DefaultRdbVisitor;
        parser.read_header().await.unwrap();
        let mut modules: HashMap<ModuleKey, Arc<dyn ModuleParser>> = HashMap::new();
        modules.insert(
            ("tst-type_".to_string(), 1),
            Arc::new(DefaultModuleParser),
        );
        let config = Configuration::default();
        let event = parser
            .next_record(&mut visitor, &modules, &config)
            .await
            .unwrap()
            .unwrap();
        match event {
            Event::ModuleRecord { key, module, .. } => {
                assert_eq!(key, b"mkey");
                assert_eq!(module.name, "tst-type_");
                assert_eq!(module.version, 1);
                assert_eq!(module.parts, vec![b"7".to_vec(), b"payload".to_vec()]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
