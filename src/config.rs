//! Runtime configuration for replication sources.
//!
//! Two configuration shapes exist:
//!
//! - [`Configuration`]: the fully-resolved record an engine runs with.
//!   Constructed once per facade and read-only afterwards.
//! - [`ConfigOverlay`]: the caller-supplied overlay. Every field is
//!   optional; set fields win over values derived from the identifier,
//!   unset fields fall back to them.
//!
//! The base configuration is derived from the source identifier
//! ([`Configuration::from_uri`]): userinfo seeds the credentials, the
//! `rediss://` scheme sets `ssl`, and recognized query parameters
//! (`authUser`, `authPassword`, `verbose`, `ssl`, `readTimeout`,
//! `connectTimeout`, `bufferSize`, `retries`, `retryInterval`) map onto
//! the matching fields. Unrecognized parameters are carried opaquely in
//! `extra` and never validated by this layer.
//!
//! Durations are humantime strings (`"5s"`, `"500ms"`); malformed values
//! fall back to the field default at use time rather than failing.

use crate::error::{ReplicationError, Result};
use crate::uri::RedisUri;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Fully-resolved runtime configuration.
///
/// Shared read-only by the selected engine for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// Read buffer size in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Username for `AUTH` on live sources (Redis 6 ACL style).
    #[serde(default)]
    pub auth_user: Option<String>,

    /// Password for `AUTH` on live sources.
    #[serde(default)]
    pub auth_password: Option<String>,

    /// Whether the transport should use TLS.
    #[serde(default)]
    pub ssl: bool,

    /// Whether raw-byte forwarding is reported as enabled.
    #[serde(default)]
    pub verbose: bool,

    /// Socket read timeout as a duration string (e.g. "30s").
    #[serde(default = "default_read_timeout")]
    pub read_timeout: String,

    /// Connection timeout as a duration string (e.g. "10s").
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    /// Maximum connection attempts for live sources.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Initial delay between connection attempts as a duration string.
    /// Doubles per attempt, capped at 30s.
    #[serde(default = "default_retry_interval")]
    pub retry_interval: String,

    /// Unrecognized options, passed through opaquely.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

fn default_buffer_size() -> usize {
    8 * 1024
}

fn default_read_timeout() -> String {
    "30s".to_string()
}

fn default_connect_timeout() -> String {
    "10s".to_string()
}

fn default_retries() -> u32 {
    5
}

fn default_retry_interval() -> String {
    "1s".to_string()
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            auth_user: None,
            auth_password: None,
            ssl: false,
            verbose: false,
            read_timeout: default_read_timeout(),
            connect_timeout: default_connect_timeout(),
            retries: default_retries(),
            retry_interval: default_retry_interval(),
            extra: HashMap::new(),
        }
    }
}

impl Configuration {
    /// Derive the base configuration from a resolved identifier.
    ///
    /// Fails with [`ReplicationError::MalformedUri`] when a recognized
    /// parameter carries an unparseable value.
    pub fn from_uri(uri: &RedisUri) -> Result<Self> {
        let mut config = Self {
            ssl: uri.ssl(),
            auth_user: uri.user().map(str::to_string),
            auth_password: uri.password().map(str::to_string),
            ..Self::default()
        };
        for (key, value) in uri.params() {
            match key.as_str() {
                "type" => {} // consumed by the resolver
                "authUser" => config.auth_user = Some(value.clone()),
                "authPassword" => config.auth_password = Some(value.clone()),
                "verbose" => config.verbose = parse_bool(uri, key, value)?,
                "ssl" => config.ssl = parse_bool(uri, key, value)?,
                "readTimeout" => config.read_timeout = value.clone(),
                "connectTimeout" => config.connect_timeout = value.clone(),
                "retryInterval" => config.retry_interval = value.clone(),
                "bufferSize" => {
                    config.buffer_size = value.parse().map_err(|_| {
                        ReplicationError::malformed(
                            uri.as_str(),
                            format!("invalid bufferSize {value:?}"),
                        )
                    })?
                }
                "retries" => {
                    config.retries = value.parse().map_err(|_| {
                        ReplicationError::malformed(
                            uri.as_str(),
                            format!("invalid retries {value:?}"),
                        )
                    })?
                }
                _ => {
                    config.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(config)
    }

    /// Parse `read_timeout`, falling back to the default on bad input.
    pub fn read_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.read_timeout).unwrap_or(Duration::from_secs(30))
    }

    /// Parse `connect_timeout`, falling back to the default on bad input.
    pub fn connect_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.connect_timeout).unwrap_or(Duration::from_secs(10))
    }

    /// Parse `retry_interval`, falling back to the default on bad input.
    pub fn retry_interval_duration(&self) -> Duration {
        humantime::parse_duration(&self.retry_interval).unwrap_or(Duration::from_secs(1))
    }

    /// Backoff delay before the given (zero-based) retry attempt.
    /// Doubles per attempt, capped at 30 seconds.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.retry_interval_duration();
        let delay = base.saturating_mul(2u32.saturating_pow(attempt));
        delay.min(Duration::from_secs(30))
    }
}

/// Caller-supplied configuration overlay.
///
/// Every field mirrors one on [`Configuration`], wrapped in `Option`.
/// Set fields take precedence over the identifier-derived base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigOverlay {
    #[serde(default)]
    pub buffer_size: Option<usize>,
    #[serde(default)]
    pub auth_user: Option<String>,
    #[serde(default)]
    pub auth_password: Option<String>,
    #[serde(default)]
    pub ssl: Option<bool>,
    #[serde(default)]
    pub verbose: Option<bool>,
    #[serde(default)]
    pub read_timeout: Option<String>,
    #[serde(default)]
    pub connect_timeout: Option<String>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub retry_interval: Option<String>,
    /// Unrecognized options; merged over the base's `extra` map.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl ConfigOverlay {
    /// Merge this overlay onto a base configuration, field by field.
    ///
    /// Overlay values win; unset overlay fields keep the base values.
    pub fn merge(&self, base: Configuration) -> Configuration {
        let mut merged = base;
        if let Some(v) = self.buffer_size {
            merged.buffer_size = v;
        }
        if let Some(v) = &self.auth_user {
            merged.auth_user = Some(v.clone());
        }
        if let Some(v) = &self.auth_password {
            merged.auth_password = Some(v.clone());
        }
        if let Some(v) = self.ssl {
            merged.ssl = v;
        }
        if let Some(v) = self.verbose {
            merged.verbose = v;
        }
        if let Some(v) = &self.read_timeout {
            merged.read_timeout = v.clone();
        }
        if let Some(v) = &self.connect_timeout {
            merged.connect_timeout = v.clone();
        }
        if let Some(v) = self.retries {
            merged.retries = v;
        }
        if let Some(v) = &self.retry_interval {
            merged.retry_interval = v.clone();
        }
        for (k, v) in &self.extra {
            merged.extra.insert(k.clone(), v.clone());
        }
        merged
    }
}

fn parse_bool(uri: &RedisUri, key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ReplicationError::malformed(
            uri.as_str(),
            format!("invalid boolean {value:?} for {key}"),
        )),
    }
}
