//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics through the `metrics` facade:
//! - Decoded events and parsed commands per engine
//! - Commands skipped for lack of a registered parser
//! - Live-source connection attempts and handshake latency
//!
//! All metrics are prefixed with `replisource_`; counters end in `_total`.
//! Engine labels are `rdb`, `aof`, `mix` and `socket`.

use metrics::{counter, histogram};
use std::time::Duration;

/// Record decoded high-level events.
pub fn record_events(engine: &'static str, count: u64) {
    counter!("replisource_events_total", "engine" => engine).increment(count);
}

/// Record one parsed command.
pub fn record_command_parsed(engine: &'static str) {
    counter!("replisource_commands_parsed_total", "engine" => engine).increment(1);
}

/// Record one command skipped because no parser was registered for it.
pub fn record_command_skipped(engine: &'static str) {
    counter!("replisource_commands_skipped_total", "engine" => engine).increment(1);
}

/// Record a live-source connection attempt.
pub fn record_connect(host: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("replisource_connects_total", "host" => host.to_string(), "status" => status)
        .increment(1);
}

/// Record replication handshake latency.
pub fn record_handshake_latency(latency: Duration) {
    histogram!("replisource_handshake_duration_seconds").record(latency.as_secs_f64());
}

/// Record completion of a snapshot decode.
pub fn record_snapshot_loaded(engine: &'static str) {
    counter!("replisource_snapshots_loaded_total", "engine" => engine).increment(1);
}
