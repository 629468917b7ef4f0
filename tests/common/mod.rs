//! Shared helpers for integration tests.
//!
//! Fleet tests run over `ChannelTransport`, so every test owns a private
//! endpoint registry and the well-known ports never collide.

#![allow(dead_code)]

use factorfleet::config::FleetConfig;
use rug::Integer;

/// Defaults with timing shrunk for tests: fast retries, short drain, no
/// progress reporter.
pub fn fast_config() -> FleetConfig {
    let mut config = FleetConfig::default();
    config.network.retry_backoff_ms = 10;
    config.network.ready_poll_ms = 10;
    config.network.ready_poll_attempts = 200;
    config.network.drain_grace_ms = 200;
    config.network.progress_interval_secs = 0;
    config
}

/// 6563 * 9311.
pub fn scenario() -> Integer {
    Integer::from(6563u32) * Integer::from(9311u32)
}

pub fn product(values: &[u64]) -> Integer {
    values.iter().fold(Integer::from(1u32), |acc, v| acc * *v)
}
