//! Engine Configuration
//!
//! `EngineConfig` carries the timing and capacity knobs of the hierarchy
//! engine. Defaults suit an interactive editor; `from_env()` lets a host
//! process override them without code changes.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Environment variable overriding `store_timeout_ms`
pub const STORE_TIMEOUT_ENV: &str = "NODESPACE_STORE_TIMEOUT_MS";

/// Environment variable overriding `read_retries`
pub const READ_RETRIES_ENV: &str = "NODESPACE_READ_RETRIES";

/// Environment variable overriding `content_debounce_ms`
pub const CONTENT_DEBOUNCE_ENV: &str = "NODESPACE_CONTENT_DEBOUNCE_MS";

/// Configuration for the operation engine and its collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for any single persistence call
    pub store_timeout_ms: u64,

    /// Retries for idempotent bulk reads (0 = single attempt)
    pub read_retries: u32,

    /// Base backoff between read retries, doubled per attempt
    pub read_backoff_ms: u64,

    /// Quiet period before a coalesced content write is flushed
    pub content_debounce_ms: u64,

    /// Broadcast channel capacity for domain events
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: 2_000,
            read_retries: 3,
            read_backoff_ms: 10,
            content_debounce_ms: 300,
            event_channel_capacity: 128,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by any `NODESPACE_*` variables that parse
    ///
    /// Unparseable values are ignored with a warning rather than failing startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = read_env(STORE_TIMEOUT_ENV) {
            config.store_timeout_ms = ms;
        }
        if let Some(retries) = read_env(READ_RETRIES_ENV) {
            config.read_retries = retries;
        }
        if let Some(ms) = read_env(CONTENT_DEBOUNCE_ENV) {
            config.content_debounce_ms = ms;
        }
        config
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn content_debounce(&self) -> Duration {
        Duration::from_millis(self.content_debounce_ms)
    }

    /// Backoff before retry number `attempt` (0-based): 10ms, 20ms, 40ms, ...
    pub fn read_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.read_backoff_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

fn read_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}
