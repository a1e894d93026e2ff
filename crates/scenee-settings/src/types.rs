//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "realtime": { "queueCapacity": 32 },
///   "cache": { "ttlSecs": 120 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneeSettings {
    /// HTTP listener.
    pub server: ServerSettings,
    /// Session registry and delivery loop.
    pub realtime: RealtimeSettings,
    /// Feed response cache.
    pub cache: CacheSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Largest accepted `realtime.queueCapacity`.
pub const MAX_QUEUE_CAPACITY: usize = 10_000;

impl SceneeSettings {
    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_QUEUE_CAPACITY).contains(&self.realtime.queue_capacity) {
            return Err(SettingsError::InvalidValue(format!(
                "realtime.queueCapacity must be between 1 and {MAX_QUEUE_CAPACITY}, got {}",
                self.realtime.queue_capacity
            )));
        }
        if self.realtime.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "realtime.heartbeatIntervalSecs must be at least 1".into(),
            ));
        }
        if self.cache.ttl_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "cache.ttlSecs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` auto-assigns).
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

/// Per-session delivery settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// Outbound queue capacity per session. Events beyond it are dropped.
    pub queue_capacity: usize,
    /// Seconds between heartbeat frames.
    pub heartbeat_interval_secs: u64,
    /// Close a session after this many seconds without a published event.
    /// `0` disables the idle timeout.
    pub idle_timeout_secs: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            heartbeat_interval_secs: 30,
            idle_timeout_secs: 0,
        }
    }
}

impl RealtimeSettings {
    /// Heartbeat period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Idle timeout, `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

/// Feed cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// Entry time-to-live in seconds.
    pub ttl_secs: u64,
    /// Seconds between background sweeps of expired entries. `0` disables
    /// the sweeper and relies on lazy removal at read time.
    pub sweep_interval_secs: u64,
    /// Collapse concurrent misses for one key into a single upstream fetch.
    pub single_flight: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            sweep_interval_secs: 0,
            single_flight: true,
        }
    }
}

impl CacheSettings {
    /// Entry time-to-live.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Sweep period, `None` when disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit one JSON object per line instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
