//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SceneeSettings::default()`]
//! 2. If `~/.scenee/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `SCENEE_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{MAX_QUEUE_CAPACITY, SceneeSettings};

/// Resolve the path to the settings file (`~/.scenee/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".scenee").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SceneeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid final value
/// is an error.
pub fn load_settings_from_path(path: &Path) -> Result<SceneeSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Load from `path`, reading overrides through `env`.
fn load_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<SceneeSettings> {
    let defaults = serde_json::to_value(SceneeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SceneeSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `SCENEE_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut SceneeSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `env`.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Anything else is
/// ignored with a warning.
fn apply_overrides(settings: &mut SceneeSettings, env: impl Fn(&str) -> Option<String>) {
    let env: &dyn Fn(&str) -> Option<String> = &env;

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_string(env, "SCENEE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_u64(env, "SCENEE_PORT", 0, u64::from(u16::MAX)) {
        #[allow(clippy::cast_possible_truncation)]
        let port = v as u16;
        settings.server.port = port;
    }

    // ── Realtime ────────────────────────────────────────────────────
    if let Some(v) = read_u64(env, "SCENEE_QUEUE_CAPACITY", 1, MAX_QUEUE_CAPACITY as u64) {
        #[allow(clippy::cast_possible_truncation)]
        let capacity = v as usize;
        settings.realtime.queue_capacity = capacity;
    }
    if let Some(v) = read_u64(env, "SCENEE_HEARTBEAT_INTERVAL_SECS", 1, 3600) {
        settings.realtime.heartbeat_interval_secs = v;
    }
    if let Some(v) = read_u64(env, "SCENEE_IDLE_TIMEOUT_SECS", 0, 86_400) {
        settings.realtime.idle_timeout_secs = v;
    }

    // ── Cache ───────────────────────────────────────────────────────
    if let Some(v) = read_u64(env, "SCENEE_CACHE_TTL_SECS", 1, 86_400) {
        settings.cache.ttl_secs = v;
    }
    if let Some(v) = read_u64(env, "SCENEE_CACHE_SWEEP_SECS", 0, 86_400) {
        settings.cache.sweep_interval_secs = v;
    }
    if let Some(v) = read_bool(env, "SCENEE_CACHE_SINGLE_FLIGHT") {
        settings.cache.single_flight = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_string(env, "SCENEE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_bool(env, "SCENEE_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_string(env: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    env(name).filter(|v| !v.is_empty())
}

fn read_bool(env: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<bool> {
    let val = env(name)?;
    let result = parse_bool(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_u64(env: &dyn Fn(&str) -> Option<String>, name: &str, min: u64, max: u64) -> Option<u64> {
    let val = env(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid numeric env var, ignoring");
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    // ── loading ─────────────────────────────────────────────────────

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_with_env(&dir.path().join("nope.json"), no_env).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.realtime.queue_capacity, 10);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"realtime":{"queueCapacity":25},"cache":{"ttlSecs":5}}"#,
        )
        .unwrap();
        let settings = load_with_env(&path, no_env).unwrap();
        assert_eq!(settings.realtime.queue_capacity, 25);
        assert_eq!(settings.realtime.heartbeat_interval_secs, 30);
        assert_eq!(settings.cache.ttl_secs, 5);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_with_env(&path, no_env),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn invalid_file_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"realtime":{"queueCapacity":0}}"#).unwrap();
        assert!(matches!(
            load_with_env(&path, no_env),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn oversized_file_capacity_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"realtime":{"queueCapacity":100000000}}"#).unwrap();
        assert!(matches!(
            load_with_env(&path, no_env),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server":{"port":9000}}"#).unwrap();
        let env = env_from(&[
            ("SCENEE_PORT", "9100"),
            ("SCENEE_QUEUE_CAPACITY", "64"),
            ("SCENEE_CACHE_SINGLE_FLIGHT", "off"),
            ("SCENEE_LOG_JSON", "yes"),
        ]);
        let settings = load_with_env(&path, env).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.realtime.queue_capacity, 64);
        assert!(!settings.cache.single_flight);
        assert!(settings.logging.json);
    }

    #[test]
    fn out_of_range_env_ignored() {
        let mut settings = SceneeSettings::default();
        let env = env_from(&[
            ("SCENEE_QUEUE_CAPACITY", "0"),
            ("SCENEE_HEARTBEAT_INTERVAL_SECS", "abc"),
            ("SCENEE_PORT", "70000"),
        ]);
        apply_overrides(&mut settings, env);
        assert_eq!(settings.realtime.queue_capacity, 10);
        assert_eq!(settings.realtime.heartbeat_interval_secs, 30);
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn empty_string_env_ignored() {
        let mut settings = SceneeSettings::default();
        apply_overrides(&mut settings, env_from(&[("SCENEE_HOST", "")]));
        assert_eq!(settings.server.host, "127.0.0.1");
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "On"] {
            assert_eq!(parse_bool(v), Some(true));
        }
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false));
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_range_bounds() {
        assert_eq!(parse_u64_range("1", 1, 10), Some(1));
        assert_eq!(parse_u64_range("10", 1, 10), Some(10));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
        assert_eq!(parse_u64_range(" 5 ", 0, 10), Some(5));
    }
}
