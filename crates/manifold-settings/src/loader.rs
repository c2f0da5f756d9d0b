//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ManifoldSettings::default()`]
//! 2. If `~/.manifold/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{ManifoldSettings, RemoteSourceSettings, UpdatePolicy};

/// Resolve the user's home directory, falling back to `/tmp`.
fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

/// Expand a leading `~` to `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return home_dir();
    }
    match path.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None => PathBuf::from(path),
    }
}

/// Resolve the path to the settings file (`~/.manifold/settings.json`).
pub fn settings_path() -> PathBuf {
    home_dir().join(".manifold").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ManifoldSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or invalid values are errors.
pub fn load_settings_from_path(path: &Path) -> Result<ManifoldSettings> {
    let defaults = serde_json::to_value(ManifoldSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ManifoldSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut ManifoldSettings) {
    if let Some(v) = read_env_string("MANIFOLD_PROJECT_DIR") {
        settings.sources.project_dir = Some(v);
    }
    if let Some(v) = read_env_string("MANIFOLD_USER_DIR") {
        settings.sources.user_dir = Some(v);
    }
    if let Some(v) = read_env_string("MANIFOLD_REMOTES") {
        settings.sources.remotes = parse_remote_list(&v);
    }
    if let Some(v) = read_env_string("MANIFOLD_CACHE_DIR") {
        settings.cache.dir = v;
    }
    if let Some(v) = read_env_string("MANIFOLD_UPDATE_POLICY") {
        match parse_update_policy(&v) {
            Some(policy) => settings.cache.update_policy = policy,
            None => warn!(key = "MANIFOLD_UPDATE_POLICY", value = %v, "invalid update policy, ignoring"),
        }
    }
    if let Some(v) = read_env_string("MANIFOLD_DEFAULT_AGENT") {
        settings.lookup.default_agent = Some(v);
    }
    if let Some(v) = read_env_bool("MANIFOLD_JUDGE_ENABLED") {
        settings.ranking.judge.enabled = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an update policy name (`autoUpdate`/`auto`, `cacheFirst`/`cache`).
pub fn parse_update_policy(val: &str) -> Option<UpdatePolicy> {
    match val.to_lowercase().replace(['-', '_'], "").as_str() {
        "autoupdate" | "auto" => Some(UpdatePolicy::AutoUpdate),
        "cachefirst" | "cache" | "offline" => Some(UpdatePolicy::CacheFirst),
        _ => None,
    }
}

/// Parse a comma-separated remote list. Blank items are dropped.
pub fn parse_remote_list(val: &str) -> Vec<RemoteSourceSettings> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|locator| RemoteSourceSettings {
            locator: locator.to_string(),
            priority: None,
        })
        .collect()
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
