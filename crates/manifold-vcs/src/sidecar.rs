//! Per-checkout sync record (`sync.json`) and cache entry inspection.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Result, VcsError};

/// Sidecar file name inside a cache entry directory.
pub const SYNC_FILE: &str = "sync.json";

/// Checkout directory name inside a cache entry directory.
pub const CHECKOUT_DIR: &str = "checkout";

/// Last successful synchronization of a checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// Canonical locator the checkout was made from.
    pub locator: String,
    /// Requested ref.
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Commit checked out at sync time, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// When the checkout last matched the remote.
    pub last_sync: DateTime<Utc>,
}

impl SyncRecord {
    /// Read the record in `entry_dir`. Missing or corrupt files yield `None`.
    pub fn read(entry_dir: &Path) -> Option<Self> {
        let path = entry_dir.join(SYNC_FILE);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "ignoring unreadable sync record");
                None
            }
        }
    }

    /// Write the record atomically (temp file, then rename).
    pub fn write(&self, entry_dir: &Path) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(entry_dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.flush()?;
        let _ = tmp.persist(entry_dir.join(SYNC_FILE)).map_err(|e| e.error)?;
        Ok(())
    }

    /// [`Self::read`] on the blocking pool.
    pub async fn load(entry_dir: PathBuf) -> Option<Self> {
        tokio::task::spawn_blocking(move || Self::read(&entry_dir))
            .await
            .ok()
            .flatten()
    }

    /// [`Self::write`] on the blocking pool.
    pub async fn store(self, entry_dir: PathBuf) -> Result<()> {
        tokio::task::spawn_blocking(move || self.write(&entry_dir))
            .await
            .map_err(|e| VcsError::TaskAborted(e.to_string()))?
    }

    /// Whether the last sync happened within `window` of `now`.
    pub fn is_fresh(&self, window: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_sync) < window
    }
}

/// Observable state of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// No checkout on disk.
    Absent,
    /// A checkout exists but carries no readable sync record.
    Cloned,
    /// Synced within the freshness window.
    Fresh,
    /// Synced, but longer ago than the freshness window.
    Stale,
}

/// On-disk view of one cache key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Cache key.
    pub key: String,
    /// Entry directory (`<cache>/<org>-<repo>-<key>`).
    pub dir: PathBuf,
    /// Checkout directory.
    pub checkout: PathBuf,
    /// Last sync time, if recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    /// Commit recorded at last sync.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Derived state.
    pub state: CacheState,
}

impl CacheEntry {
    /// Inspect `dir` for `key` without touching the network.
    pub fn inspect(key: String, dir: PathBuf, fresh_for: Duration, now: DateTime<Utc>) -> Self {
        let checkout = dir.join(CHECKOUT_DIR);
        let record = SyncRecord::read(&dir);
        let state = if !checkout.is_dir() {
            CacheState::Absent
        } else {
            match &record {
                None => CacheState::Cloned,
                Some(r) if r.is_fresh(fresh_for, now) => CacheState::Fresh,
                Some(_) => CacheState::Stale,
            }
        };
        Self {
            key,
            dir,
            checkout,
            last_sync: record.as_ref().map(|r| r.last_sync),
            commit: record.and_then(|r| r.commit),
            state,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(last_sync: DateTime<Utc>) -> SyncRecord {
        SyncRecord {
            locator: "github.com/org/repo#main".into(),
            git_ref: "main".into(),
            commit: Some("abc123".into()),
            last_sync,
        }
    }

    #[test]
    fn write_then_read() {
        let tmp = TempDir::new().unwrap();
        let rec = record(Utc::now());
        rec.write(tmp.path()).unwrap();
        assert_eq!(SyncRecord::read(tmp.path()), Some(rec));

        let raw = std::fs::read_to_string(tmp.path().join(SYNC_FILE)).unwrap();
        assert!(raw.contains("\"ref\""));
        assert!(raw.contains("\"lastSync\""));
    }

    #[tokio::test]
    async fn store_then_load_off_runtime() {
        let tmp = TempDir::new().unwrap();
        let rec = record(Utc::now());
        rec.clone().store(tmp.path().to_path_buf()).await.unwrap();
        assert_eq!(SyncRecord::load(tmp.path().to_path_buf()).await, Some(rec));
        assert_eq!(SyncRecord::load(tmp.path().join("missing")).await, None);
    }

    #[test]
    fn corrupt_record_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(SYNC_FILE), "{broken").unwrap();
        assert_eq!(SyncRecord::read(tmp.path()), None);
    }

    #[test]
    fn inspect_states() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("org-repo-k");
        let now = Utc::now();
        let window = Duration::seconds(300);

        let entry = CacheEntry::inspect("k".into(), dir.clone(), window, now);
        assert_eq!(entry.state, CacheState::Absent);

        std::fs::create_dir_all(dir.join(CHECKOUT_DIR)).unwrap();
        let entry = CacheEntry::inspect("k".into(), dir.clone(), window, now);
        assert_eq!(entry.state, CacheState::Cloned);

        record(now - Duration::seconds(10)).write(&dir).unwrap();
        let entry = CacheEntry::inspect("k".into(), dir.clone(), window, now);
        assert_eq!(entry.state, CacheState::Fresh);
        assert_eq!(entry.commit.as_deref(), Some("abc123"));

        record(now - Duration::hours(2)).write(&dir).unwrap();
        let entry = CacheEntry::inspect("k".into(), dir, window, now);
        assert_eq!(entry.state, CacheState::Stale);
    }
}
