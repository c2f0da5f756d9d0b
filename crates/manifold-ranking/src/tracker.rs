//! Process-wide usage tracker.
//!
//! Records when catalog entries are loaded. Counters only grow; the
//! ranking engine reads them, nothing else does. Safe to share across
//! tasks behind an [`Arc`](std::sync::Arc).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use manifold_core::EntryKey;
use serde::{Deserialize, Serialize};

/// Access timestamps kept per entry. The count keeps growing past it.
pub const MAX_TIMESTAMPS: usize = 32;

/// Usage of one entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Entry the record belongs to.
    pub key: EntryKey,
    /// Total number of accesses.
    pub count: u64,
    /// Most recent accesses, oldest first.
    pub accesses: Vec<DateTime<Utc>>,
}

impl UsageRecord {
    fn new(key: EntryKey) -> Self {
        Self {
            key,
            count: 0,
            accesses: Vec::new(),
        }
    }

    /// Time of the latest access.
    pub fn last_access(&self) -> Option<DateTime<Utc>> {
        self.accesses.iter().max().copied()
    }

    fn push(&mut self, at: DateTime<Utc>) {
        self.count = self.count.saturating_add(1);
        self.accesses.push(at);
        self.accesses.sort_unstable();
        if self.accesses.len() > MAX_TIMESTAMPS {
            let excess = self.accesses.len() - MAX_TIMESTAMPS;
            let _ = self.accesses.drain(..excess);
        }
    }
}

/// Concurrent per-entry access counters.
#[derive(Debug, Default)]
pub struct UsageTracker {
    records: DashMap<EntryKey, UsageRecord>,
}

impl UsageTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an access to `key` now.
    pub fn record_access(&self, key: &EntryKey) {
        self.record_access_at(key, Utc::now());
    }

    /// Record an access to `key` at `at`.
    pub fn record_access_at(&self, key: &EntryKey, at: DateTime<Utc>) {
        self.records
            .entry(key.clone())
            .or_insert_with(|| UsageRecord::new(key.clone()))
            .push(at);
    }

    /// Copy of the record for `key`.
    pub fn record(&self, key: &EntryKey) -> Option<UsageRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    /// Access count for `key` (0 if never accessed).
    pub fn count(&self, key: &EntryKey) -> u64 {
        self.records.get(key).map_or(0, |r| r.count)
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, sorted by key, for a collaborator to persist.
    pub fn snapshot(&self) -> Vec<UsageRecord> {
        let mut records: Vec<UsageRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    /// Merge previously persisted records into the tracker.
    ///
    /// Counts add up and timestamps are combined, so restoring never loses
    /// accesses recorded in this process.
    pub fn restore(&self, records: impl IntoIterator<Item = UsageRecord>) {
        for incoming in records {
            let mut current = self
                .records
                .entry(incoming.key.clone())
                .or_insert_with(|| UsageRecord::new(incoming.key.clone()));
            current.count = current.count.saturating_add(incoming.count);
            current.accesses.extend(incoming.accesses);
            current.accesses.sort_unstable();
            current.accesses.dedup();
            if current.accesses.len() > MAX_TIMESTAMPS {
                let excess = current.accesses.len() - MAX_TIMESTAMPS;
                let _ = current.accesses.drain(..excess);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
