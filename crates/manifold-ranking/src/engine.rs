//! Heuristic ranking of ambiguous candidates.
//!
//! Score = weighted mean of four signals, each normalized to `0.0..=1.0`:
//!
//! | Signal | Value |
//! |--------|-------|
//! | recency | `exp(-hours_since_last_access / decay_hours)`, 0 if never accessed |
//! | frequency | `ln(1 + count) / ln(1 + max_count)` over the candidate set |
//! | priority | declared priority / 100, 0 if undeclared |
//! | boost | configured multiplier / largest multiplier in the set |
//!
//! Equal scores fall back to lexical `(module, name)` order.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use manifold_core::CatalogEntry;
use manifold_settings::{RankingSettings, RankingWeights};
use serde::Serialize;

use crate::tracker::UsageTracker;

/// Multiplier applied when no boost matches.
pub const NEUTRAL_BOOST: f64 = 1.0;

/// Normalized signal values for one candidate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signals {
    /// Recency of the last access.
    pub recency: f64,
    /// Access frequency relative to the set.
    pub frequency: f64,
    /// Declared priority.
    pub priority: f64,
    /// Operator boost relative to the set.
    pub boost: f64,
}

impl Signals {
    /// Weighted mean under `weights`.
    pub fn weighted(&self, weights: &RankingWeights) -> f64 {
        let total = weights.total();
        if total <= 0.0 {
            return 0.0;
        }
        (weights.recency * self.recency
            + weights.frequency * self.frequency
            + weights.priority * self.priority
            + weights.boost * self.boost)
            / total
    }
}

/// A candidate with its score. Ranking only reorders entries.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCandidate {
    /// The untouched catalog entry.
    pub entry: CatalogEntry,
    /// Final score used for ordering (higher first).
    pub score: f64,
    /// Heuristic signals behind the score.
    pub signals: Signals,
}

/// Orders ambiguous candidates. Never fails.
#[async_trait]
pub trait RankingStrategy: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Order `candidates`, best first. The output holds exactly the input entries.
    async fn rank(&self, candidates: Vec<CatalogEntry>, query: Option<&str>) -> Vec<RankedCandidate>;
}

/// Composite-score ranker over usage and declared metadata.
#[derive(Clone, Debug)]
pub struct HeuristicRanker {
    weights: RankingWeights,
    decay_hours: f64,
    boosts: HashMap<String, f64>,
    tracker: Arc<UsageTracker>,
}

impl HeuristicRanker {
    /// Ranker reading usage from `tracker`.
    pub fn new(settings: &RankingSettings, tracker: Arc<UsageTracker>) -> Self {
        Self {
            weights: settings.weights,
            decay_hours: settings.recency_decay_hours,
            boosts: settings.boosts.clone(),
            tracker,
        }
    }

    /// Shared usage tracker.
    pub fn tracker(&self) -> &Arc<UsageTracker> {
        &self.tracker
    }

    /// Configured weights.
    pub fn weights(&self) -> &RankingWeights {
        &self.weights
    }

    /// Configured multiplier for `entry`: `module:name`, then `module:*`, then `name`.
    pub fn boost_for(&self, entry: &CatalogEntry) -> f64 {
        let module = entry.module.as_deref().unwrap_or_default();
        [
            format!("{module}:{}", entry.name),
            format!("{module}:*"),
            entry.name.clone(),
        ]
        .iter()
        .find_map(|k| self.boosts.get(k))
        .copied()
        .filter(|b| b.is_finite() && *b >= 0.0)
        .unwrap_or(NEUTRAL_BOOST)
    }

    /// Rank at a fixed `now`.
    pub fn rank_at(&self, candidates: Vec<CatalogEntry>, now: DateTime<Utc>) -> Vec<RankedCandidate> {
        let signals = self.signals_at(&candidates, now);
        let mut ranked: Vec<RankedCandidate> = candidates
            .into_iter()
            .zip(signals)
            .map(|(entry, signals)| RankedCandidate {
                score: signals.weighted(&self.weights),
                entry,
                signals,
            })
            .collect();
        sort_ranked(&mut ranked);
        ranked
    }

    /// Signals for each candidate, in input order.
    pub fn signals_at(&self, candidates: &[CatalogEntry], now: DateTime<Utc>) -> Vec<Signals> {
        let records: Vec<_> = candidates
            .iter()
            .map(|c| self.tracker.record(&c.key()))
            .collect();
        let max_count = records
            .iter()
            .map(|r| r.as_ref().map_or(0, |r| r.count))
            .max()
            .unwrap_or(0);
        let boosts: Vec<f64> = candidates.iter().map(|c| self.boost_for(c)).collect();
        let max_boost = boosts.iter().copied().fold(0.0_f64, f64::max);

        candidates
            .iter()
            .zip(records)
            .zip(boosts)
            .map(|((entry, record), boost)| {
                let recency = record
                    .as_ref()
                    .and_then(|r| r.last_access())
                    .map_or(0.0, |last| recency_score(now, last, self.decay_hours));
                let frequency = frequency_score(record.map_or(0, |r| r.count), max_count);
                let priority = entry
                    .metadata
                    .priority
                    .map_or(0.0, |p| f64::from(p.min(100)) / 100.0);
                let boost = if max_boost > 0.0 { boost / max_boost } else { 0.0 };
                Signals {
                    recency,
                    frequency,
                    priority,
                    boost,
                }
            })
            .collect()
    }
}

#[async_trait]
impl RankingStrategy for HeuristicRanker {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn rank(&self, candidates: Vec<CatalogEntry>, _query: Option<&str>) -> Vec<RankedCandidate> {
        self.rank_at(candidates, Utc::now())
    }
}

/// `exp(-Δt / τ)` with Δt and τ in hours. Future timestamps count as now.
pub fn recency_score(now: DateTime<Utc>, last: DateTime<Utc>, decay_hours: f64) -> f64 {
    let elapsed_ms = now.signed_duration_since(last).num_milliseconds().max(0);
    let hours = elapsed_ms as f64 / 3_600_000.0;
    (-hours / decay_hours).exp()
}

/// `ln(1 + count) / ln(1 + max)`, 0 when nothing in the set was accessed.
pub fn frequency_score(count: u64, max_count: u64) -> f64 {
    if max_count == 0 {
        return 0.0;
    }
    (count as f64).ln_1p() / (max_count as f64).ln_1p()
}

/// Highest score first; equal scores in lexical `(module, name)` order.
pub fn sort_ranked(ranked: &mut [RankedCandidate]) {
    ranked.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.entry.key().cmp(&b.entry.key()),
        other => other,
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use manifold_core::{EntryKind, EntryMetadata, SourceKind};
    use std::path::PathBuf;

    pub(crate) fn candidate(module: &str, name: &str) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            module: Some(module.to_string()),
            kind: EntryKind::Agent,
            metadata: EntryMetadata::default(),
            path: PathBuf::from(format!("/src/{module}/agents/{name}.md")),
            source_root: PathBuf::from("/src"),
            source_kind: SourceKind::Project,
            priority: 1,
            additional_files: Vec::new(),
            customization: None,
        }
    }

    fn ranker(settings: &RankingSettings) -> HeuristicRanker {
        HeuristicRanker::new(settings, Arc::new(UsageTracker::new()))
    }

    fn modules(ranked: &[RankedCandidate]) -> Vec<String> {
        ranked
            .iter()
            .map(|r| r.entry.module.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn recency_decays() {
        let now = Utc::now();
        assert!((recency_score(now, now, 4.0) - 1.0).abs() < 1e-9);
        let four_hours = recency_score(now, now - Duration::hours(4), 4.0);
        assert!((four_hours - (-1.0_f64).exp()).abs() < 1e-6);
        assert!(recency_score(now, now - Duration::hours(24), 4.0) < 0.01);
        assert!((recency_score(now, now + Duration::hours(1), 4.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn frequency_is_logarithmic() {
        assert!(frequency_score(0, 0).abs() < f64::EPSILON);
        assert!((frequency_score(10, 10) - 1.0).abs() < 1e-9);
        let half = frequency_score(3, 15);
        assert!((half - 0.5).abs() < 1e-9);
    }

    #[test]
    fn untouched_candidates_tie_lexically() {
        let r = ranker(&RankingSettings::default());
        let ranked = r.rank_at(
            vec![candidate("cis", "analyst"), candidate("bmm", "analyst"), candidate("core", "analyst")],
            Utc::now(),
        );
        assert_eq!(modules(&ranked), vec!["bmm", "cis", "core"]);
    }

    #[test]
    fn recent_access_ranks_first() {
        let r = ranker(&RankingSettings::default());
        let now = Utc::now();
        let bmm = candidate("bmm", "analyst");
        let cis = candidate("cis", "analyst");
        r.tracker().record_access_at(&cis.key(), now - Duration::minutes(5));

        let ranked = r.rank_at(vec![bmm, cis], now);
        assert_eq!(modules(&ranked), vec!["cis", "bmm"]);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn recent_beats_old_frequent() {
        let r = ranker(&RankingSettings::default());
        let now = Utc::now();
        let old = candidate("bmm", "analyst");
        let fresh = candidate("cis", "analyst");
        for _ in 0..5 {
            r.tracker().record_access_at(&old.key(), now - Duration::hours(30));
        }
        r.tracker().record_access_at(&fresh.key(), now);

        let ranked = r.rank_at(vec![old, fresh], now);
        assert_eq!(modules(&ranked), vec!["cis", "bmm"]);
    }

    #[test]
    fn declared_priority_counts() {
        let r = ranker(&RankingSettings::default());
        let low = candidate("bmm", "pm");
        let mut high = candidate("zzz", "pm");
        high.metadata.priority = Some(90);
        let ranked = r.rank_at(vec![low, high], Utc::now());
        assert_eq!(modules(&ranked), vec!["zzz", "bmm"]);
        assert!((ranked[0].signals.priority - 0.9).abs() < 1e-9);
    }

    #[test]
    fn boost_lookup_precedence() {
        let mut settings = RankingSettings::default();
        let _ = settings.boosts.insert("bmm:analyst".into(), 3.0);
        let _ = settings.boosts.insert("bmm:*".into(), 2.0);
        let _ = settings.boosts.insert("pm".into(), 1.5);
        let r = ranker(&settings);
        assert!((r.boost_for(&candidate("bmm", "analyst")) - 3.0).abs() < 1e-9);
        assert!((r.boost_for(&candidate("bmm", "dev")) - 2.0).abs() < 1e-9);
        assert!((r.boost_for(&candidate("cis", "pm")) - 1.5).abs() < 1e-9);
        assert!((r.boost_for(&candidate("cis", "dev")) - NEUTRAL_BOOST).abs() < 1e-9);
    }

    #[test]
    fn boost_breaks_otherwise_equal_candidates() {
        let mut settings = RankingSettings::default();
        let _ = settings.boosts.insert("cis:*".into(), 2.0);
        let r = ranker(&settings);
        let ranked = r.rank_at(vec![candidate("bmm", "x"), candidate("cis", "x")], Utc::now());
        assert_eq!(modules(&ranked), vec!["cis", "bmm"]);
    }

    #[test]
    fn ranking_preserves_the_candidate_set() {
        let r = ranker(&RankingSettings::default());
        let input = vec![candidate("a", "n"), candidate("b", "n"), candidate("c", "n")];
        r.tracker().record_access(&input[2].key());
        let ranked = r.rank_at(input.clone(), Utc::now());
        let mut out: Vec<CatalogEntry> = ranked.into_iter().map(|r| r.entry).collect();
        out.sort_by_key(CatalogEntry::key);
        assert_eq!(out, input);
    }
}
