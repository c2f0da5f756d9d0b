//! Judge-assisted ranking.
//!
//! An external judge (typically a language model behind the transport)
//! sees only compact [`CandidateSummary`] values plus the caller's query
//! and answers with a preferred order of candidate ids. The judge-assisted
//! strategy always computes the heuristic order first and returns it
//! unchanged whenever the judge is missing, slow, or wrong.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use manifold_core::CatalogEntry;
use manifold_settings::{JudgeMode, JudgeSettings, RankingSettings};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{HeuristicRanker, RankedCandidate, RankingStrategy, sort_ranked};
use crate::errors::JudgeError;
use crate::tracker::UsageTracker;

/// What the judge sees of one candidate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSummary {
    /// Stable id to answer with (`agent:bmm/analyst`).
    pub id: String,
    /// Qualified name (`bmm/analyst`).
    pub name: String,
    /// One-line description, truncated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CandidateSummary {
    /// Summary of `entry` with the description cut to `max_chars` characters.
    pub fn from_entry(entry: &CatalogEntry, max_chars: usize) -> Self {
        Self {
            id: entry.key().to_string(),
            name: entry.qualified_name(),
            description: entry.summary().map(|d| truncate_chars(first_line(d), max_chars)),
        }
    }
}

/// External ordering capability.
#[async_trait]
pub trait CandidateJudge: Send + Sync {
    /// Candidate ids in preferred order. May omit ids; omitted candidates
    /// keep their heuristic order after the listed ones.
    async fn order(&self, query: &str, candidates: &[CandidateSummary]) -> Result<Vec<String>, JudgeError>;
}

/// Ranking strategy that consults a judge and falls back to the heuristic.
pub struct JudgeAssistedRanker {
    heuristic: HeuristicRanker,
    judge: Arc<dyn CandidateJudge>,
    settings: JudgeSettings,
}

impl JudgeAssistedRanker {
    /// Wrap `heuristic` with `judge`.
    pub fn new(heuristic: HeuristicRanker, judge: Arc<dyn CandidateJudge>, settings: JudgeSettings) -> Self {
        Self {
            heuristic,
            judge,
            settings,
        }
    }

    async fn consult(&self, query: &str, ranked: &[RankedCandidate]) -> Result<Vec<usize>, JudgeError> {
        let summaries: Vec<CandidateSummary> = ranked
            .iter()
            .map(|r| CandidateSummary::from_entry(&r.entry, self.settings.max_description_chars))
            .collect();

        let limit = Duration::from_millis(self.settings.timeout_ms);
        let ids = tokio::time::timeout(limit, self.judge.order(query, &summaries))
            .await
            .map_err(|_| JudgeError::Timeout(self.settings.timeout_ms))??;

        positions(&summaries, &ids)
    }

    fn apply(&self, mut ranked: Vec<RankedCandidate>, judged: &[usize]) -> Vec<RankedCandidate> {
        let n = ranked.len();
        match self.settings.mode {
            JudgeMode::Replace => {
                let mut order: Vec<usize> = judged.to_vec();
                order.extend((0..n).filter(|i| !judged.contains(i)));
                let mut slots: Vec<Option<RankedCandidate>> = ranked.into_iter().map(Some).collect();
                order.into_iter().filter_map(|i| slots[i].take()).collect()
            }
            JudgeMode::Blend => {
                let w = self.settings.blend_weight;
                let denom = n.saturating_sub(1).max(1) as f64;
                for (pos, &index) in judged.iter().enumerate() {
                    let judge_score = 1.0 - pos as f64 / denom;
                    let candidate = &mut ranked[index];
                    candidate.score = (1.0 - w) * candidate.score + w * judge_score;
                }
                for (index, candidate) in ranked.iter_mut().enumerate() {
                    if !judged.contains(&index) {
                        candidate.score *= 1.0 - w;
                    }
                }
                sort_ranked(&mut ranked);
                ranked
            }
        }
    }
}

#[async_trait]
impl RankingStrategy for JudgeAssistedRanker {
    fn name(&self) -> &'static str {
        "judge-assisted"
    }

    async fn rank(&self, candidates: Vec<CatalogEntry>, query: Option<&str>) -> Vec<RankedCandidate> {
        let ranked = self.heuristic.rank_at(candidates, Utc::now());
        let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) else {
            return ranked;
        };
        if ranked.len() < 2 {
            return ranked;
        }

        match self.consult(query, &ranked).await {
            Ok(judged) => self.apply(ranked, &judged),
            Err(e) => {
                debug!(error = %e, "judge fallback to heuristic order");
                ranked
            }
        }
    }
}

/// Pick the strategy for `settings`: judge-assisted only when enabled and a
/// judge is present.
pub fn select_strategy(
    settings: &RankingSettings,
    tracker: Arc<UsageTracker>,
    judge: Option<Arc<dyn CandidateJudge>>,
) -> Arc<dyn RankingStrategy> {
    let heuristic = HeuristicRanker::new(settings, tracker);
    match judge {
        Some(judge) if settings.judge.enabled => {
            Arc::new(JudgeAssistedRanker::new(heuristic, judge, settings.judge.clone()))
        }
        _ => Arc::new(heuristic),
    }
}

/// Map judge ids back to candidate indices. Unknown or repeated ids, or an
/// empty answer, invalidate the whole ordering.
fn positions(summaries: &[CandidateSummary], ids: &[String]) -> Result<Vec<usize>, JudgeError> {
    if ids.is_empty() {
        return Err(JudgeError::InvalidOrdering("empty ordering".into()));
    }
    let index: HashMap<&str, usize> = summaries
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();
    let mut seen = vec![false; summaries.len()];
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let &i = index
            .get(id.as_str())
            .ok_or_else(|| JudgeError::InvalidOrdering(format!("unknown id '{id}'")))?;
        if seen[i] {
            return Err(JudgeError::InvalidOrdering(format!("duplicate id '{id}'")));
        }
        seen[i] = true;
        out.push(i);
    }
    Ok(out)
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
