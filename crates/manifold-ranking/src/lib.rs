//! # manifold-ranking
//!
//! Orders candidates when a requested name matches several modules.
//!
//! - [`UsageTracker`]: concurrent, append-only access counters
//! - [`HeuristicRanker`]: composite score over recency, frequency, declared
//!   priority and operator boosts
//! - [`JudgeAssistedRanker`]: consults an external [`CandidateJudge`] and
//!   falls back to the heuristic on any failure
//!
//! Both rankers implement [`RankingStrategy`]; [`select_strategy`] picks one
//! from settings.

#![deny(unsafe_code)]

pub mod engine;
pub mod errors;
pub mod judge;
pub mod tracker;

pub use engine::{HeuristicRanker, RankedCandidate, RankingStrategy, Signals};
pub use errors::JudgeError;
pub use judge::{CandidateJudge, CandidateSummary, JudgeAssistedRanker, select_strategy};
pub use tracker::{UsageRecord, UsageTracker};
