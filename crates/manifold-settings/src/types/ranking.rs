//! Ranking weights, boosts and judge settings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Weights of the four composite-score signals.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RankingWeights {
    /// Weight of time since last access.
    pub recency: f64,
    /// Weight of access count.
    pub frequency: f64,
    /// Weight of author-declared priority.
    pub priority: f64,
    /// Weight of operator boosts.
    pub boost: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            recency: 0.4,
            frequency: 0.3,
            priority: 0.2,
            boost: 0.1,
        }
    }
}

impl RankingWeights {
    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.recency + self.frequency + self.priority + self.boost
    }
}

/// How a judge ordering is combined with the heuristic one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JudgeMode {
    /// Use the judge ordering as-is.
    Replace,
    /// Blend judge position scores with heuristic scores.
    #[default]
    Blend,
}

/// External judge settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JudgeSettings {
    /// Whether a judge is consulted when one is available.
    pub enabled: bool,
    /// Combination mode.
    pub mode: JudgeMode,
    /// Share of the judge score in blend mode (0.0–1.0).
    pub blend_weight: f64,
    /// Upper bound on one judge call in milliseconds.
    pub timeout_ms: u64,
    /// Candidate descriptions are cut to this many characters.
    pub max_description_chars: usize,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: JudgeMode::Blend,
            blend_weight: 0.5,
            timeout_ms: 5_000,
            max_description_chars: 120,
        }
    }
}

/// Ranking engine settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RankingSettings {
    /// Signal weights.
    pub weights: RankingWeights,
    /// Time constant of the recency decay, in hours.
    pub recency_decay_hours: f64,
    /// Operator boosts keyed by `module:name`, `module:*` or `name`.
    pub boosts: HashMap<String, f64>,
    /// External judge settings.
    pub judge: JudgeSettings,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            weights: RankingWeights::default(),
            recency_decay_hours: 4.0,
            boosts: HashMap::new(),
            judge: JudgeSettings::default(),
        }
    }
}
