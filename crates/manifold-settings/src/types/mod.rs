//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]`. Each type implements
//! [`Default`] with production values, and `#[serde(default)]` lets a
//! settings file name only the fields it changes.

mod cache;
mod lookup;
mod ranking;
mod sources;

pub use cache::*;
pub use lookup::*;
pub use ranking::*;
pub use sources::*;

use manifold_core::SourceRoot;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};
use crate::loader::expand_home;

/// Root settings type.
///
/// Loaded from `~/.manifold/settings.json` with defaults applied for
/// missing fields. Environment variables can override specific values.
///
/// ```json
/// {
///   "sources": { "remotes": [{ "locator": "org/repo#main" }] },
///   "cache": { "updatePolicy": "cacheFirst" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManifoldSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Source roots.
    pub sources: SourceSettings,
    /// Remote checkout cache.
    pub cache: CacheSettings,
    /// Ranking of ambiguous candidates.
    pub ranking: RankingSettings,
    /// Name lookup rules.
    pub lookup: LookupSettings,
    /// Source scanning.
    pub scan: ScanSettings,
}

impl Default for ManifoldSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "manifold".to_string(),
            sources: SourceSettings::default(),
            cache: CacheSettings::default(),
            ranking: RankingSettings::default(),
            lookup: LookupSettings::default(),
            scan: ScanSettings::default(),
        }
    }
}

impl ManifoldSettings {
    /// Build the ordered source roots the core consumes.
    ///
    /// Roots come back sorted by ascending priority; equal priorities keep
    /// configured order (project, user, then remotes).
    pub fn source_roots(&self) -> Vec<SourceRoot> {
        let sources = &self.sources;
        let mut roots = Vec::new();

        if let Some(dir) = &sources.project_dir {
            roots.push(SourceRoot::project(expand_home(dir), sources.project_priority));
        }
        if let Some(dir) = &sources.user_dir {
            roots.push(SourceRoot::user(expand_home(dir), sources.user_priority));
        }
        for (index, remote) in sources.remotes.iter().enumerate() {
            let offset = i32::try_from(index).unwrap_or(i32::MAX);
            let priority = remote
                .priority
                .unwrap_or_else(|| sources.remote_priority_base.saturating_add(offset));
            roots.push(SourceRoot::remote(remote.locator.clone(), priority));
        }

        roots.sort_by_key(|root| root.priority);
        roots
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        let weights = &self.ranking.weights;
        let all = [weights.recency, weights.frequency, weights.priority, weights.boost];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SettingsError::InvalidValue(
                "ranking weights must be finite and non-negative".into(),
            ));
        }
        if weights.total() <= 0.0 {
            return Err(SettingsError::InvalidValue(
                "ranking weights sum to zero".into(),
            ));
        }
        if self.ranking.recency_decay_hours <= 0.0 {
            return Err(SettingsError::InvalidValue(
                "recencyDecayHours must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ranking.judge.blend_weight) {
            return Err(SettingsError::InvalidValue(
                "judge.blendWeight must be within 0.0..=1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.lookup.suggestion_threshold) {
            return Err(SettingsError::InvalidValue(
                "lookup.suggestionThreshold must be within 0.0..=1.0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::{SourceKind, SourceLocator};

    #[test]
    fn default_settings_are_valid() {
        let settings = ManifoldSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.cache.update_policy, UpdatePolicy::AutoUpdate);
        assert!((settings.ranking.weights.total() - 1.0).abs() < 1e-9);
        assert!((settings.lookup.suggestion_threshold - 0.70).abs() < 1e-9);
    }

    #[test]
    fn source_roots_sorted_by_priority() {
        let mut settings = ManifoldSettings::default();
        settings.sources.project_dir = Some("./custom".into());
        settings.sources.user_dir = None;
        settings.sources.remotes = vec![
            RemoteSourceSettings {
                locator: "org/late#main".into(),
                priority: None,
            },
            RemoteSourceSettings {
                locator: "org/early#main".into(),
                priority: Some(0),
            },
        ];

        let roots = settings.source_roots();
        assert_eq!(roots.len(), 3);
        assert_eq!(roots[0].locator, SourceLocator::Remote("org/early#main".into()));
        assert_eq!(roots[1].kind, SourceKind::Project);
        assert_eq!(roots[2].priority, 10);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: ManifoldSettings =
            serde_json::from_str(r#"{"cache": {"updatePolicy": "cacheFirst"}}"#).unwrap();
        assert_eq!(settings.cache.update_policy, UpdatePolicy::CacheFirst);
        assert_eq!(settings.cache.git_binary, "git");
        assert_eq!(settings.sources.project_priority, 1);
    }

    #[test]
    fn negative_weight_rejected() {
        let mut settings = ManifoldSettings::default();
        settings.ranking.weights.boost = -1.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_weights_rejected() {
        let mut settings = ManifoldSettings::default();
        settings.ranking.weights = RankingWeights {
            recency: 0.0,
            frequency: 0.0,
            priority: 0.0,
            boost: 0.0,
        };
        assert!(settings.validate().is_err());
    }
}
