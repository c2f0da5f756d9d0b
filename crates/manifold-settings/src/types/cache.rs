//! Remote checkout cache settings.

use serde::{Deserialize, Serialize};

/// What to do with an existing checkout on resolve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdatePolicy {
    /// Fetch and fast-forward, re-cloning on divergence.
    #[default]
    AutoUpdate,
    /// Use whatever is cached without touching the network.
    CacheFirst,
}

/// Remote checkout cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// Cache directory (`~` expands to `$HOME`).
    pub dir: String,
    /// Update behaviour for existing checkouts.
    pub update_policy: UpdatePolicy,
    /// Git executable.
    pub git_binary: String,
    /// Clone with `--depth 1`.
    pub shallow: bool,
    /// A sync younger than this many seconds is reused without a network call.
    pub fresh_for_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: "~/.manifold/cache".to_string(),
            update_policy: UpdatePolicy::AutoUpdate,
            git_binary: "git".to_string(),
            shallow: true,
            fresh_for_secs: 300,
        }
    }
}
