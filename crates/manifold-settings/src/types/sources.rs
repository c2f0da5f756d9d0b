//! Source root settings.

use serde::{Deserialize, Serialize};

/// One configured remote repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSourceSettings {
    /// Remote locator, e.g. `org/repo#main:bmad`.
    pub locator: String,
    /// Explicit merge priority. Defaults to `remotePriorityBase + index`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub priority: Option<i32>,
}

/// Where entries are discovered from.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceSettings {
    /// Project-local directory. `None` disables the project source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_dir: Option<String>,
    /// User-global directory (`~` expands to `$HOME`). `None` disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_dir: Option<String>,
    /// Remote repositories, in configured order.
    pub remotes: Vec<RemoteSourceSettings>,
    /// Priority of the project source.
    pub project_priority: i32,
    /// Priority of the user source.
    pub user_priority: i32,
    /// First priority handed to remotes without an explicit one.
    pub remote_priority_base: i32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            project_dir: Some(".".to_string()),
            user_dir: Some("~/.manifold".to_string()),
            remotes: Vec::new(),
            project_priority: 1,
            user_priority: 2,
            remote_priority_base: 10,
        }
    }
}
