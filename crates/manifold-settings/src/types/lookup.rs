//! Name lookup and scanning settings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How requested names are normalized and matched.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LookupSettings {
    /// Agent served for an empty name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,
    /// Alias → canonical name.
    pub aliases: HashMap<String, String>,
    /// Prefixes stripped from requested names when the full name is unknown.
    pub strip_prefixes: Vec<String>,
    /// Minimum similarity (0.0–1.0) for a nearest-name suggestion.
    pub suggestion_threshold: f64,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            default_agent: None,
            aliases: HashMap::new(),
            strip_prefixes: Vec::new(),
            suggestion_threshold: 0.70,
        }
    }
}

/// Source scanning settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanSettings {
    /// Files larger than this skip metadata extraction (they stay discoverable).
    pub max_file_size: u64,
    /// File extensions recognised as entries.
    pub extensions: Vec<String>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024,
            extensions: ["md", "yaml", "yml", "xml", "txt", "json"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}
