//! Catalog-level result types.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A non-fatal problem met while building a catalog.
///
/// Unavailable sources and unreadable entries become warnings so one broken
/// source never hides the others.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceWarning {
    /// Label of the source (`remote:org/repo#main`).
    pub source: String,
    /// File or directory concerned, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// What went wrong.
    pub message: String,
}

impl SourceWarning {
    /// Warning about a whole source.
    pub fn source(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            path: None,
            message: message.into(),
        }
    }

    /// Warning about one path inside a source.
    pub fn at(source: impl Into<String>, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            path: Some(path.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for SourceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}: {}", self.source, path.display(), self.message),
            None => write!(f, "{}: {}", self.source, self.message),
        }
    }
}
