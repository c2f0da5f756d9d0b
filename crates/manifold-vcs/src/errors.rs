//! Error types for remote checkout resolution.

use std::path::PathBuf;

use manifold_core::CatalogError;
use thiserror::Error;

/// Errors raised while materializing a remote source.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The locator string does not follow the locator grammar.
    #[error("invalid locator '{locator}': {reason}")]
    InvalidLocator {
        /// Offending locator.
        locator: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A git command exited unsuccessfully.
    #[error("git {operation} failed: {stderr}")]
    Git {
        /// Operation name (`clone`, `fetch`, ...).
        operation: &'static str,
        /// Trimmed stderr output.
        stderr: String,
    },

    /// A git command exceeded its time limit.
    #[error("git {operation} timed out after {secs}s")]
    Timeout {
        /// Operation name.
        operation: &'static str,
        /// Limit that was exceeded.
        secs: u64,
    },

    /// The git executable could not be started.
    #[error("failed to run {binary}: {source}")]
    Spawn {
        /// Executable that failed to start.
        binary: String,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// The requested subpath does not exist inside the checkout.
    #[error("subpath {} not found in {}", .subpath.display(), .checkout.display())]
    SubpathNotFound {
        /// Requested subpath.
        subpath: PathBuf,
        /// Checkout that was searched.
        checkout: PathBuf,
    },

    /// Cache sidecar could not be (de)serialized.
    #[error("invalid sync record: {0}")]
    Sidecar(#[from] serde_json::Error),

    /// The materialization task panicked or was aborted.
    #[error("materialization task aborted: {0}")]
    TaskAborted(String),

    /// Filesystem failure in the cache directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VcsError {
    /// Whether the failure looks like a network/reachability problem.
    ///
    /// Network failures on an update are not retried with a fresh clone,
    /// since the clone would hit the same wall.
    pub fn is_network(&self) -> bool {
        const MARKERS: [&str; 7] = [
            "Could not resolve host",
            "unable to access",
            "Could not read from remote repository",
            "Connection refused",
            "Connection timed out",
            "Network is unreachable",
            "Operation timed out",
        ];
        match self {
            Self::Git { stderr, .. } => MARKERS.iter().any(|m| stderr.contains(m)),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Convert to the caller-facing taxonomy for the source `label`.
    pub fn into_catalog_error(self, label: &str) -> CatalogError {
        match self {
            Self::SubpathNotFound { subpath, .. } => CatalogError::NotFound {
                name: subpath.display().to_string(),
                kind: None,
                suggestion: None,
            },
            other => CatalogError::SourceUnavailable {
                source_label: label.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Result type for checkout resolution.
pub type Result<T> = std::result::Result<T, VcsError>;
