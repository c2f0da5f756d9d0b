//! Caller-facing error taxonomy.
//!
//! There is no ambiguity variant: a name matching several modules travels
//! on the success path as a ranked candidate list.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::EntryKind;

/// Errors surfaced by discovery and load operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A remote source could not be materialized. Discovery continues with
    /// the remaining sources.
    #[error("source unavailable: {source_label}: {reason}")]
    SourceUnavailable {
        /// Label of the failing source.
        source_label: String,
        /// Why it failed.
        reason: String,
    },

    /// No entry matches the requested name.
    #[error("{}", not_found_message(.name, .kind.as_ref(), .suggestion.as_deref()))]
    NotFound {
        /// Requested name.
        name: String,
        /// Requested kind, if narrowed.
        kind: Option<EntryKind>,
        /// Nearest known name, when one is close enough.
        suggestion: Option<String>,
    },

    /// The entry existed at build time but could not be read now.
    #[error("failed to read {}: {source}", .path.display())]
    ReadError {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The requested name failed validation before lookup.
    #[error("invalid name '{name}': {reason}")]
    InvalidName {
        /// Offending name.
        name: String,
        /// Validation failure.
        reason: String,
    },

    /// A resolved path escapes its source root.
    #[error("path {} is outside source root {}", .path.display(), .root.display())]
    PathOutsideRoot {
        /// Resolved path.
        path: PathBuf,
        /// Source root it should live under.
        root: PathBuf,
    },

    /// Other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Whether the overall request may proceed past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }

    /// Nearest-name suggestion carried by a `NotFound`.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::NotFound { suggestion, .. } => suggestion.as_deref(),
            _ => None,
        }
    }
}

fn not_found_message(name: &str, kind: Option<&EntryKind>, suggestion: Option<&str>) -> String {
    let what = kind.map_or_else(|| "entry".to_string(), ToString::to_string);
    match suggestion {
        Some(s) => format!("{what} not found: {name} (did you mean '{s}'?)"),
        None => format!("{what} not found: {name}"),
    }
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
