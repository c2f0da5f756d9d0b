//! Entry content loading.
//!
//! Content is read as raw bytes and returned untouched. Every read is
//! confined to the entry's source root after resolving symlinks.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use manifold_core::{CatalogEntry, CatalogError, Result};
use serde::Serialize;
use tracing::{debug, warn};

/// Bytes of one loaded file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedContent {
    /// Canonical path that was read.
    pub path: PathBuf,
    /// File content, byte for byte.
    pub bytes: Vec<u8>,
}

impl LoadedContent {
    /// Content as UTF-8, when it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

/// Read the primary file of `entry`.
pub async fn load_content(entry: &CatalogEntry) -> Result<LoadedContent> {
    read_within_root(entry, &entry.path, entry.qualified_name()).await
}

/// Read a companion file of an entry: a sibling of a directory entry
/// (`instructions.md` next to `workflow.yaml`) or the agent's customization
/// file. Only names listed in `additional_files` or the customization's file
/// name are served.
pub async fn load_companion(entry: &CatalogEntry, file: &str) -> Result<LoadedContent> {
    let name = format!("{}/{file}", entry.qualified_name());
    let not_found = || CatalogError::NotFound {
        name: name.clone(),
        kind: Some(entry.kind),
        suggestion: None,
    };
    if let Some(custom) = entry
        .customization
        .as_deref()
        .filter(|p| p.file_name().is_some_and(|f| f == file))
    {
        return read_within_root(entry, custom, name).await;
    }
    if !entry.additional_files.iter().any(|f| f == file) {
        return Err(not_found());
    }
    let Some(dir) = entry.path.parent() else {
        return Err(not_found());
    };
    read_within_root(entry, &dir.join(file), name).await
}

async fn read_within_root(entry: &CatalogEntry, path: &Path, name: String) -> Result<LoadedContent> {
    let map_err = |e: std::io::Error, at: &Path| {
        if e.kind() == ErrorKind::NotFound {
            CatalogError::NotFound {
                name: name.clone(),
                kind: Some(entry.kind),
                suggestion: None,
            }
        } else {
            CatalogError::ReadError {
                path: at.to_path_buf(),
                source: e,
            }
        }
    };

    let root = tokio::fs::canonicalize(&entry.source_root)
        .await
        .map_err(|e| map_err(e, &entry.source_root))?;
    let resolved = tokio::fs::canonicalize(path).await.map_err(|e| map_err(e, path))?;

    if !resolved.starts_with(&root) {
        warn!(
            entry = %entry.key(),
            path = %resolved.display(),
            root = %root.display(),
            "refusing to read outside source root"
        );
        return Err(CatalogError::PathOutsideRoot { path: resolved, root });
    }

    let bytes = tokio::fs::read(&resolved).await.map_err(|e| map_err(e, &resolved))?;
    debug!(entry = %entry.key(), path = %resolved.display(), bytes = bytes.len(), "loaded content");
    Ok(LoadedContent { path: resolved, bytes })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
