//! CSV manifests (`agent-manifest.csv`, `workflow-manifest.csv`,
//! `task-manifest.csv`).
//!
//! When present, the manifests are the authoritative entry list of a root.
//! Unknown columns are ignored; rows whose cells are all blank are skipped.

use std::path::{Component, Path, PathBuf};

use manifold_core::{EntryKind, EntryMetadata};
use serde::Deserialize;
use tracing::debug;

use crate::constants::{MANIFEST_DIRS, MANIFEST_FILES, PROJECT_ROOT_PLACEHOLDER};
use crate::parser::{parse_priority, split_capabilities};

/// Manifest files found under one root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestSet {
    /// Directory holding the manifests.
    pub dir: PathBuf,
    /// Present manifest files with the kind their rows declare.
    pub files: Vec<(EntryKind, PathBuf)>,
    module_declared: bool,
}

impl ManifestSet {
    /// Whether any row names a module.
    pub fn has_modules(&self) -> bool {
        self.module_declared
    }
}

/// One manifest row. Every column is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManifestRow {
    /// Entry name.
    pub name: String,
    /// Persona or display name.
    pub display_name: String,
    /// Title.
    pub title: String,
    /// One-line description.
    pub description: String,
    /// Module namespace.
    pub module: String,
    /// Content path, relative to the root (a leading `/` or
    /// `{project-root}/` is tolerated).
    pub path: String,
    /// `;`- or `,`-separated capabilities.
    pub capabilities: String,
    /// Declared priority.
    pub priority: String,
}

impl ManifestRow {
    /// Module, if the cell is not blank.
    pub fn module(&self) -> Option<&str> {
        Some(self.module.trim()).filter(|m| !m.is_empty())
    }

    /// Descriptive metadata carried by the row.
    pub fn metadata(&self) -> EntryMetadata {
        let non_empty = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
        EntryMetadata {
            title: non_empty(&self.title).or_else(|| non_empty(&self.display_name)),
            description: non_empty(&self.description),
            capabilities: split_capabilities(&self.capabilities),
            priority: parse_priority(&self.priority),
        }
    }
}

/// Look under `root` for manifests. The first directory holding any wins.
pub fn find_manifests(root: &Path) -> Option<ManifestSet> {
    for dir in MANIFEST_DIRS {
        let dir = root.join(dir);
        let files: Vec<(EntryKind, PathBuf)> = MANIFEST_FILES
            .iter()
            .map(|(file, kind)| (*kind, dir.join(file)))
            .filter(|(_, path)| path.is_file())
            .collect();
        if files.is_empty() {
            continue;
        }
        let module_declared = files.iter().any(|(kind, path)| {
            read_manifest(path)
                .map(|rows| rows.iter().any(|r| r.module().is_some()))
                .unwrap_or_else(|e| {
                    debug!(path = %path.display(), kind = %kind, error = %e, "unreadable manifest");
                    false
                })
        });
        return Some(ManifestSet {
            dir,
            files,
            module_declared,
        });
    }
    None
}

/// Read all non-blank rows of a manifest.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRow>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(record.deserialize(Some(&headers))?);
    }
    Ok(rows)
}

/// Resolve a manifest `path` cell to an existing file under `root`.
///
/// Tries the path relative to `root`, then with a leading component equal
/// to the root's own directory name removed (manifests written from the
/// parent directory say `bmad/bmm/...` while the root is `bmad/`).
pub fn resolve_manifest_path(root: &Path, raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix(PROJECT_ROOT_PLACEHOLDER).unwrap_or(trimmed);
    let relative = Path::new(trimmed.trim_start_matches(['/', '\\']));
    if relative.as_os_str().is_empty()
        || relative.components().any(|c| matches!(c, Component::ParentDir))
    {
        return None;
    }

    let direct = root.join(relative);
    if direct.is_file() {
        return Some(direct);
    }

    let root_name = root.file_name()?;
    let mut components = relative.components();
    match components.next() {
        Some(Component::Normal(first)) if first == root_name => {
            let stripped = root.join(components.as_path());
            stripped.is_file().then_some(stripped)
        }
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const AGENT_CSV: &str = "name,displayName,title,icon,role,module,path\n\
analyst,Mary,Business Analyst,📊,Requirements analyst,bmm,bmad/bmm/agents/analyst.md\n\
,,,,,,\n\
architect,Winston,,🏗️,Architecture design,bmm,/bmad/bmm/agents/architect.md\n";

    #[test]
    fn reads_rows_and_skips_blank() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("agent-manifest.csv");
        fs::write(&path, AGENT_CSV).unwrap();

        let rows = read_manifest(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "analyst");
        assert_eq!(rows[0].module(), Some("bmm"));
        assert_eq!(rows[0].metadata().title.as_deref(), Some("Business Analyst"));
        assert_eq!(rows[1].metadata().title.as_deref(), Some("Winston"));
    }

    #[test]
    fn missing_columns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("workflow-manifest.csv");
        fs::write(&path, "name,description\nparty-mode,Group chat\n").unwrap();
        let rows = read_manifest(&path).unwrap();
        assert_eq!(rows[0].module(), None);
        assert!(rows[0].path.is_empty());
        assert_eq!(rows[0].metadata().description.as_deref(), Some("Group chat"));
    }

    #[test]
    fn capabilities_and_priority_columns() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("task-manifest.csv");
        fs::write(&path, "name,capabilities,priority\nshard-doc,split; index,250\n").unwrap();
        let meta = read_manifest(&path).unwrap()[0].metadata();
        assert_eq!(meta.capabilities, vec!["split", "index"]);
        assert_eq!(meta.priority, Some(100));
    }

    #[test]
    fn finds_manifests_in_nested_cfg() {
        let tmp = TempDir::new().unwrap();
        let cfg = tmp.path().join("bmad/_cfg");
        fs::create_dir_all(&cfg).unwrap();
        fs::write(cfg.join("agent-manifest.csv"), AGENT_CSV).unwrap();

        let set = find_manifests(tmp.path()).unwrap();
        assert_eq!(set.dir, cfg);
        assert_eq!(set.files.len(), 1);
        assert_eq!(set.files[0].0, EntryKind::Agent);
        assert!(set.has_modules());
    }

    #[test]
    fn no_manifests() {
        let tmp = TempDir::new().unwrap();
        assert!(find_manifests(tmp.path()).is_none());
    }

    #[test]
    fn resolves_manifest_paths() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("bmad");
        fs::create_dir_all(root.join("bmm/agents")).unwrap();
        fs::write(root.join("bmm/agents/analyst.md"), "x").unwrap();
        let expected = root.join("bmm/agents/analyst.md");

        assert_eq!(resolve_manifest_path(&root, "bmm/agents/analyst.md"), Some(expected.clone()));
        assert_eq!(resolve_manifest_path(&root, "/bmad/bmm/agents/analyst.md"), Some(expected.clone()));
        assert_eq!(
            resolve_manifest_path(&root, "{project-root}/bmad/bmm/agents/analyst.md"),
            Some(expected)
        );
        assert_eq!(resolve_manifest_path(&root, "../etc/passwd"), None);
        assert_eq!(resolve_manifest_path(&root, "bmm/agents/missing.md"), None);
        assert_eq!(resolve_manifest_path(&root, ""), None);
    }
}
