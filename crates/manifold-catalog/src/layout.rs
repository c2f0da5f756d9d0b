//! Source layout detection.
//!
//! Detection order per root:
//! 1. `manifold.json` descriptor declaring layout and modules
//! 2. CSV manifests under `_cfg/` or `bmad/_cfg/`
//! 3. directory shape: module-named subdirectories holding kind folders
//!    mean Modular, anything else is Flat
//!
//! Results are cached per root so one scan never re-detects the layout.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use manifold_core::EntryKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{DESCRIPTOR_FILE, NON_MODULE_DIRS};
use crate::manifest::{ManifestSet, find_manifests};

/// Directory that often wraps the content of a project root.
const CONTENT_DIR: &str = "bmad";

/// How entries are arranged under a root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    /// Kind folders directly under the content base.
    Flat,
    /// Kind folders nested one level under named modules.
    Modular,
}

/// What decided the layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayoutOrigin {
    /// A `manifold.json` descriptor.
    Descriptor,
    /// CSV manifests; they are also the entry list.
    Manifests(ManifestSet),
    /// Directory shape.
    Heuristic,
}

/// Detected layout of one root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutPlan {
    /// Flat or modular.
    pub kind: LayoutKind,
    /// Directory holding kind folders (flat) or module folders (modular).
    pub base: PathBuf,
    /// Modules to scan, sorted. Empty for flat layouts.
    pub modules: Vec<String>,
    /// What decided the layout.
    pub origin: LayoutOrigin,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    layout: LayoutKind,
    #[serde(default)]
    modules: Vec<String>,
    #[serde(default)]
    base: Option<String>,
}

/// Detect the layout of `root` without caching.
pub fn detect_layout(root: &Path) -> LayoutPlan {
    if let Some(plan) = from_descriptor(root) {
        return plan;
    }

    if let Some(set) = find_manifests(root) {
        let kind = if set.has_modules() {
            LayoutKind::Modular
        } else {
            LayoutKind::Flat
        };
        return LayoutPlan {
            kind,
            base: root.to_path_buf(),
            modules: Vec::new(),
            origin: LayoutOrigin::Manifests(set),
        };
    }

    let base = content_base(root);
    let modules = module_dirs(&base);
    let kind = if modules.is_empty() {
        LayoutKind::Flat
    } else {
        LayoutKind::Modular
    };
    LayoutPlan {
        kind,
        base,
        modules,
        origin: LayoutOrigin::Heuristic,
    }
}

fn from_descriptor(root: &Path) -> Option<LayoutPlan> {
    let path = root.join(DESCRIPTOR_FILE);
    let content = std::fs::read_to_string(&path).ok()?;
    let descriptor: Descriptor = match serde_json::from_str(&content) {
        Ok(d) => d,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid layout descriptor, falling back to heuristics");
            return None;
        }
    };

    let base = descriptor
        .base
        .as_deref()
        .filter(|b| is_relative_inside(b))
        .map_or_else(|| root.to_path_buf(), |b| root.join(b));
    let mut modules: Vec<String> = descriptor
        .modules
        .into_iter()
        .filter(|m| is_relative_inside(m) && !m.contains('/'))
        .collect();
    modules.sort();
    modules.dedup();
    if descriptor.layout == LayoutKind::Modular && modules.is_empty() {
        modules = module_dirs(&base);
    }

    Some(LayoutPlan {
        kind: descriptor.layout,
        base,
        modules: if descriptor.layout == LayoutKind::Flat {
            Vec::new()
        } else {
            modules
        },
        origin: LayoutOrigin::Descriptor,
    })
}

/// The root itself, or its `bmad/` directory when only that holds content.
fn content_base(root: &Path) -> PathBuf {
    if has_kind_folder(root) || !module_dirs(root).is_empty() {
        return root.to_path_buf();
    }
    let nested = root.join(CONTENT_DIR);
    if nested.is_dir() {
        nested
    } else {
        root.to_path_buf()
    }
}

/// Subdirectories of `dir` that contain at least one kind folder.
fn module_dirs(dir: &Path) -> Vec<String> {
    let Ok(read) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut modules: Vec<String> = read
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .filter(|name| {
            !name.starts_with('.')
                && !NON_MODULE_DIRS.contains(&name.as_str())
                && EntryKind::from_folder(name).is_none()
        })
        .filter(|name| has_kind_folder(&dir.join(name)))
        .collect();
    modules.sort();
    modules
}

fn has_kind_folder(dir: &Path) -> bool {
    EntryKind::ALL
        .iter()
        .flat_map(|k| k.folder_names())
        .any(|folder| dir.join(folder).is_dir())
}

fn is_relative_inside(path: &str) -> bool {
    let p = Path::new(path);
    !path.is_empty()
        && p.components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
}

/// Per-root layout cache.
#[derive(Debug, Default)]
pub struct LayoutCache {
    plans: DashMap<PathBuf, LayoutPlan>,
}

impl LayoutCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached plan for `root`, detecting it on first use.
    pub fn get_or_detect(&self, root: &Path) -> LayoutPlan {
        if let Some(plan) = self.plans.get(root) {
            return plan.value().clone();
        }
        let plan = detect_layout(root);
        debug!(root = %root.display(), layout = ?plan.kind, modules = plan.modules.len(), "detected layout");
        let _ = self.plans.insert(root.to_path_buf(), plan.clone());
        plan
    }

    /// Drop the cached plan for `root`.
    pub fn forget(&self, root: &Path) {
        let _ = self.plans.remove(root);
    }

    /// Drop every cached plan.
    pub fn clear(&self) {
        self.plans.clear();
    }

    /// Number of cached plans.
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn flat_layout() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "agents/analyst.md");
        let plan = detect_layout(tmp.path());
        assert_eq!(plan.kind, LayoutKind::Flat);
        assert_eq!(plan.base, tmp.path());
        assert_eq!(plan.origin, LayoutOrigin::Heuristic);
    }

    #[test]
    fn modular_layout() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "bmm/agents/analyst.md");
        touch(tmp.path(), "core/workflows/party/workflow.yaml");
        touch(tmp.path(), "docs/readme.md");
        touch(tmp.path(), ".git/agents/x.md");
        let plan = detect_layout(tmp.path());
        assert_eq!(plan.kind, LayoutKind::Modular);
        assert_eq!(plan.modules, vec!["bmm", "core"]);
    }

    #[test]
    fn nested_content_dir() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "bmad/bmm/agents/pm.md");
        touch(tmp.path(), "src/main.rs");
        let plan = detect_layout(tmp.path());
        assert_eq!(plan.kind, LayoutKind::Modular);
        assert_eq!(plan.base, tmp.path().join("bmad"));
        assert_eq!(plan.modules, vec!["bmm"]);
    }

    #[test]
    fn empty_root_is_flat() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(detect_layout(tmp.path()).kind, LayoutKind::Flat);
    }

    #[test]
    fn descriptor_wins_over_shape() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "bmm/agents/analyst.md");
        touch(tmp.path(), "cis/agents/analyst.md");
        fs::write(
            tmp.path().join(DESCRIPTOR_FILE),
            r#"{"layout": "modular", "modules": ["cis", "../escape"]}"#,
        )
        .unwrap();
        let plan = detect_layout(tmp.path());
        assert_eq!(plan.origin, LayoutOrigin::Descriptor);
        assert_eq!(plan.modules, vec!["cis"]);
    }

    #[test]
    fn invalid_descriptor_falls_back() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "agents/a.md");
        fs::write(tmp.path().join(DESCRIPTOR_FILE), "{oops").unwrap();
        let plan = detect_layout(tmp.path());
        assert_eq!(plan.origin, LayoutOrigin::Heuristic);
        assert_eq!(plan.kind, LayoutKind::Flat);
    }

    #[test]
    fn manifests_decide_layout() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "bmm/agents/analyst.md");
        fs::create_dir_all(tmp.path().join("_cfg")).unwrap();
        fs::write(
            tmp.path().join("_cfg/agent-manifest.csv"),
            "name,module,path\nanalyst,bmm,bmm/agents/analyst.md\n",
        )
        .unwrap();
        let plan = detect_layout(tmp.path());
        assert_eq!(plan.kind, LayoutKind::Modular);
        assert_matches!(plan.origin, LayoutOrigin::Manifests(_));
    }

    #[test]
    fn cache_detects_once() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "agents/a.md");
        let cache = LayoutCache::new();
        assert_eq!(cache.get_or_detect(tmp.path()).kind, LayoutKind::Flat);

        // Shape changes are not seen until the plan is forgotten.
        touch(tmp.path(), "bmm/agents/b.md");
        fs::remove_dir_all(tmp.path().join("agents")).unwrap();
        assert_eq!(cache.get_or_detect(tmp.path()).kind, LayoutKind::Flat);

        cache.forget(tmp.path());
        assert_eq!(cache.get_or_detect(tmp.path()).kind, LayoutKind::Modular);
        assert_eq!(cache.len(), 1);
    }
}
