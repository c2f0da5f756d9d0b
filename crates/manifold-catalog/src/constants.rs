//! File and directory names recognised while scanning a source root.

use manifold_core::EntryKind;

/// Explicit layout descriptor at a source root.
pub const DESCRIPTOR_FILE: &str = "manifold.json";

/// Directories searched (in order) for CSV manifests.
pub const MANIFEST_DIRS: &[&str] = &["_cfg", "bmad/_cfg"];

/// CSV manifest file names and the kind of entry each row declares.
pub const MANIFEST_FILES: &[(&str, EntryKind)] = &[
    ("agent-manifest.csv", EntryKind::Agent),
    ("workflow-manifest.csv", EntryKind::Workflow),
    ("task-manifest.csv", EntryKind::Resource),
];

/// Files that turn a directory inside a kind folder into one entry.
/// The first match wins.
pub const PRIMARY_FILES: &[&str] = &[
    "workflow.yaml",
    "workflow.yml",
    "workflow.md",
    "agent.md",
    "task.md",
];

/// Directory under the manifest directory holding agent customizations.
pub const CUSTOMIZE_DIR: &str = "agents";

/// Suffix of agent customization files (`<module>-<name>.customize.yaml`).
pub const CUSTOMIZE_SUFFIX: &str = ".customize.yaml";

/// Suffix of per-entry sidecar descriptors (`<stem>.meta.json`).
pub const META_SUFFIX: &str = ".meta.json";

/// Placeholder some manifests put in front of their paths.
pub const PROJECT_ROOT_PLACEHOLDER: &str = "{project-root}";

/// Directories under a root that are never modules.
pub const NON_MODULE_DIRS: &[&str] = &["_cfg", "node_modules", "target"];
