//! Catalog data model.
//!
//! All types use `#[serde(rename_all = "camelCase")]` so a transport layer can
//! hand them to clients unchanged.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Sources
// ─────────────────────────────────────────────────────────────────────────────

/// Origin class of a configured source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// The project-local directory.
    Project,
    /// The user-global directory.
    User,
    /// A remote version-controlled repository.
    Remote,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::User => write!(f, "user"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Where a source's content lives.
///
/// Remote locators are kept as the raw configured string; the version
/// control resolver owns their grammar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum SourceLocator {
    /// A directory on the local filesystem.
    Local(PathBuf),
    /// A remote repository locator such as `org/repo#main:agents`.
    Remote(String),
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(locator) => write!(f, "{locator}"),
        }
    }
}

/// One configured origin of catalog entries.
///
/// Created once at startup and never mutated. Lower `priority` wins when the
/// same entry exists in several sources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRoot {
    /// Local path or remote locator.
    pub locator: SourceLocator,
    /// Origin class, used by [`DiscoveryMode`] filtering.
    pub kind: SourceKind,
    /// Merge priority (lower number wins).
    pub priority: i32,
}

impl SourceRoot {
    /// Project-local source rooted at `path`.
    pub fn project(path: impl Into<PathBuf>, priority: i32) -> Self {
        Self {
            locator: SourceLocator::Local(path.into()),
            kind: SourceKind::Project,
            priority,
        }
    }

    /// User-global source rooted at `path`.
    pub fn user(path: impl Into<PathBuf>, priority: i32) -> Self {
        Self {
            locator: SourceLocator::Local(path.into()),
            kind: SourceKind::User,
            priority,
        }
    }

    /// Remote repository source.
    pub fn remote(locator: impl Into<String>, priority: i32) -> Self {
        Self {
            locator: SourceLocator::Remote(locator.into()),
            kind: SourceKind::Remote,
            priority,
        }
    }

    /// Short label for logs and warnings (`remote:org/repo#main`).
    pub fn label(&self) -> String {
        format!("{}:{}", self.kind, self.locator)
    }
}

/// Which source kinds participate in a discovery pass.
///
/// Narrowing never changes the merge rule, it only drops sources.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscoveryMode {
    /// Every configured source.
    #[default]
    All,
    /// Project-local sources only.
    ProjectOnly,
    /// User-global sources only.
    UserOnly,
    /// Remote repositories only.
    RemoteOnly,
}

impl DiscoveryMode {
    /// Whether sources of `kind` take part under this mode.
    pub fn includes(self, kind: SourceKind) -> bool {
        match self {
            Self::All => true,
            Self::ProjectOnly => kind == SourceKind::Project,
            Self::UserOnly => kind == SourceKind::User,
            Self::RemoteOnly => kind == SourceKind::Remote,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entries
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of a discoverable item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// An agent persona definition.
    Agent,
    /// A workflow definition.
    Workflow,
    /// Any other served item (tasks, shared resources).
    Resource,
}

impl EntryKind {
    /// All kinds, in display order.
    pub const ALL: [Self; 3] = [Self::Agent, Self::Workflow, Self::Resource];

    /// Folder names that hold entries of this kind.
    pub fn folder_names(self) -> &'static [&'static str] {
        match self {
            Self::Agent => &["agents"],
            Self::Workflow => &["workflows"],
            Self::Resource => &["tasks", "resources"],
        }
    }

    /// Map a kind folder name back to its kind.
    pub fn from_folder(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.folder_names().contains(&name))
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::Workflow => write!(f, "workflow"),
            Self::Resource => write!(f, "resource"),
        }
    }
}

/// Identity of an entry for merging: `(module, name, kind)`.
///
/// Field order gives the lexical `(module, name)` ordering used for
/// deterministic tie-breaks.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryKey {
    /// Module namespace (`None` for flat layouts).
    pub module: Option<String>,
    /// Entry name.
    pub name: String,
    /// Entry kind.
    pub kind: EntryKind,
}

impl EntryKey {
    /// Build a key from borrowed parts.
    pub fn new(module: Option<&str>, name: &str, kind: EntryKind) -> Self {
        Self {
            module: module.map(ToString::to_string),
            name: name.to_string(),
            kind,
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{}:{module}/{}", self.kind, self.name),
            None => write!(f, "{}:{}", self.kind, self.name),
        }
    }
}

/// Declared descriptive metadata. Every field is optional pass-through text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryMetadata {
    /// Human-readable title or display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// One-line description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared capabilities.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    /// Author-declared importance, 0–100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
}

impl EntryMetadata {
    /// Whether no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.capabilities.is_empty()
            && self.priority.is_none()
    }

    /// Fill any unset field from `other`; set fields are kept.
    #[must_use]
    pub fn or(mut self, other: Self) -> Self {
        if self.title.is_none() {
            self.title = other.title;
        }
        if self.description.is_none() {
            self.description = other.description;
        }
        if self.capabilities.is_empty() {
            self.capabilities = other.capabilities;
        }
        if self.priority.is_none() {
            self.priority = other.priority;
        }
        self
    }
}

/// One discoverable item with its resolved location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Entry name (file stem or declared manifest name).
    pub name: String,
    /// Module namespace, `None` under a flat layout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Entry kind.
    pub kind: EntryKind,
    /// Declared metadata.
    pub metadata: EntryMetadata,
    /// Absolute path of the content file.
    pub path: PathBuf,
    /// Materialized directory of the originating source.
    pub source_root: PathBuf,
    /// Origin class of the originating source.
    pub source_kind: SourceKind,
    /// Priority of the originating source.
    pub priority: i32,
    /// Sibling files of a directory-shaped entry, sorted.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub additional_files: Vec<String>,
    /// Agent customization file from the manifest configuration directory.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub customization: Option<PathBuf>,
}

impl CatalogEntry {
    /// Merge identity of this entry.
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.module.as_deref(), &self.name, self.kind)
    }

    /// `module/name`, or just `name` without a module.
    pub fn qualified_name(&self) -> String {
        match &self.module {
            Some(module) => format!("{module}/{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Description, falling back to the title.
    pub fn summary(&self) -> Option<&str> {
        self.metadata
            .description
            .as_deref()
            .or(self.metadata.title.as_deref())
    }

    /// Whether `path` lives under this entry's source root.
    pub fn is_within_root(&self, path: &Path) -> bool {
        path.starts_with(&self.source_root)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(module: Option<&str>, name: &str) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            module: module.map(ToString::to_string),
            kind: EntryKind::Agent,
            metadata: EntryMetadata::default(),
            path: PathBuf::from("/src/agents").join(format!("{name}.md")),
            source_root: PathBuf::from("/src"),
            source_kind: SourceKind::Project,
            priority: 1,
            additional_files: Vec::new(),
            customization: None,
        }
    }

    #[test]
    fn discovery_mode_filters_kinds() {
        assert!(DiscoveryMode::All.includes(SourceKind::Remote));
        assert!(DiscoveryMode::ProjectOnly.includes(SourceKind::Project));
        assert!(!DiscoveryMode::ProjectOnly.includes(SourceKind::User));
        assert!(!DiscoveryMode::UserOnly.includes(SourceKind::Remote));
        assert!(DiscoveryMode::RemoteOnly.includes(SourceKind::Remote));
    }

    #[test]
    fn entry_kind_folder_mapping() {
        assert_eq!(EntryKind::from_folder("agents"), Some(EntryKind::Agent));
        assert_eq!(EntryKind::from_folder("workflows"), Some(EntryKind::Workflow));
        assert_eq!(EntryKind::from_folder("tasks"), Some(EntryKind::Resource));
        assert_eq!(EntryKind::from_folder("resources"), Some(EntryKind::Resource));
        assert_eq!(EntryKind::from_folder("docs"), None);
    }

    #[test]
    fn entry_key_orders_by_module_then_name() {
        let mut keys = vec![
            EntryKey::new(Some("core"), "zeta", EntryKind::Agent),
            EntryKey::new(Some("bmm"), "zeta", EntryKind::Agent),
            EntryKey::new(Some("bmm"), "alpha", EntryKind::Agent),
            EntryKey::new(None, "omega", EntryKind::Agent),
        ];
        keys.sort();
        let rendered: Vec<String> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "agent:omega",
                "agent:bmm/alpha",
                "agent:bmm/zeta",
                "agent:core/zeta"
            ]
        );
    }

    #[test]
    fn qualified_name_includes_module() {
        assert_eq!(entry(Some("bmm"), "analyst").qualified_name(), "bmm/analyst");
        assert_eq!(entry(None, "analyst").qualified_name(), "analyst");
    }

    #[test]
    fn metadata_or_keeps_set_fields() {
        let header = EntryMetadata {
            title: Some("Header".into()),
            ..Default::default()
        };
        let sidecar = EntryMetadata {
            title: Some("Sidecar".into()),
            description: Some("From sidecar".into()),
            priority: Some(40),
            ..Default::default()
        };
        let merged = sidecar.or(header);
        assert_eq!(merged.title.as_deref(), Some("Sidecar"));
        assert_eq!(merged.description.as_deref(), Some("From sidecar"));
        assert_eq!(merged.priority, Some(40));
    }

    #[test]
    fn summary_falls_back_to_title() {
        let mut e = entry(None, "dev");
        assert_eq!(e.summary(), None);
        e.metadata.title = Some("Developer".into());
        assert_eq!(e.summary(), Some("Developer"));
        e.metadata.description = Some("Writes code".into());
        assert_eq!(e.summary(), Some("Writes code"));
    }

    #[test]
    fn source_root_label() {
        let root = SourceRoot::remote("org/repo#main", 5);
        assert_eq!(root.label(), "remote:org/repo#main");
        let local = SourceRoot::project("./custom", 1);
        assert_eq!(local.label(), "project:./custom");
    }

    #[test]
    fn entry_serializes_camel_case() {
        let json = serde_json::to_value(entry(Some("bmm"), "pm")).unwrap();
        assert_eq!(json["sourceKind"], "project");
        assert_eq!(json["kind"], "agent");
        assert!(json.get("additionalFiles").is_none());
    }
}
