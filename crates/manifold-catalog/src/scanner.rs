//! Source scanner.
//!
//! Turns one materialized source directory into catalog entries. Missing
//! directories scan as empty. Problems with single files become warnings;
//! a file without any metadata is still an entry named after the file.

use std::path::{Path, PathBuf};

use manifold_core::{CatalogEntry, EntryKind, EntryMetadata, SourceRoot};
use manifold_settings::ScanSettings;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::constants::{CUSTOMIZE_DIR, CUSTOMIZE_SUFFIX, META_SUFFIX, PRIMARY_FILES};
use crate::layout::{LayoutCache, LayoutKind, LayoutOrigin};
use crate::manifest::{ManifestSet, read_manifest, resolve_manifest_path};
use crate::parser::{ParsedHeader, parse_entry_header, parse_sidecar};
use crate::types::SourceWarning;

/// Entries and warnings from one root.
#[derive(Clone, Debug, Default)]
pub struct ScanResult {
    /// Discovered entries, sorted by key.
    pub entries: Vec<CatalogEntry>,
    /// Non-fatal problems.
    pub warnings: Vec<SourceWarning>,
    /// Layout used for the scan (`None` when the directory is missing).
    pub layout: Option<LayoutKind>,
}

/// Scans source directories, caching each root's layout.
#[derive(Debug)]
pub struct SourceScanner {
    settings: ScanSettings,
    layouts: LayoutCache,
}

/// Where an entry came from while it is being built.
struct Origin<'a> {
    source: &'a SourceRoot,
    root: &'a Path,
    label: String,
}

impl SourceScanner {
    /// Scanner with `settings`.
    pub fn new(settings: ScanSettings) -> Self {
        Self {
            settings,
            layouts: LayoutCache::new(),
        }
    }

    /// Layout cache, for invalidation on refresh.
    pub fn layouts(&self) -> &LayoutCache {
        &self.layouts
    }

    /// Scan `dir`, the materialized directory of `source`.
    pub fn scan(&self, dir: &Path, source: &SourceRoot) -> ScanResult {
        let mut result = ScanResult::default();
        if !dir.is_dir() {
            debug!(dir = %dir.display(), source = %source.label(), "source directory missing, nothing to scan");
            return result;
        }

        let origin = Origin {
            source,
            root: dir,
            label: source.label(),
        };
        let plan = self.layouts.get_or_detect(dir);
        result.layout = Some(plan.kind);

        match &plan.origin {
            LayoutOrigin::Manifests(set) => self.scan_manifests(set, &origin, &mut result),
            LayoutOrigin::Descriptor | LayoutOrigin::Heuristic => match plan.kind {
                LayoutKind::Flat => self.scan_kind_folders(&plan.base, None, &origin, &mut result),
                LayoutKind::Modular => {
                    for module in &plan.modules {
                        self.scan_kind_folders(&plan.base.join(module), Some(module.as_str()), &origin, &mut result);
                    }
                    warn_unscanned_kind_folders(&plan.base, &origin, &mut result);
                }
            },
        }

        for w in &result.warnings {
            warn!(source = %w.source, path = ?w.path, message = %w.message, "scan error");
        }
        result.entries.sort_by_key(CatalogEntry::key);
        debug!(source = %origin.label, entries = result.entries.len(), "scanned source");
        result
    }

    fn scan_kind_folders(&self, dir: &Path, module: Option<&str>, origin: &Origin<'_>, result: &mut ScanResult) {
        for kind in EntryKind::ALL {
            for folder in kind.folder_names() {
                let folder = dir.join(folder);
                if folder.is_dir() {
                    self.scan_folder(&folder, kind, module, origin, result);
                }
            }
        }
    }

    fn scan_folder(
        &self,
        folder: &Path,
        kind: EntryKind,
        module: Option<&str>,
        origin: &Origin<'_>,
        result: &mut ScanResult,
    ) {
        let walker = WalkDir::new(folder)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for item in walker {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    result
                        .warnings
                        .push(SourceWarning::at(&origin.label, folder, e.to_string()));
                    continue;
                }
            };
            let path = item.path();
            let Some(file_name) = item.file_name().to_str() else {
                continue;
            };
            if file_name.starts_with('.') || file_name.ends_with(META_SUFFIX) {
                continue;
            }

            if item.file_type().is_dir() {
                let Some(primary) = PRIMARY_FILES.iter().map(|f| path.join(f)).find(|p| p.is_file()) else {
                    continue;
                };
                let additional = list_additional_files(path, &primary);
                let entry = self.build_entry(&primary, path, file_name, kind, module, additional, origin, result);
                result.entries.push(entry);
            } else if self.has_entry_extension(path) {
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name);
                let entry = self.build_entry(path, path, stem, kind, module, Vec::new(), origin, result);
                result.entries.push(entry);
            }
        }
    }

    fn scan_manifests(&self, set: &ManifestSet, origin: &Origin<'_>, result: &mut ScanResult) {
        for (kind, manifest) in &set.files {
            let rows = match read_manifest(manifest) {
                Ok(rows) => rows,
                Err(e) => {
                    result
                        .warnings
                        .push(SourceWarning::at(&origin.label, manifest, format!("invalid manifest: {e}")));
                    continue;
                }
            };

            for row in rows {
                let name = row.name.trim();
                if name.is_empty() {
                    result
                        .warnings
                        .push(SourceWarning::at(&origin.label, manifest, "manifest row without a name"));
                    continue;
                }
                let Some(path) = resolve_manifest_path(origin.root, &row.path) else {
                    result.warnings.push(SourceWarning::at(
                        &origin.label,
                        manifest,
                        format!("path '{}' of {kind} '{name}' does not resolve to a file", row.path),
                    ));
                    continue;
                };

                let additional = match (path.parent(), path.file_name().and_then(|f| f.to_str())) {
                    (Some(parent), Some(file)) if PRIMARY_FILES.contains(&file) => {
                        list_additional_files(parent, &path)
                    }
                    _ => Vec::new(),
                };
                let customization = if *kind == EntryKind::Agent {
                    agent_customization(&set.dir, row.module(), name)
                } else {
                    None
                };
                let header = self.read_header(&path, &path, origin, result);
                result.entries.push(CatalogEntry {
                    name: name.to_string(),
                    module: row.module().map(String::from),
                    kind: *kind,
                    metadata: row.metadata().or(header.metadata),
                    path,
                    source_root: origin.root.to_path_buf(),
                    source_kind: origin.source.kind,
                    priority: origin.source.priority,
                    additional_files: additional,
                    customization,
                });
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_entry(
        &self,
        path: &Path,
        anchor: &Path,
        default_name: &str,
        kind: EntryKind,
        module: Option<&str>,
        additional_files: Vec<String>,
        origin: &Origin<'_>,
        result: &mut ScanResult,
    ) -> CatalogEntry {
        let header = self.read_header(path, anchor, origin, result);
        CatalogEntry {
            name: header.name.unwrap_or_else(|| default_name.to_string()),
            module: module.map(String::from),
            kind,
            metadata: header.metadata,
            path: path.to_path_buf(),
            source_root: origin.root.to_path_buf(),
            source_kind: origin.source.kind,
            priority: origin.source.priority,
            additional_files,
            customization: None,
        }
    }

    /// Sidecar fields over header fields. `anchor` is the file or directory
    /// the sidecar is named after.
    fn read_header(&self, path: &Path, anchor: &Path, origin: &Origin<'_>, result: &mut ScanResult) -> ParsedHeader {
        let sidecar = sidecar_path(anchor).and_then(|p| {
            let content = std::fs::read_to_string(&p).ok()?;
            match parse_sidecar(&content) {
                Ok(header) => Some(header),
                Err(e) => {
                    result
                        .warnings
                        .push(SourceWarning::at(&origin.label, &p, format!("invalid descriptor: {e}")));
                    None
                }
            }
        });

        let header = self.read_file_header(path);
        match sidecar {
            Some(s) => s.or(header),
            None => header,
        }
    }

    fn read_file_header(&self, path: &Path) -> ParsedHeader {
        let size = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot stat entry");
                return ParsedHeader::default();
            }
        };
        if size > self.settings.max_file_size {
            debug!(path = %path.display(), size, max = self.settings.max_file_size, "file too large for metadata extraction");
            return ParsedHeader::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => parse_entry_header(&content, &extension(path)),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no readable header");
                ParsedHeader::default()
            }
        }
    }

    fn has_entry_extension(&self, path: &Path) -> bool {
        let ext = extension(path);
        self.settings.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn sidecar_path(anchor: &Path) -> Option<PathBuf> {
    let stem = if anchor.is_dir() {
        anchor.file_name()?
    } else {
        anchor.file_stem()?
    };
    let mut name = stem.to_os_string();
    name.push(META_SUFFIX);
    Some(anchor.with_file_name(name))
}

/// Sibling files of a directory entry's primary file, sorted.
/// Kind folders directly under a modular base belong to no module and are
/// left out of the scan.
fn warn_unscanned_kind_folders(base: &Path, origin: &Origin<'_>, result: &mut ScanResult) {
    for kind in EntryKind::ALL {
        for folder in kind.folder_names() {
            let path = base.join(folder);
            if path.is_dir() {
                result.warnings.push(SourceWarning::at(
                    &origin.label,
                    &path,
                    format!("'{folder}' sits beside module directories and is not scanned; move it into a module"),
                ));
            }
        }
    }
}

/// `<manifest dir>/agents/<module>-<name>.customize.yaml`, when present.
fn agent_customization(manifest_dir: &Path, module: Option<&str>, name: &str) -> Option<PathBuf> {
    let module = module?;
    let path = manifest_dir
        .join(CUSTOMIZE_DIR)
        .join(format!("{module}-{name}{CUSTOMIZE_SUFFIX}"));
    path.is_file().then_some(path)
}

fn list_additional_files(dir: &Path, primary: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file() && e.path() != primary)
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .filter(|name| !name.starts_with('.') && !name.ends_with(META_SUFFIX))
        .collect();
    files.sort();
    files
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
