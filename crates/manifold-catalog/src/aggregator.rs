//! Catalog aggregation.
//!
//! Materializes every selected source concurrently, scans each one, then
//! merges in ascending priority order: the first source to provide a
//! `(module, name, kind)` wins and later copies are shadowed. Failed sources
//! become warnings; a build never fails as a whole.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use manifold_core::{CatalogEntry, DiscoveryMode, EntryKey, EntryKind, SourceLocator, SourceRoot};
use manifold_vcs::CacheResolver;
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::scanner::{ScanResult, SourceScanner};
use crate::types::SourceWarning;

/// Immutable merged view of all sources at one point in time.
#[derive(Clone, Debug)]
pub struct Catalog {
    entries: BTreeMap<EntryKey, CatalogEntry>,
    warnings: Vec<SourceWarning>,
    built_at: DateTime<Utc>,
    mode: DiscoveryMode,
}

impl Catalog {
    /// Catalog from already merged parts.
    pub fn new(
        entries: impl IntoIterator<Item = CatalogEntry>,
        warnings: Vec<SourceWarning>,
        mode: DiscoveryMode,
    ) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.key(), e)).collect(),
            warnings,
            built_at: Utc::now(),
            mode,
        }
    }

    /// Entry by exact key.
    pub fn get(&self, key: &EntryKey) -> Option<&CatalogEntry> {
        self.entries.get(key)
    }

    /// All entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Problems met while building.
    pub fn warnings(&self) -> &[SourceWarning] {
        &self.warnings
    }

    /// Build time.
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Discovery mode this catalog was built with.
    pub fn mode(&self) -> DiscoveryMode {
        self.mode
    }

    /// Entries named `name`, optionally narrowed by module and kind.
    ///
    /// Names compare exactly. Results come back in key order.
    pub fn find(&self, name: &str, module: Option<&str>, kind: Option<EntryKind>) -> Vec<&CatalogEntry> {
        self.entries
            .values()
            .filter(|e| e.name == name)
            .filter(|e| module.is_none() || e.module.as_deref() == module)
            .filter(|e| kind.is_none_or(|k| e.kind == k))
            .collect()
    }

    /// Distinct entry names, optionally of one kind, sorted.
    pub fn names(&self, kind: Option<EntryKind>) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .values()
            .filter(|e| kind.is_none_or(|k| e.kind == k))
            .map(|e| e.name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// The currently published catalog.
///
/// Readers take an `Arc` snapshot and never observe a half-built catalog;
/// publishing swaps the whole value.
#[derive(Debug, Default)]
pub struct CatalogStore {
    current: RwLock<Option<Arc<Catalog>>>,
}

impl CatalogStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, if one was published.
    pub fn snapshot(&self) -> Option<Arc<Catalog>> {
        self.current.read().clone()
    }

    /// Replace the snapshot and return it.
    pub fn publish(&self, catalog: Catalog) -> Arc<Catalog> {
        let catalog = Arc::new(catalog);
        *self.current.write() = Some(Arc::clone(&catalog));
        catalog
    }

    /// Drop the snapshot.
    pub fn clear(&self) {
        *self.current.write() = None;
    }
}

/// Builds catalogs from source roots.
#[derive(Clone)]
pub struct ManifestAggregator {
    resolver: CacheResolver,
    scanner: Arc<SourceScanner>,
}

impl ManifestAggregator {
    /// Aggregator materializing remotes through `resolver`.
    pub fn new(resolver: CacheResolver, scanner: Arc<SourceScanner>) -> Self {
        Self { resolver, scanner }
    }

    /// Remote checkout resolver.
    pub fn resolver(&self) -> &CacheResolver {
        &self.resolver
    }

    /// Source scanner.
    pub fn scanner(&self) -> &Arc<SourceScanner> {
        &self.scanner
    }

    /// Build a catalog from the roots `mode` selects.
    #[instrument(skip(self, roots), fields(roots = roots.len(), mode = ?mode))]
    pub async fn build_catalog(&self, roots: &[SourceRoot], mode: DiscoveryMode) -> Catalog {
        let mut selected: Vec<&SourceRoot> = roots.iter().filter(|r| mode.includes(r.kind)).collect();
        selected.sort_by_key(|r| r.priority);

        let results = join_all(selected.iter().map(|root| self.scan_root(root))).await;

        let mut entries: BTreeMap<EntryKey, CatalogEntry> = BTreeMap::new();
        let mut warnings = Vec::new();
        for result in results {
            warnings.extend(result.warnings);
            for entry in result.entries {
                match entries.entry(entry.key()) {
                    Entry::Vacant(slot) => {
                        let _ = slot.insert(entry);
                    }
                    Entry::Occupied(kept) => {
                        debug!(
                            key = %kept.key(),
                            kept = %kept.get().source_root.display(),
                            shadowed = %entry.source_root.display(),
                            "entry shadowed by higher-priority source"
                        );
                    }
                }
            }
        }

        let catalog = Catalog::new(entries.into_values(), warnings, mode);
        info!(
            entries = catalog.len(),
            warnings = catalog.warnings().len(),
            "catalog built"
        );
        catalog
    }

    async fn scan_root(&self, root: &SourceRoot) -> ScanResult {
        let label = root.label();
        let dir = match self.materialize(root).await {
            Ok(Some(dir)) => dir,
            Ok(None) => return ScanResult::default(),
            Err(warning) => {
                warn!(source = %label, reason = %warning.message, "source unavailable, skipping");
                return ScanResult {
                    warnings: vec![warning],
                    ..ScanResult::default()
                };
            }
        };

        let scanner = Arc::clone(&self.scanner);
        let owned = root.clone();
        match tokio::task::spawn_blocking(move || scanner.scan(&dir, &owned)).await {
            Ok(result) => result,
            Err(e) => {
                warn!(source = %label, error = %e, "scan task failed");
                ScanResult {
                    warnings: vec![SourceWarning::source(label, format!("scan aborted: {e}"))],
                    ..ScanResult::default()
                }
            }
        }
    }

    /// Local directory for `root`: `None` when a local root does not exist.
    async fn materialize(&self, root: &SourceRoot) -> Result<Option<PathBuf>, SourceWarning> {
        let label = root.label();
        let dir = match &root.locator {
            SourceLocator::Local(path) => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    debug!(source = %label, "local source missing");
                    return Ok(None);
                }
                path.clone()
            }
            SourceLocator::Remote(raw) => match self.resolver.resolve_str(raw).await {
                Ok(resolved) => {
                    debug!(source = %label, outcome = ?resolved.outcome, commit = ?resolved.commit, "remote source ready");
                    resolved.root
                }
                Err(e) => {
                    let err = e.into_catalog_error(&label);
                    return Err(SourceWarning::source(&label, err.to_string()));
                }
            },
        };

        // Containment checks compare against canonical roots.
        tokio::fs::canonicalize(&dir)
            .await
            .map(Some)
            .map_err(|e| SourceWarning::at(&label, &dir, format!("cannot resolve source root: {e}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
