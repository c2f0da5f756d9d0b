//! Catalog service facade.
//!
//! The single entry point a transport talks to: `discover` rebuilds and
//! publishes the catalog, `load` resolves a name against the current
//! snapshot and returns content or ranked candidates.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use manifold_core::{CatalogEntry, DiscoveryMode, EntryKind, Result, SourceRoot};
use manifold_ranking::{CandidateJudge, RankedCandidate, RankingStrategy, UsageTracker, select_strategy};
use manifold_settings::ManifoldSettings;
use manifold_vcs::CacheResolver;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::aggregator::{Catalog, CatalogStore, ManifestAggregator};
use crate::content::{LoadedContent, load_companion, load_content};
use crate::lookup::{NameResolver, Resolution};
use crate::scanner::SourceScanner;
use crate::types::SourceWarning;

/// Parameters of a discover call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoverRequest {
    /// Sources taking part.
    pub mode: DiscoveryMode,
    /// Only entries of this kind.
    pub kind: Option<EntryKind>,
    /// Only entries of this module.
    pub module: Option<String>,
}

/// Result of a discover call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverResponse {
    /// Matching entries sorted by kind, module, then name.
    pub entries: Vec<CatalogEntry>,
    /// Per-source problems met during the build.
    pub warnings: Vec<SourceWarning>,
    /// When the catalog was built.
    pub built_at: DateTime<Utc>,
    /// Size of the whole catalog before filtering.
    pub total: usize,
}

/// Parameters of a load call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadRequest {
    /// Requested name, optionally `module/name`. Empty means the default agent.
    pub name: String,
    /// Module to disambiguate with.
    pub module: Option<String>,
    /// Kind to narrow to.
    pub kind: Option<EntryKind>,
    /// Sources to search; anything but `All` builds a private catalog.
    pub mode: DiscoveryMode,
    /// Free-text intent passed to the judge.
    pub query: Option<String>,
}

impl LoadRequest {
    /// Request for `name` with everything else defaulted.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Result of a load call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum LoadOutcome {
    /// The name resolved to one entry.
    Content {
        /// Entry that was read.
        entry: CatalogEntry,
        /// Raw content.
        bytes: Vec<u8>,
        /// Canonical path that was read.
        path: PathBuf,
    },
    /// Several modules provide the name.
    Ambiguous {
        /// Candidates, best first.
        candidates: Vec<RankedCandidate>,
    },
}

/// A transport call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "operation")]
pub enum CatalogRequest {
    /// Rebuild and list.
    Discover(DiscoverRequest),
    /// Resolve and read.
    Load(LoadRequest),
}

/// Answer to a [`CatalogRequest`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "operation")]
pub enum CatalogResponse {
    /// Answer to a discover call.
    Discover(DiscoverResponse),
    /// Answer to a load call.
    Load(LoadOutcome),
}

/// Discovery, lookup, ranking and loading over a fixed set of roots.
pub struct CatalogService {
    roots: Vec<SourceRoot>,
    aggregator: ManifestAggregator,
    store: CatalogStore,
    names: NameResolver,
    ranking: Arc<dyn RankingStrategy>,
    tracker: Arc<UsageTracker>,
}

impl CatalogService {
    /// Service over `settings`, materializing remotes through `resolver`.
    pub fn new(
        settings: &ManifoldSettings,
        resolver: CacheResolver,
        judge: Option<Arc<dyn CandidateJudge>>,
    ) -> Self {
        let tracker = Arc::new(UsageTracker::new());
        let ranking = select_strategy(&settings.ranking, Arc::clone(&tracker), judge);
        let scanner = Arc::new(SourceScanner::new(settings.scan.clone()));
        debug!(strategy = ranking.name(), "catalog service ready");
        Self {
            roots: settings.source_roots(),
            aggregator: ManifestAggregator::new(resolver, scanner),
            store: CatalogStore::new(),
            names: NameResolver::new(settings.lookup.clone()),
            ranking,
            tracker,
        }
    }

    /// Service using the system `git` for remotes and no judge.
    pub fn from_settings(settings: &ManifoldSettings) -> Self {
        Self::new(settings, CacheResolver::from_settings(&settings.cache), None)
    }

    /// Configured roots, by ascending priority.
    pub fn roots(&self) -> &[SourceRoot] {
        &self.roots
    }

    /// Shared usage tracker.
    pub fn tracker(&self) -> &Arc<UsageTracker> {
        &self.tracker
    }

    /// Current published catalog, if any.
    pub fn snapshot(&self) -> Option<Arc<Catalog>> {
        self.store.snapshot()
    }

    /// Rebuild from every source and publish.
    ///
    /// Layouts stay cached per root across rebuilds.
    pub async fn refresh(&self) -> Arc<Catalog> {
        let catalog = self.aggregator.build_catalog(&self.roots, DiscoveryMode::All).await;
        self.publish(catalog)
    }

    /// Rebuild the catalog and list it.
    ///
    /// Only an `All` build replaces the published snapshot; narrower modes
    /// answer from a private catalog.
    #[instrument(skip(self), fields(mode = ?request.mode))]
    pub async fn discover(&self, request: DiscoverRequest) -> DiscoverResponse {
        let catalog = if request.mode == DiscoveryMode::All {
            self.refresh().await
        } else {
            Arc::new(self.aggregator.build_catalog(&self.roots, request.mode).await)
        };

        let mut entries: Vec<CatalogEntry> = catalog
            .entries()
            .filter(|e| request.kind.is_none_or(|k| e.kind == k))
            .filter(|e| request.module.is_none() || e.module == request.module)
            .cloned()
            .collect();
        entries.sort_by(|a, b| (a.kind, &a.module, &a.name).cmp(&(b.kind, &b.module, &b.name)));

        DiscoverResponse {
            entries,
            warnings: catalog.warnings().to_vec(),
            built_at: catalog.built_at(),
            total: catalog.len(),
        }
    }

    /// Resolve `request.name` and read it, or rank the candidates when
    /// several modules provide it.
    #[instrument(skip(self), fields(name = %request.name))]
    pub async fn load(&self, request: LoadRequest) -> Result<LoadOutcome> {
        let catalog = self.catalog_for(request.mode).await;
        let resolution = self.names.resolve(
            &catalog,
            &request.name,
            request.module.as_deref(),
            request.kind,
        )?;

        match resolution {
            Resolution::Unique(entry) => self.load_entry(&entry).await,
            Resolution::Ambiguous(entries) => {
                let candidates = self.ranking.rank(entries, request.query.as_deref()).await;
                debug!(
                    candidates = candidates.len(),
                    strategy = self.ranking.name(),
                    "ambiguous name, returning ranked candidates"
                );
                Ok(LoadOutcome::Ambiguous { candidates })
            }
        }
    }

    /// Read a caller-chosen entry and record the access.
    pub async fn load_entry(&self, entry: &CatalogEntry) -> Result<LoadOutcome> {
        let LoadedContent { path, bytes } = load_content(entry).await?;
        self.tracker.record_access(&entry.key());
        Ok(LoadOutcome::Content {
            entry: entry.clone(),
            bytes,
            path,
        })
    }

    /// Read a companion file of an entry (directory sibling or agent customization).
    #[allow(clippy::unused_self)]
    pub async fn load_companion(&self, entry: &CatalogEntry, file: &str) -> Result<LoadedContent> {
        load_companion(entry, file).await
    }

    /// Dispatch a transport call.
    pub async fn handle(&self, request: CatalogRequest) -> Result<CatalogResponse> {
        match request {
            CatalogRequest::Discover(r) => Ok(CatalogResponse::Discover(self.discover(r).await)),
            CatalogRequest::Load(r) => self.load(r).await.map(CatalogResponse::Load),
        }
    }

    async fn catalog_for(&self, mode: DiscoveryMode) -> Arc<Catalog> {
        if mode != DiscoveryMode::All {
            return Arc::new(self.aggregator.build_catalog(&self.roots, mode).await);
        }
        match self.store.snapshot() {
            Some(catalog) => catalog,
            None => self.refresh().await,
        }
    }

    fn publish(&self, catalog: Catalog) -> Arc<Catalog> {
        let catalog = self.store.publish(catalog);
        info!(entries = catalog.len(), "catalog published");
        catalog
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
