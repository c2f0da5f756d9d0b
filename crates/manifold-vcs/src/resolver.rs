//! Cache resolver: turns a remote locator into a local directory.
//!
//! At most one clone or update runs per cache key within the process. A
//! caller that arrives while another materializes the same key waits and
//! reuses that result. Materialization runs on its own task, so a caller
//! that gives up does not abort a clone halfway.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use manifold_settings::{CacheSettings, UpdatePolicy, expand_home};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::errors::{Result, VcsError};
use crate::git::{GitBackend, GitCli};
use crate::locator::RemoteLocator;
use crate::sidecar::{CHECKOUT_DIR, CacheEntry, SyncRecord};

/// Longest freshness window honored (ten years).
const MAX_FRESH_SECS: u64 = 315_360_000;

/// Resolver configuration.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    /// Root of the checkout cache.
    pub cache_dir: PathBuf,
    /// What to do with an existing checkout.
    pub policy: UpdatePolicy,
    /// Syncs younger than this are reused without a network call.
    pub fresh_for: chrono::Duration,
}

impl ResolverConfig {
    /// Config rooted at `cache_dir` with the given policy and no freshness window.
    pub fn new(cache_dir: impl Into<PathBuf>, policy: UpdatePolicy) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            policy,
            fresh_for: chrono::Duration::zero(),
        }
    }

    /// Config from loaded cache settings.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(expand_home(&settings.dir), settings.update_policy)
            .with_fresh_for_secs(settings.fresh_for_secs)
    }

    /// Set the freshness window.
    #[must_use]
    pub fn with_fresh_for_secs(mut self, secs: u64) -> Self {
        let secs = i64::try_from(secs.min(MAX_FRESH_SECS)).unwrap_or(0);
        self.fresh_for = chrono::Duration::seconds(secs);
        self
    }
}

/// How a resolve obtained its checkout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncOutcome {
    /// First clone of this key.
    Cloned,
    /// Existing checkout fast-forwarded.
    Updated,
    /// Existing checkout replaced after a failed fast-forward.
    Recloned,
    /// Existing checkout used without touching the network.
    Cached,
    /// Update failed; the previous checkout is served as-is.
    StaleFallback,
}

/// A materialized remote source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedCheckout {
    /// Cache key.
    pub key: String,
    /// Checkout directory.
    pub checkout: PathBuf,
    /// Content root: the checkout joined with the locator's subpath.
    pub root: PathBuf,
    /// Commit checked out, when known.
    pub commit: Option<String>,
    /// How the checkout was obtained.
    pub outcome: SyncOutcome,
}

#[derive(Clone, Debug)]
struct CompletedSync {
    at: Instant,
    commit: Option<String>,
}

struct Inner {
    config: ResolverConfig,
    backend: Arc<dyn GitBackend>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    completed: DashMap<String, CompletedSync>,
}

/// Materializes remote locators into the checkout cache.
///
/// Cheap to clone; clones share locks and state.
#[derive(Clone)]
pub struct CacheResolver {
    inner: Arc<Inner>,
}

impl CacheResolver {
    /// Resolver over `backend`.
    pub fn new(config: ResolverConfig, backend: Arc<dyn GitBackend>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                backend,
                locks: DashMap::new(),
                completed: DashMap::new(),
            }),
        }
    }

    /// Resolver using the system `git` as configured.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        let backend = GitCli::new(settings.git_binary.clone(), settings.shallow);
        Self::new(ResolverConfig::from_settings(settings), Arc::new(backend))
    }

    /// Resolver configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    /// Parse `raw` and resolve it.
    pub async fn resolve_str(&self, raw: &str) -> Result<ResolvedCheckout> {
        let locator = RemoteLocator::parse(raw)?;
        self.resolve(&locator).await
    }

    /// Materialize `locator` and return its content root.
    ///
    /// Blocks only the current key: resolves of other keys proceed in
    /// parallel.
    #[instrument(skip(self), fields(locator = %locator))]
    pub async fn resolve(&self, locator: &RemoteLocator) -> Result<ResolvedCheckout> {
        let requested = Instant::now();
        let inner = Arc::clone(&self.inner);
        let owned = locator.clone();
        let task = tokio::spawn(async move { inner.materialize(&owned, requested).await });
        let (checkout, commit, outcome) = task
            .await
            .map_err(|e| VcsError::TaskAborted(e.to_string()))??;

        let root = match &locator.subpath {
            Some(sub) => checkout.join(sub),
            None => checkout.clone(),
        };
        if !is_dir(&root).await {
            return Err(VcsError::SubpathNotFound {
                subpath: locator.subpath.clone().unwrap_or_default(),
                checkout,
            });
        }

        Ok(ResolvedCheckout {
            key: locator.cache_key(),
            checkout,
            root,
            commit,
            outcome,
        })
    }

    /// Inspect the cache entry for `locator` without any network access.
    pub fn cache_entry(&self, locator: &RemoteLocator) -> CacheEntry {
        let config = &self.inner.config;
        CacheEntry::inspect(
            locator.cache_key(),
            config.cache_dir.join(locator.dir_name()),
            config.fresh_for,
            Utc::now(),
        )
    }

    /// Remove the cache entry for `locator`. Returns whether one existed.
    #[instrument(skip(self), fields(locator = %locator))]
    pub async fn evict(&self, locator: &RemoteLocator) -> Result<bool> {
        let key = locator.cache_key();
        let lock = self.inner.lock_for(&key);
        let _guard = lock.lock().await;

        let _ = self.inner.completed.remove(&key);
        let dir = self.inner.config.cache_dir.join(locator.dir_name());
        if tokio::fs::symlink_metadata(&dir).await.is_err() {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&dir).await?;
        info!(key = %key, "evicted cache entry");
        Ok(true)
    }
}

impl Inner {
    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    async fn materialize(
        &self,
        locator: &RemoteLocator,
        requested: Instant,
    ) -> Result<(PathBuf, Option<String>, SyncOutcome)> {
        let key = locator.cache_key();
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let dir = self.config.cache_dir.join(locator.dir_name());
        let checkout = dir.join(CHECKOUT_DIR);

        // A sync that completed after this request began already answers it.
        let recent = self.completed.get(&key).map(|c| c.value().clone());
        if let Some(done) = recent {
            if done.at >= requested && is_dir(&checkout).await {
                debug!(key = %key, "reusing concurrent sync");
                return Ok((checkout, done.commit, SyncOutcome::Cached));
            }
        }

        if !is_dir(&checkout).await {
            tokio::fs::create_dir_all(&dir).await?;
            self.publish_clone(locator, &dir, &checkout).await?;
            let commit = self.record_sync(locator, &key, &dir, &checkout).await;
            info!(key = %key, commit = commit.as_deref().unwrap_or("unknown"), "cloned remote source");
            return Ok((checkout, commit, SyncOutcome::Cloned));
        }

        let record = SyncRecord::load(dir.clone()).await;
        if self.config.policy == UpdatePolicy::CacheFirst {
            debug!(key = %key, "cache-first policy, using existing checkout");
            return Ok((checkout, record.and_then(|r| r.commit), SyncOutcome::Cached));
        }
        if let Some(r) = record.as_ref().filter(|r| r.is_fresh(self.config.fresh_for, Utc::now())) {
            debug!(key = %key, last_sync = %r.last_sync, "checkout is fresh");
            return Ok((checkout, r.commit.clone(), SyncOutcome::Cached));
        }
        let previous_commit = record.and_then(|r| r.commit);

        match self.backend.fast_forward(&checkout, &locator.git_ref).await {
            Ok(()) => {
                let commit = self.record_sync(locator, &key, &dir, &checkout).await;
                debug!(key = %key, "fast-forwarded checkout");
                Ok((checkout, commit, SyncOutcome::Updated))
            }
            Err(e) if e.is_network() => {
                warn!(key = %key, error = %e, "update failed, serving cached checkout");
                Ok((checkout, previous_commit, SyncOutcome::StaleFallback))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "fast-forward failed, re-cloning");
                match self.publish_clone(locator, &dir, &checkout).await {
                    Ok(()) => {
                        let commit = self.record_sync(locator, &key, &dir, &checkout).await;
                        info!(key = %key, "re-cloned remote source");
                        Ok((checkout, commit, SyncOutcome::Recloned))
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "re-clone failed, serving cached checkout");
                        Ok((checkout, previous_commit, SyncOutcome::StaleFallback))
                    }
                }
            }
        }
    }

    /// Clone into a staging directory inside `dir`, then swap it into place.
    ///
    /// A failed clone or swap leaves the current checkout (if any) in place,
    /// and the staging directory is removed on every path.
    async fn publish_clone(&self, locator: &RemoteLocator, dir: &Path, checkout: &Path) -> Result<()> {
        let parent = dir.to_path_buf();
        let staging = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(".staging-").tempdir_in(parent)
        })
        .await
        .map_err(|e| VcsError::TaskAborted(e.to_string()))??;

        let result = self.swap_in(locator, staging.path(), checkout).await;
        if let Ok(Err(e)) = tokio::task::spawn_blocking(move || staging.close()).await {
            debug!(error = %e, "could not remove staging directory");
        }
        result
    }

    async fn swap_in(&self, locator: &RemoteLocator, staging: &Path, checkout: &Path) -> Result<()> {
        let fresh = staging.join("repo");
        self.backend
            .clone_repo(&locator.clone_url(), &locator.git_ref, &fresh)
            .await?;

        let previous = staging.join("previous");
        let displaced = tokio::fs::symlink_metadata(checkout).await.is_ok();
        if displaced {
            tokio::fs::rename(checkout, &previous).await?;
        }
        if let Err(e) = tokio::fs::rename(&fresh, checkout).await {
            if displaced {
                if let Err(restore) = tokio::fs::rename(&previous, checkout).await {
                    warn!(checkout = %checkout.display(), error = %restore, "could not restore previous checkout");
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn record_sync(
        &self,
        locator: &RemoteLocator,
        key: &str,
        dir: &Path,
        checkout: &Path,
    ) -> Option<String> {
        let commit = match self.backend.head_commit(checkout).await {
            Ok(commit) => commit,
            Err(e) => {
                debug!(key = %key, error = %e, "could not read head commit");
                None
            }
        };
        let record = SyncRecord {
            locator: locator.to_string(),
            git_ref: locator.git_ref.clone(),
            commit: commit.clone(),
            last_sync: Utc::now(),
        };
        if let Err(e) = record.store(dir.to_path_buf()).await {
            warn!(key = %key, error = %e, "failed to write sync record");
        }
        let _ = self.completed.insert(
            key.to_string(),
            CompletedSync {
                at: Instant::now(),
                commit: commit.clone(),
            },
        );
        commit
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sidecar::CacheState;
    use crate::testing::{FakeGit, FetchFailure};
    use assert_matches::assert_matches;
    use std::time::Duration;
    use tempfile::TempDir;

    const URL: &str = "https://github.com/org/repo.git";

    fn setup(policy: UpdatePolicy) -> (TempDir, Arc<FakeGit>, CacheResolver) {
        let tmp = TempDir::new().unwrap();
        let git = Arc::new(FakeGit::new());
        git.publish(URL, "main", &[("agents/analyst.md", "v1")]);
        let resolver = CacheResolver::new(
            ResolverConfig::new(tmp.path().join("cache"), policy),
            git.clone(),
        );
        (tmp, git, resolver)
    }

    fn locator(raw: &str) -> RemoteLocator {
        RemoteLocator::parse(raw).unwrap()
    }

    fn read(root: &Path, rel: &str) -> String {
        std::fs::read_to_string(root.join(rel)).unwrap()
    }

    #[tokio::test]
    async fn first_resolve_clones_then_cache_hit() {
        let (_tmp, git, resolver) = setup(UpdatePolicy::CacheFirst);
        let loc = locator("org/repo#main");

        let first = resolver.resolve(&loc).await.unwrap();
        assert_eq!(first.outcome, SyncOutcome::Cloned);
        assert_eq!(read(&first.root, "agents/analyst.md"), "v1");
        assert!(first.commit.is_some());

        let second = resolver.resolve(&loc).await.unwrap();
        assert_eq!(second.outcome, SyncOutcome::Cached);
        assert_eq!(second.checkout, first.checkout);
        assert_eq!(git.clone_count(), 1);
        assert_eq!(git.fetch_count(), 0);
    }

    #[tokio::test]
    async fn fresh_checkout_skips_network() {
        let tmp = TempDir::new().unwrap();
        let git = Arc::new(FakeGit::new());
        git.publish(URL, "main", &[("agents/a.md", "x")]);
        let config = ResolverConfig::new(tmp.path(), UpdatePolicy::AutoUpdate).with_fresh_for_secs(3600);
        let resolver = CacheResolver::new(config, git.clone());
        let loc = locator("org/repo#main");

        let _ = resolver.resolve(&loc).await.unwrap();
        let again = resolver.resolve(&loc).await.unwrap();
        assert_eq!(again.outcome, SyncOutcome::Cached);
        assert_eq!(git.fetch_count(), 0);
        assert_eq!(resolver.cache_entry(&loc).state, CacheState::Fresh);
    }

    #[tokio::test]
    async fn auto_update_fast_forwards_stale_checkout() {
        let (_tmp, git, resolver) = setup(UpdatePolicy::AutoUpdate);
        let loc = locator("org/repo#main");
        let _ = resolver.resolve(&loc).await.unwrap();

        git.publish(URL, "main", &[("agents/analyst.md", "v2")]);
        let updated = resolver.resolve(&loc).await.unwrap();
        assert_eq!(updated.outcome, SyncOutcome::Updated);
        assert_eq!(read(&updated.root, "agents/analyst.md"), "v2");
        assert_eq!(git.fetch_count(), 1);
        assert_eq!(git.clone_count(), 1);
    }

    #[tokio::test]
    async fn network_failure_serves_stale_checkout() {
        let (_tmp, git, resolver) = setup(UpdatePolicy::AutoUpdate);
        let loc = locator("org/repo#main");
        let _ = resolver.resolve(&loc).await.unwrap();

        git.publish(URL, "main", &[("agents/analyst.md", "v2")]);
        git.set_fetch_failure(Some(FetchFailure::Network));
        let stale = resolver.resolve(&loc).await.unwrap();
        assert_eq!(stale.outcome, SyncOutcome::StaleFallback);
        assert_eq!(read(&stale.root, "agents/analyst.md"), "v1");
        assert_eq!(git.clone_count(), 1);
    }

    #[tokio::test]
    async fn stale_fallback_is_logged() {
        let (_tmp, git, resolver) = setup(UpdatePolicy::AutoUpdate);
        let loc = locator("org/repo#main");
        let _ = resolver.resolve(&loc).await.unwrap();

        let (logs, _guard) = manifold_logging::capture_logs();
        git.set_fetch_failure(Some(FetchFailure::Network));
        let _ = resolver.resolve(&loc).await.unwrap();
        assert!(logs.has_event(tracing::Level::WARN, "serving cached checkout"));
        assert!(logs.has_field("key", &loc.cache_key()));
    }

    #[tokio::test]
    async fn divergence_triggers_reclone() {
        let (_tmp, git, resolver) = setup(UpdatePolicy::AutoUpdate);
        let loc = locator("org/repo#main");
        let _ = resolver.resolve(&loc).await.unwrap();

        git.publish(URL, "main", &[("agents/pm.md", "rewritten")]);
        git.set_fetch_failure(Some(FetchFailure::Diverged));
        let fresh = resolver.resolve(&loc).await.unwrap();
        assert_eq!(fresh.outcome, SyncOutcome::Recloned);
        assert_eq!(read(&fresh.root, "agents/pm.md"), "rewritten");
        assert!(!fresh.root.join("agents/analyst.md").exists());
        assert_eq!(git.clone_count(), 2);
    }

    #[tokio::test]
    async fn failed_clone_leaves_no_checkout() {
        let (tmp, git, resolver) = setup(UpdatePolicy::AutoUpdate);
        git.set_clone_failure(true);
        let loc = locator("org/repo#main");

        let err = resolver.resolve(&loc).await.unwrap_err();
        assert_matches!(err, VcsError::Git { operation: "clone", .. });
        assert_eq!(resolver.cache_entry(&loc).state, CacheState::Absent);

        let entry_dir = tmp.path().join("cache").join(loc.dir_name());
        let leftovers: Vec<_> = std::fs::read_dir(&entry_dir).unwrap().collect();
        assert!(leftovers.is_empty(), "staging directory was not cleaned up");

        git.set_clone_failure(false);
        let ok = resolver.resolve(&loc).await.unwrap();
        assert_eq!(ok.outcome, SyncOutcome::Cloned);
    }

    /// Reports a clone as done without producing one, and never fast-forwards.
    struct HollowClone;

    #[async_trait::async_trait]
    impl GitBackend for HollowClone {
        async fn clone_repo(&self, _url: &str, _git_ref: &str, _dest: &Path) -> Result<()> {
            Ok(())
        }

        async fn fast_forward(&self, _checkout: &Path, _git_ref: &str) -> Result<()> {
            Err(VcsError::Git {
                operation: "merge",
                stderr: "fatal: Not possible to fast-forward, aborting.".into(),
            })
        }

        async fn head_commit(&self, _checkout: &Path) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn failed_swap_restores_previous_checkout() {
        let (tmp, _git, resolver) = setup(UpdatePolicy::AutoUpdate);
        let loc = locator("org/repo#main");
        let first = resolver.resolve(&loc).await.unwrap();

        let broken = CacheResolver::new(
            ResolverConfig::new(tmp.path().join("cache"), UpdatePolicy::AutoUpdate),
            Arc::new(HollowClone),
        );
        let served = broken.resolve(&loc).await.unwrap();
        assert_eq!(served.outcome, SyncOutcome::StaleFallback);
        assert_eq!(served.checkout, first.checkout);
        assert_eq!(read(&served.root, "agents/analyst.md"), "v1");

        let entry_dir = tmp.path().join("cache").join(loc.dir_name());
        let staging: Vec<_> = std::fs::read_dir(&entry_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
            .collect();
        assert!(staging.is_empty());
    }

    #[tokio::test]
    async fn concurrent_resolves_clone_once() {
        let tmp = TempDir::new().unwrap();
        let git = Arc::new(FakeGit::new().with_delay(Duration::from_millis(50)));
        git.publish(URL, "main", &[("agents/a.md", "x")]);
        let resolver = CacheResolver::new(
            ResolverConfig::new(tmp.path(), UpdatePolicy::AutoUpdate),
            git.clone(),
        );
        let loc = locator("org/repo#main");

        let results = futures::future::join_all((0..8).map(|_| resolver.resolve(&loc))).await;
        let checkouts: Vec<PathBuf> = results.into_iter().map(|r| r.unwrap().checkout).collect();
        assert!(checkouts.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(git.clone_count(), 1);
        assert_eq!(git.fetch_count(), 0);
        assert_eq!(git.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn distinct_refs_resolve_independently() {
        let tmp = TempDir::new().unwrap();
        let git = Arc::new(FakeGit::new().with_delay(Duration::from_millis(20)));
        git.publish(URL, "main", &[("agents/a.md", "main")]);
        git.publish(URL, "dev", &[("agents/a.md", "dev")]);
        let resolver = CacheResolver::new(
            ResolverConfig::new(tmp.path(), UpdatePolicy::AutoUpdate),
            git.clone(),
        );

        let (main, dev) = tokio::join!(
            resolver.resolve_str("org/repo#main"),
            resolver.resolve_str("org/repo#dev"),
        );
        let (main, dev) = (main.unwrap(), dev.unwrap());
        assert_ne!(main.key, dev.key);
        assert_ne!(main.checkout, dev.checkout);
        assert_eq!(read(&main.root, "agents/a.md"), "main");
        assert_eq!(read(&dev.root, "agents/a.md"), "dev");
        assert_eq!(git.clone_count(), 2);
    }

    #[tokio::test]
    async fn abandoned_resolve_still_completes_clone() {
        let tmp = TempDir::new().unwrap();
        let git = Arc::new(FakeGit::new().with_delay(Duration::from_millis(100)));
        git.publish(URL, "main", &[("agents/a.md", "x")]);
        let resolver = CacheResolver::new(
            ResolverConfig::new(tmp.path(), UpdatePolicy::AutoUpdate),
            git.clone(),
        );
        let loc = locator("org/repo#main");

        let gave_up = tokio::time::timeout(Duration::from_millis(10), resolver.resolve(&loc)).await;
        assert!(gave_up.is_err());

        let resolved = resolver.resolve(&loc).await.unwrap();
        assert_eq!(read(&resolved.root, "agents/a.md"), "x");
        assert_eq!(git.clone_count(), 1);
    }

    #[tokio::test]
    async fn subpath_selects_directory() {
        let (_tmp, _git, resolver) = setup(UpdatePolicy::AutoUpdate);
        let resolved = resolver.resolve_str("org/repo#main:agents").await.unwrap();
        assert!(resolved.root.ends_with("checkout/agents"));
        assert_eq!(read(&resolved.root, "analyst.md"), "v1");
    }

    #[tokio::test]
    async fn missing_subpath_is_error() {
        let (_tmp, _git, resolver) = setup(UpdatePolicy::AutoUpdate);
        let err = resolver.resolve_str("org/repo#main:nope").await.unwrap_err();
        assert_matches!(err, VcsError::SubpathNotFound { .. });
    }

    #[tokio::test]
    async fn evict_removes_entry() {
        let (_tmp, git, resolver) = setup(UpdatePolicy::CacheFirst);
        let loc = locator("org/repo#main");
        let _ = resolver.resolve(&loc).await.unwrap();
        assert_ne!(resolver.cache_entry(&loc).state, CacheState::Absent);

        assert!(resolver.evict(&loc).await.unwrap());
        assert_eq!(resolver.cache_entry(&loc).state, CacheState::Absent);
        assert!(!resolver.evict(&loc).await.unwrap());

        let again = resolver.resolve(&loc).await.unwrap();
        assert_eq!(again.outcome, SyncOutcome::Cloned);
        assert_eq!(git.clone_count(), 2);
    }

    #[tokio::test]
    async fn invalid_locator_string() {
        let (_tmp, git, resolver) = setup(UpdatePolicy::AutoUpdate);
        let err = resolver.resolve_str("not a locator").await.unwrap_err();
        assert_matches!(err, VcsError::InvalidLocator { .. });
        assert_eq!(git.clone_count(), 0);
    }
}
