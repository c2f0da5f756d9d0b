//! In-memory [`GitBackend`] for tests.
//!
//! Repositories are published as file lists keyed by clone URL and ref.
//! Clones and fast-forwards write the currently published files; counters
//! record how often each operation ran and how many clones overlapped.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::{Result, VcsError};
use crate::git::GitBackend;

const ORIGIN_FILE: &str = ".fake-origin";
const HEAD_FILE: &str = ".fake-head";

/// How a fake fetch should fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchFailure {
    /// Remote unreachable.
    Network,
    /// Local and remote histories diverged.
    Diverged,
}

#[derive(Clone, Debug, Default)]
struct Published {
    revision: u64,
    files: Vec<(String, String)>,
}

/// Scriptable git backend.
#[derive(Debug, Default)]
pub struct FakeGit {
    repos: Mutex<HashMap<(String, String), Published>>,
    delay: Duration,
    fail_clone: AtomicBool,
    fetch_failure: Mutex<Option<FetchFailure>>,
    clones: AtomicUsize,
    fetches: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeGit {
    /// Empty backend with no repositories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every clone and fetch take `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Publish (or replace) the content of `url` at `git_ref`.
    pub fn publish(&self, url: &str, git_ref: &str, files: &[(&str, &str)]) {
        let mut repos = self.repos.lock();
        let entry = repos.entry((url.to_string(), git_ref.to_string())).or_default();
        entry.revision += 1;
        entry.files = files
            .iter()
            .map(|(p, c)| ((*p).to_string(), (*c).to_string()))
            .collect();
    }

    /// Make clones fail with a network error.
    pub fn set_clone_failure(&self, fail: bool) {
        self.fail_clone.store(fail, Ordering::SeqCst);
    }

    /// Make fast-forwards fail.
    pub fn set_fetch_failure(&self, failure: Option<FetchFailure>) {
        *self.fetch_failure.lock() = failure;
    }

    /// Clones attempted so far.
    pub fn clone_count(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    /// Fast-forwards attempted so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Largest number of clones observed running at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn lookup(&self, url: &str, git_ref: &str) -> Result<Published> {
        self.repos
            .lock()
            .get(&(url.to_string(), git_ref.to_string()))
            .cloned()
            .ok_or_else(|| VcsError::Git {
                operation: "clone",
                stderr: format!("fatal: Remote branch {git_ref} not found in upstream origin"),
            })
    }

    fn write_tree(dest: &Path, url: &str, published: &Published) -> Result<()> {
        std::fs::create_dir_all(dest)?;
        for (rel, content) in &published.files {
            let path = dest.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
        }
        std::fs::write(dest.join(ORIGIN_FILE), url)?;
        std::fs::write(dest.join(HEAD_FILE), format!("{:040x}", published.revision))?;
        Ok(())
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GitBackend for FakeGit {
    async fn clone_repo(&self, url: &str, git_ref: &str, dest: &Path) -> Result<()> {
        let _ = self.clones.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        tokio::time::sleep(self.delay).await;
        if self.fail_clone.load(Ordering::SeqCst) {
            return Err(VcsError::Git {
                operation: "clone",
                stderr: format!("fatal: unable to access '{url}': Could not resolve host"),
            });
        }
        let published = self.lookup(url, git_ref)?;
        Self::write_tree(dest, url, &published)
    }

    async fn fast_forward(&self, checkout: &Path, git_ref: &str) -> Result<()> {
        let _ = self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let failure = *self.fetch_failure.lock();
        match failure {
            Some(FetchFailure::Network) => Err(VcsError::Git {
                operation: "fetch",
                stderr: "fatal: unable to access: Could not resolve host: example.com".into(),
            }),
            Some(FetchFailure::Diverged) => Err(VcsError::Git {
                operation: "merge",
                stderr: "fatal: Not possible to fast-forward, aborting.".into(),
            }),
            None => {
                let url = std::fs::read_to_string(checkout.join(ORIGIN_FILE))?;
                let published = self.lookup(&url, git_ref)?;
                Self::write_tree(checkout, &url, &published)
            }
        }
    }

    async fn head_commit(&self, checkout: &Path) -> Result<Option<String>> {
        Ok(std::fs::read_to_string(checkout.join(HEAD_FILE)).ok())
    }
}
