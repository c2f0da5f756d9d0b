//! Git backend: the seam between the resolver and the `git` executable.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::errors::{Result, VcsError};
use crate::locator::DEFAULT_REF;

const CLONE_TIMEOUT: Duration = Duration::from_secs(300);
const FETCH_TIMEOUT: Duration = Duration::from_secs(120);
const LOCAL_TIMEOUT: Duration = Duration::from_secs(30);

static COMMIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-f]{7,40}$").unwrap());

/// Operations the resolver needs from version control.
///
/// Implementations must leave `dest` absent on a failed clone; the resolver
/// clones into a staging directory and publishes by rename.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Clone `url` at `git_ref` into `dest` (which must not exist).
    async fn clone_repo(&self, url: &str, git_ref: &str, dest: &Path) -> Result<()>;

    /// Fetch `git_ref` and move the checkout to it. Full checkouts only
    /// fast-forward and fail on divergence.
    async fn fast_forward(&self, checkout: &Path, git_ref: &str) -> Result<()>;

    /// Commit currently checked out, if it can be determined.
    async fn head_commit(&self, checkout: &Path) -> Result<Option<String>>;
}

/// [`GitBackend`] that shells out to the system `git`.
#[derive(Clone, Debug)]
pub struct GitCli {
    binary: String,
    shallow: bool,
}

impl GitCli {
    /// Backend using `binary`, cloning shallowly when `shallow` is set.
    pub fn new(binary: impl Into<String>, shallow: bool) -> Self {
        Self {
            binary: binary.into(),
            shallow,
        }
    }

    async fn run(
        &self,
        operation: &'static str,
        cwd: Option<&Path>,
        args: &[&str],
        limit: Duration,
    ) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        if let Some(dir) = cwd {
            let _ = cmd.arg("-C").arg(dir);
        }
        let _ = cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");

        debug!(operation, ?args, "running git");
        let output = timeout(limit, cmd.output())
            .await
            .map_err(|_| VcsError::Timeout {
                operation,
                secs: limit.as_secs(),
            })?
            .map_err(|source| VcsError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(VcsError::Git {
                operation,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git", true)
    }
}

#[async_trait]
impl GitBackend for GitCli {
    #[instrument(skip(self), fields(dest = %dest.display()))]
    async fn clone_repo(&self, url: &str, git_ref: &str, dest: &Path) -> Result<()> {
        let dest_str = dest.to_string_lossy().into_owned();

        // A commit cannot be named by `--branch`: clone fully, then check out.
        if COMMIT_RE.is_match(git_ref) {
            let _ = self
                .run("clone", None, &["clone", "--quiet", "--", url, dest_str.as_str()], CLONE_TIMEOUT)
                .await?;
            let _ = self
                .run("checkout", Some(dest), &["checkout", "--quiet", "--detach", git_ref], LOCAL_TIMEOUT)
                .await?;
            return Ok(());
        }

        let mut args = vec!["clone", "--quiet"];
        if self.shallow {
            args.extend(["--depth", "1"]);
        }
        if git_ref != DEFAULT_REF {
            args.extend(["--branch", git_ref]);
        }
        args.extend(["--", url, dest_str.as_str()]);
        let _ = self.run("clone", None, &args, CLONE_TIMEOUT).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(checkout = %checkout.display()))]
    async fn fast_forward(&self, checkout: &Path, git_ref: &str) -> Result<()> {
        let mut fetch = vec!["fetch", "--quiet"];
        if self.shallow {
            fetch.extend(["--depth", "1"]);
        }
        fetch.extend(["origin", git_ref]);
        let _ = self.run("fetch", Some(checkout), &fetch, FETCH_TIMEOUT).await?;

        // Depth-1 history has no merge base; shallow checkouts track the remote tip.
        if self.shallow {
            let _ = self
                .run("reset", Some(checkout), &["reset", "--hard", "--quiet", "FETCH_HEAD"], LOCAL_TIMEOUT)
                .await?;
        } else {
            let _ = self
                .run("merge", Some(checkout), &["merge", "--ff-only", "--quiet", "FETCH_HEAD"], LOCAL_TIMEOUT)
                .await?;
        }
        Ok(())
    }

    async fn head_commit(&self, checkout: &Path) -> Result<Option<String>> {
        let out = self
            .run("rev-parse", Some(checkout), &["rev-parse", "HEAD"], LOCAL_TIMEOUT)
            .await?;
        Ok(Some(out).filter(|s| !s.is_empty()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
