//! Remote locator grammar and cache keys.
//!
//! Accepted forms:
//!
//! | Form | Example |
//! |------|---------|
//! | HTTPS | `https://gitlab.com/org/repo.git#v2:bmad` |
//! | SSH | `git@github.com:org/repo#main` |
//! | Shorthand | `github:org/repo` |
//! | Bare | `org/repo#main:agents` |
//!
//! Shorthand and bare forms resolve against `github.com`. The optional
//! `#ref` defaults to `HEAD` (the remote's default branch); the optional
//! `:subpath` selects a directory inside the checkout.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::errors::{Result, VcsError};

/// Ref used when the locator names none.
pub const DEFAULT_REF: &str = "HEAD";

/// Host assumed by shorthand and bare locators.
pub const DEFAULT_HOST: &str = "github.com";

static SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());

static REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]*$").unwrap());

static HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.-]*(:[0-9]{1,5})?$").unwrap());

/// Transport a locator clones over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transport {
    /// `https://` (also used for shorthand forms).
    Https,
    /// `http://`.
    Http,
    /// `git@host:` style SSH.
    Ssh,
}

/// A parsed remote repository locator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteLocator {
    /// Clone transport.
    pub transport: Transport,
    /// Repository host, optionally with port.
    pub host: String,
    /// Organization or owner (may contain `/` for nested groups).
    pub organization: String,
    /// Repository name without `.git`.
    pub repository: String,
    /// Branch, tag, or commit.
    pub git_ref: String,
    /// Directory inside the checkout that holds the content.
    pub subpath: Option<PathBuf>,
}

impl RemoteLocator {
    /// Parse a locator string.
    pub fn parse(raw: &str) -> Result<Self> {
        let input = raw.trim();
        let invalid = |reason: &str| VcsError::InvalidLocator {
            locator: raw.to_string(),
            reason: reason.to_string(),
        };
        if input.is_empty() {
            return Err(invalid("empty locator"));
        }
        if input.chars().any(char::is_whitespace) {
            return Err(invalid("whitespace is not allowed"));
        }

        let (transport, host, rest) = if let Some(rest) = input.strip_prefix("https://") {
            let (host, path) = rest.split_once('/').ok_or_else(|| invalid("missing repository path"))?;
            (Transport::Https, host.to_string(), path)
        } else if let Some(rest) = input.strip_prefix("http://") {
            let (host, path) = rest.split_once('/').ok_or_else(|| invalid("missing repository path"))?;
            (Transport::Http, host.to_string(), path)
        } else if let Some(rest) = input.strip_prefix("git@") {
            let (host, path) = rest.split_once(':').ok_or_else(|| invalid("ssh locator needs 'host:path'"))?;
            (Transport::Ssh, host.to_string(), path)
        } else if let Some(rest) = input.strip_prefix("github:") {
            (Transport::Https, DEFAULT_HOST.to_string(), rest)
        } else if input.contains("://") {
            return Err(invalid("unsupported scheme"));
        } else {
            (Transport::Https, DEFAULT_HOST.to_string(), input)
        };

        if !HOST_RE.is_match(&host) {
            return Err(invalid("invalid host"));
        }

        // Git refs cannot contain ':', so the first colon starts the subpath.
        let (spec, subpath) = match rest.split_once(':') {
            Some((spec, sub)) => (spec, Some(sub)),
            None => (rest, None),
        };
        let (path, git_ref) = match spec.split_once('#') {
            Some((path, r)) if r.is_empty() => (path, DEFAULT_REF),
            Some((path, r)) => (path, r),
            None => (spec, DEFAULT_REF),
        };

        let path = path.trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() < 2 {
            return Err(invalid("expected 'org/repo'"));
        }
        if segments.iter().any(|s| !SEGMENT_RE.is_match(s)) {
            return Err(invalid("invalid organization or repository name"));
        }
        // Only explicit hosts may use nested groups.
        if segments.len() > 2 && host == DEFAULT_HOST {
            return Err(invalid("github locators take exactly 'org/repo'"));
        }

        if git_ref != DEFAULT_REF && (!REF_RE.is_match(git_ref) || git_ref.contains("..")) {
            return Err(invalid("invalid ref"));
        }

        let subpath = match subpath {
            None | Some("") => None,
            Some(sub) => Some(validate_subpath(sub).ok_or_else(|| invalid("subpath must be relative without '..'"))?),
        };

        let (organization, repository) = segments.split_at(segments.len() - 1);
        Ok(Self {
            transport,
            host,
            organization: organization.join("/"),
            repository: repository[0].to_string(),
            git_ref: git_ref.to_string(),
            subpath,
        })
    }

    /// URL handed to `git clone`.
    pub fn clone_url(&self) -> String {
        match self.transport {
            Transport::Https => format!("https://{}/{}/{}.git", self.host, self.organization, self.repository),
            Transport::Http => format!("http://{}/{}/{}.git", self.host, self.organization, self.repository),
            Transport::Ssh => format!("git@{}:{}/{}.git", self.host, self.organization, self.repository),
        }
    }

    /// Stable cache key over `(host, organization, repository, ref)`.
    ///
    /// The subpath is excluded: several subpaths of one repository at one
    /// ref share a checkout.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.host.to_lowercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.organization.to_lowercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.repository.to_lowercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.git_ref.as_bytes());
        let digest = hasher.finalize();
        digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
    }

    /// Cache directory name: `<org>-<repo>-<key>`.
    pub fn dir_name(&self) -> String {
        format!(
            "{}-{}-{}",
            self.organization.replace('/', "-"),
            self.repository,
            self.cache_key()
        )
    }
}

impl fmt::Display for RemoteLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}#{}", self.host, self.organization, self.repository, self.git_ref)?;
        if let Some(sub) = &self.subpath {
            write!(f, ":{}", sub.display())?;
        }
        Ok(())
    }
}

fn validate_subpath(raw: &str) -> Option<PathBuf> {
    let path = Path::new(raw.trim_end_matches('/'));
    if path.as_os_str().is_empty() {
        return None;
    }
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        .then(|| path.to_path_buf())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
