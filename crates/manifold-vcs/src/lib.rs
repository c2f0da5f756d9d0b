//! # manifold-vcs
//!
//! Local cache of remote repository checkouts.
//!
//! - [`RemoteLocator`]: locator grammar, clone URL, and cache key
//! - [`CacheResolver`]: materializes a locator, one clone/update per key at a time
//! - [`GitBackend`] / [`GitCli`]: version control seam backed by the `git` executable
//! - [`SyncRecord`] / [`CacheEntry`]: the `sync.json` sidecar and entry inspection
//!
//! Enable the `test-utils` feature for [`testing::FakeGit`].

#![deny(unsafe_code)]

pub mod errors;
pub mod git;
pub mod locator;
pub mod resolver;
pub mod sidecar;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use errors::{Result, VcsError};
pub use git::{GitBackend, GitCli};
pub use locator::{DEFAULT_HOST, DEFAULT_REF, RemoteLocator, Transport};
pub use resolver::{CacheResolver, ResolvedCheckout, ResolverConfig, SyncOutcome};
pub use sidecar::{CacheEntry, CacheState, SyncRecord};
