//! # manifold-core
//!
//! Foundation types shared by every Manifold crate.
//!
//! - [`types`]: source roots, catalog entries, entry keys and discovery modes
//! - [`errors`]: the caller-facing [`CatalogError`] taxonomy
//!
//! Nothing in this crate touches the filesystem or the network; it only
//! describes the values the scanner, resolver and ranking engine exchange.

#![deny(unsafe_code)]

pub mod errors;
pub mod types;

pub use errors::{CatalogError, Result};
pub use types::{
    CatalogEntry, DiscoveryMode, EntryKey, EntryKind, EntryMetadata, SourceKind, SourceLocator,
    SourceRoot,
};
