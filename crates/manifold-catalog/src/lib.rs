//! # manifold-catalog
//!
//! Discovery and loading of agents, workflows and resources across
//! prioritized source roots.
//!
//! - [`SourceScanner`]: one root to entries, flat or modular, with
//!   descriptor, CSV manifest or directory-shape layout detection
//! - [`ManifestAggregator`]: every root, materialized concurrently and
//!   merged by priority into an immutable [`Catalog`]
//! - [`CatalogStore`]: atomic publication of the current catalog
//! - [`NameResolver`]: name validation, aliases, prefixes and suggestions
//! - [`load_content`]: byte-exact reads confined to the source root
//! - [`CatalogService`]: the facade a transport calls

#![deny(unsafe_code)]

pub mod aggregator;
pub mod constants;
pub mod content;
pub mod layout;
pub mod lookup;
pub mod manifest;
pub mod parser;
pub mod scanner;
pub mod service;
pub mod types;

pub use aggregator::{Catalog, CatalogStore, ManifestAggregator};
pub use content::{LoadedContent, load_companion, load_content};
pub use layout::{LayoutCache, LayoutKind, LayoutOrigin, LayoutPlan, detect_layout};
pub use lookup::{NameQuery, NameResolver, Resolution, validate_name};
pub use scanner::{ScanResult, SourceScanner};
pub use service::{
    CatalogRequest, CatalogResponse, CatalogService, DiscoverRequest, DiscoverResponse, LoadOutcome,
    LoadRequest,
};
pub use types::SourceWarning;
