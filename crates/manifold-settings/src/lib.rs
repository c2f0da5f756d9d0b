//! # manifold-settings
//!
//! Configuration for Manifold, loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ManifoldSettings::default()`]
//! 2. **User file**: `~/.manifold/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `MANIFOLD_*` overrides (highest priority)
//!
//! Parsing command-line arguments is left to the embedding transport; it can
//! build a [`ManifoldSettings`] directly and hand it to [`init_settings`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, expand_home, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton.
static SETTINGS: OnceLock<ManifoldSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.manifold/settings.json` with env
/// var overrides. If loading fails, returns compiled defaults.
pub fn get_settings() -> &'static ManifoldSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            ManifoldSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: ManifoldSettings) -> std::result::Result<(), ManifoldSettings> {
    SETTINGS.set(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = ManifoldSettings::default();
        let path = settings_path();
        assert!(path.ends_with(".manifold/settings.json"));
    }
}
