// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier's `courier.toml` settings.
//!
//! Layers `/etc/courier`, the user config dir, `./courier.toml` and
//! `COURIER_*` environment variables into a [`CourierConfig`], rejects
//! unknown keys and reports problems as miette diagnostics.
//!
//! ```no_run
//! let config = courier_config::load_and_validate().expect("invalid configuration");
//! println!("database: {}", config.storage.database_path);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, ConfigSources, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    CourierConfig, InboxConfig, LogConfig, OutboxConfig, RetentionConfig, SinkConfig, SinkKind,
    StorageConfig,
};

/// Load from the standard locations, then validate.
pub fn load_and_validate() -> Result<CourierConfig, Vec<ConfigError>> {
    checked(loader::load_config(), || {
        ConfigSources::read(loader::config_paths())
    })
}

/// Load `path` plus environment overrides, then validate.
pub fn load_and_validate_path(path: &Path) -> Result<CourierConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_path(path), || {
        ConfigSources::read([path])
    })
}

/// Parse and validate an in-memory TOML document.
pub fn load_and_validate_str(toml_content: &str) -> Result<CourierConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_str(toml_content), || {
        ConfigSources::inline(toml_content)
    })
}

// Sources are only read back when extraction failed.
fn checked(
    loaded: Result<CourierConfig, figment::Error>,
    sources: impl FnOnce() -> ConfigSources,
) -> Result<CourierConfig, Vec<ConfigError>> {
    let config =
        loaded.map_err(|err| diagnostic::figment_to_config_errors(err, &sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}
