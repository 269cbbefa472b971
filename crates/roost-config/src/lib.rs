//! Roost configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for roost.json
//! - Config resolution (CLI → env → XDG → /etc → defaults)
//! - Semantic validation
//! - Logging configuration and subscriber setup

pub mod error;
pub mod logging;
pub mod resolve;
pub mod store;

use std::path::Path;

use tracing::debug;

pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use resolve::{resolve_config, ConfigPath, ConfigSource};
pub use store::{CompressionSpec, LoggingSection, SinkKind, SinkSpec, SinkTrigger, StoreConfig};

/// Resolve, load and validate the store configuration.
///
/// Falls back to [`StoreConfig::default`] when no file is found.
pub fn load_config(cli_path: Option<&Path>) -> ConfigResult<(StoreConfig, ConfigSource)> {
    let resolved = resolve_config(cli_path);
    let config = match &resolved.path {
        Some(path) => StoreConfig::from_file(path)?,
        None => StoreConfig::default(),
    };
    config.validate()?;
    debug!(
        source = %resolved.source,
        path = ?resolved.path,
        sinks = config.sinks.len(),
        "loaded config"
    );
    Ok((config, resolved.source))
}
