//! Locating roost.json.
//!
//! Candidates are tried in order and the first existing file wins: the
//! explicit path, `ROOST_CONFIG`, `ROOST_CONFIG_DIR/roost.json`, the XDG
//! config dir, `/etc/roost`. With none present the built-in defaults apply.

use std::fmt;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "ROOST_CONFIG";
pub const ENV_CONFIG_DIR: &str = "ROOST_CONFIG_DIR";
pub const CONFIG_FILENAME: &str = "roost.json";

const APP_DIR: &str = "roost";

/// Which candidate supplied the configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    CliArgument,
    /// `ROOST_CONFIG` or `ROOST_CONFIG_DIR`.
    Environment,
    XdgConfig,
    SystemConfig,
    #[default]
    BuiltinDefault,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::CliArgument => "CLI argument",
            ConfigSource::Environment => "environment variable",
            ConfigSource::XdgConfig => "XDG config",
            ConfigSource::SystemConfig => "system config",
            ConfigSource::BuiltinDefault => "builtin default",
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`resolve_config`]; `path` is `None` for built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPath {
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

/// Ordered candidate paths. Unset variables contribute nothing.
fn candidates(cli_path: Option<&Path>) -> Vec<(PathBuf, ConfigSource)> {
    let mut out = Vec::with_capacity(5);
    if let Some(path) = cli_path {
        out.push((path.to_path_buf(), ConfigSource::CliArgument));
    }
    if let Some(path) = std::env::var_os(ENV_CONFIG_PATH) {
        out.push((PathBuf::from(path), ConfigSource::Environment));
    }
    if let Some(dir) = std::env::var_os(ENV_CONFIG_DIR) {
        out.push((PathBuf::from(dir).join(CONFIG_FILENAME), ConfigSource::Environment));
    }
    if let Some(dir) = xdg_config_dir() {
        out.push((dir.join(CONFIG_FILENAME), ConfigSource::XdgConfig));
    }
    out.push((system_config_dir().join(CONFIG_FILENAME), ConfigSource::SystemConfig));
    out
}

/// Find the configuration file to load.
pub fn resolve_config(cli_path: Option<&Path>) -> ConfigPath {
    candidates(cli_path)
        .into_iter()
        .find(|(path, _)| path.is_file())
        .map(|(path, source)| ConfigPath {
            path: Some(path),
            source,
        })
        .unwrap_or_default()
}

/// `$XDG_CONFIG_HOME/roost` (or the platform equivalent).
pub fn xdg_config_dir() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join(APP_DIR))
}

pub fn system_config_dir() -> PathBuf {
    Path::new("/etc").join(APP_DIR)
}
