// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** validate. Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load the config used by the agent commands.
///
/// A missing file is not an error: defaults are used. Environment overrides
/// (via `env`) are applied before validation.
pub fn load_with_env<F>(path: impl AsRef<Path>, env: F) -> Result<ConfigFile>
where
    F: Fn(&str) -> Option<String>,
{
    let path = path.as_ref();

    let mut raw = if path.exists() {
        load_from_path(path)?
    } else {
        warn!(path = %path.display(), "config file doesn't exist; using defaults");
        RawConfigFile::default()
    };

    raw.apply_env(env);
    ConfigFile::try_from(raw)
}

/// Default config path: `nomad-pipeline.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("nomad-pipeline.toml")
}
