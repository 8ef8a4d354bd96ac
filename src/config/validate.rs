// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{PipelineError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::PipelineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.nomad, raw.stream))
    }
}

/// Check basic invariants of a raw config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_nomad(cfg)?;
    validate_stream(cfg)?;
    Ok(())
}

fn validate_nomad(cfg: &RawConfigFile) -> Result<()> {
    let address = cfg.nomad.address.trim();
    if !(address.starts_with("http://") || address.starts_with("https://")) {
        return Err(PipelineError::ConfigError(format!(
            "[nomad].address must start with http:// or https:// (got '{}')",
            cfg.nomad.address
        )));
    }

    if cfg.nomad.timeout_secs == 0 {
        return Err(PipelineError::ConfigError(
            "[nomad].timeout_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_stream(cfg: &RawConfigFile) -> Result<()> {
    if cfg.stream.max_consecutive_errors == 0 {
        return Err(PipelineError::ConfigError(
            "[stream].max_consecutive_errors must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.stream.buffer == 0 {
        return Err(PipelineError::ConfigError(
            "[stream].buffer must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}
