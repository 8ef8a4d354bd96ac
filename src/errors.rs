// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::nomad::EngineError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("can't convert tag ({tag}) of value ({value}) to {expected}")]
    TagParse {
        tag: String,
        value: String,
        expected: &'static str,
    },

    #[error("{relation} stage specified in stage ({source_stage}) not found in job: {missing}")]
    UnknownStage {
        source_stage: String,
        missing: String,
        relation: &'static str,
    },

    #[error("pipeline controlled stage must have a zero count: {stage} (count = {count})")]
    NonZeroCount { stage: String, count: u32 },

    #[error("Cycle detected in stage graph: {0}")]
    DagCycle(String),

    #[error("No root stage found: {0}")]
    NoRootStage(String),

    #[error("Stage not found in job: {0}")]
    StageNotFound(String),

    #[error("dynamic tasks error at ({path}): {reason}")]
    DynamicTasks { path: String, reason: String },

    #[error("job modify index conflict: {0}")]
    Conflict(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Event stream error: {0}")]
    Stream(String),

    #[error("wait cancelled before stages finished")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<EngineError> for PipelineError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Conflict(msg) => PipelineError::Conflict(msg),
            other => PipelineError::Engine(other.to_string()),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipelineError>;
