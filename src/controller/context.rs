// src/controller/context.rs

use std::path::PathBuf;

use crate::errors::{PipelineError, Result};

/// Identity of the allocation this process runs in.
///
/// Nomad injects these into every task's environment; they are read once at
/// startup and never come from the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessContext {
    pub job_id: String,
    pub job_name: String,
    /// The invoking stage.
    pub group_name: String,
    pub task_name: String,
    pub alloc_id: String,
    /// Allocation working directory; dynamic stage globs resolve here.
    pub alloc_dir: PathBuf,
}

impl ProcessContext {
    pub const JOB_ID: &'static str = "NOMAD_JOB_ID";
    pub const JOB_NAME: &'static str = "NOMAD_JOB_NAME";
    pub const GROUP_NAME: &'static str = "NOMAD_GROUP_NAME";
    pub const TASK_NAME: &'static str = "NOMAD_TASK_NAME";
    pub const ALLOC_ID: &'static str = "NOMAD_ALLOC_ID";
    pub const ALLOC_DIR: &'static str = "NOMAD_ALLOC_DIR";

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    ///
    /// `NOMAD_JOB_NAME` falls back to the job id and `NOMAD_ALLOC_DIR` to the
    /// current directory; everything else is required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    PipelineError::ConfigError(format!("environment variable {key} is not set"))
                })
        };

        let job_id = required(Self::JOB_ID)?;
        let job_name = lookup(Self::JOB_NAME)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| job_id.clone());

        Ok(Self {
            job_name,
            group_name: required(Self::GROUP_NAME)?,
            task_name: required(Self::TASK_NAME)?,
            alloc_id: required(Self::ALLOC_ID)?,
            alloc_dir: lookup(Self::ALLOC_DIR)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            job_id,
        })
    }
}
