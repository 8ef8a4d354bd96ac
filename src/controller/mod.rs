// src/controller/mod.rs

//! The pipeline controller.
//!
//! One controller acts for one allocation, for one invocation:
//! - `init` prepares the job and activates the root stages,
//! - `next` activates the stages following the invoking one,
//! - `wait` blocks until the given stages have finished.
//!
//! The job is read once in [`PipelineController::load`], mutated in memory,
//! and persisted with [`PipelineController::commit`].

pub mod context;
pub mod dynamic;
pub mod init;
pub mod mutator;
pub mod next;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::info;

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::nomad::api::NomadApi;
use crate::nomad::model::Job;
use crate::watch::{EventWatcher, WatchOptions};

pub use context::ProcessContext;
pub use dynamic::DynamicStages;
pub use init::{JOB_ID_SLUG, JOB_NAME_SLUG, slugify};

pub struct PipelineController<A: NomadApi> {
    ctx: ProcessContext,
    api: A,
    job: Job,
    fs: Arc<dyn FileSystem>,
    watch: WatchOptions,
}

impl<A: NomadApi> fmt::Debug for PipelineController<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineController")
            .field("ctx", &self.ctx)
            .field("job_id", &self.job.id)
            .field("job_modify_index", &self.job.job_modify_index)
            .finish_non_exhaustive()
    }
}

impl<A: NomadApi> PipelineController<A> {
    pub fn new(
        ctx: ProcessContext,
        api: A,
        job: Job,
        fs: Arc<dyn FileSystem>,
        watch: WatchOptions,
    ) -> Self {
        Self {
            ctx,
            api,
            job,
            fs,
            watch,
        }
    }

    /// Read the job named by `ctx` and build a controller around it.
    pub async fn load(
        ctx: ProcessContext,
        api: A,
        fs: Arc<dyn FileSystem>,
        watch: WatchOptions,
    ) -> Result<Self> {
        info!(job_id = %ctx.job_id, "getting job");
        let job = api.job_info(&ctx.job_id).await?;
        Ok(Self::new(ctx, api, job, fs, watch))
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn job_mut(&mut self) -> &mut Job {
        &mut self.job
    }

    /// Block until every stage in `stages` finished successfully, or until
    /// `shutdown` resolves.
    pub async fn wait<S, F>(&self, stages: &[S], shutdown: F) -> Result<()>
    where
        S: AsRef<str>,
        F: Future<Output = ()>,
    {
        EventWatcher::new(&self.api, &self.job, self.watch)
            .wait(stages, shutdown)
            .await
    }

    /// Persist the in-memory job. See [`mutator::commit`].
    pub async fn commit(&mut self) -> Result<()> {
        mutator::commit(&self.api, &mut self.job).await
    }
}
