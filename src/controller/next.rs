// src/controller/next.rs

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::completion::{self, task_succeeded};
use crate::dag::{INIT_TASK, is_synthetic_task, process_task_groups};
use crate::errors::{PipelineError, Result};
use crate::nomad::api::NomadApi;
use crate::nomad::model::{AllocationStub, TaskGroup};
use crate::tags::{self, Tag};

use super::PipelineController;
use super::dynamic::DynamicStages;

impl<A: NomadApi> PipelineController<A> {
    /// Activate `targets` on behalf of the invoking stage.
    ///
    /// - A `leader` stage zeroes every stage instead and returns `true`.
    /// - If any real task of the invoking allocation did not succeed,
    ///   nothing is activated and `false` is returned.
    /// - With `dynamic_tasks`, stages found by the glob are merged into the
    ///   job and their roots are added to `targets`.
    /// - The invoking stage deactivates itself once it is done.
    ///
    /// Returns whether the job needs to be persisted.
    pub async fn next<S: AsRef<str>>(
        &mut self,
        targets: &[S],
        dynamic_tasks: Option<&str>,
    ) -> Result<bool> {
        let mut targets: Vec<String> = targets.iter().map(|s| s.as_ref().to_string()).collect();
        info!(stages = ?targets, "triggering stages");

        let allocs = self.api.job_allocations(&self.ctx.job_id).await?.allocations;
        let current = self.api.allocation_info(&self.ctx.alloc_id).await?;

        let group = self
            .job
            .lookup_task_group(&self.ctx.group_name)
            .ok_or_else(|| PipelineError::StageNotFound(self.ctx.group_name.clone()))?;

        if is_leader(group) {
            info!(stage = %group.name, "leader stage finished, stopping pipeline");
            for tg in self.job.task_groups.iter_mut() {
                tg.count = 0;
            }
            return Ok(true);
        }

        for task in group.tasks.iter().map(|t| t.name.as_str()) {
            if is_synthetic_task(task) || task == self.ctx.task_name {
                continue;
            }
            if !current.task_states.get(task).is_some_and(task_succeeded) {
                warn!(
                    stage = %group.name,
                    task,
                    "task didn't run successfully, not triggering next stages"
                );
                return Ok(false);
            }
        }

        if let Some(glob) = dynamic_tasks.filter(|g| !g.is_empty()) {
            let roots = self.merge_dynamic(glob)?;
            targets.extend(roots);
        }

        let mut seen = BTreeSet::new();
        targets.retain(|t| seen.insert(t.clone()));

        for target in &targets {
            self.activate(target, &allocs);
        }

        let invoking = self.ctx.group_name.as_str();
        if self.ctx.task_name == INIT_TASK || completion::is_done(&allocs, &[invoking], true) {
            if let Some(tg) = self.job.lookup_task_group_mut(invoking) {
                info!(stage = invoking, "deactivating finished stage");
                tg.count = 0;
            }
        }

        Ok(true)
    }

    /// Merge the stages matched by `glob` and return their roots.
    fn merge_dynamic(&mut self, glob: &str) -> Result<Vec<String>> {
        let dynamic = DynamicStages::load(
            self.fs.as_ref(),
            &self.ctx.alloc_dir,
            glob,
            self.ctx.group_name.as_str(),
        )?;

        if dynamic.is_empty() {
            warn!(glob, "no dynamic stages found");
        } else {
            info!(glob, stages = ?dynamic.names(), "merging dynamic stages");
        }

        let found = dynamic.groups.len();
        let filter = self.job.extend(dynamic)?;
        if found > 0 && filter.except.len() == found {
            info!(glob, "dynamic stages already merged by another allocation");
            return Ok(Vec::new());
        }
        let roots = process_task_groups(
            &mut self.job,
            &self.ctx.group_name,
            &self.ctx.task_name,
            Some(&filter),
        )?;

        if roots.is_empty() {
            return Err(PipelineError::NoRootStage(format!(
                "at least one dynamic stage from ({glob}) must set the {} tag",
                Tag::Root.key()
            )));
        }

        Ok(roots)
    }

    /// Raise the replica count of `stage` unless it is already running.
    fn activate(&mut self, stage: &str, allocs: &[AllocationStub]) {
        let Some(tg) = self.job.lookup_task_group_mut(stage) else {
            warn!(stage, "could not find next stage");
            return;
        };

        if completion::stage_allocated(allocs, stage) && !completion::is_done(allocs, &[stage], false)
        {
            warn!(stage, "next stage already has allocations, skipping trigger");
            return;
        }

        tg.count = fan_out(tg);
        info!(stage, count = tg.count, "activating stage");
    }
}

fn is_leader(group: &TaskGroup) -> bool {
    tags::lookup_bool(&group.meta, Tag::Leader).unwrap_or_else(|err| {
        warn!(stage = %group.name, error = %err, "error parsing leader tag, defaulting to false");
        false
    })
}

/// Replica count for an activated stage: the `count` tag when positive,
/// otherwise 1.
fn fan_out(group: &TaskGroup) -> u32 {
    match tags::lookup_int(&group.meta, Tag::Count) {
        Ok(count) if count > 0 => u32::try_from(count).unwrap_or(u32::MAX),
        Ok(_) => 1,
        Err(err) => {
            warn!(stage = %group.name, error = %err, "error parsing count tag, defaulting to 1");
            1
        }
    }
}
