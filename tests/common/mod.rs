#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use nomad_pipeline::controller::{PipelineController, ProcessContext};
use nomad_pipeline::fs::FileSystem;
use nomad_pipeline::fs::mock::MockFileSystem;
use nomad_pipeline::nomad::model::Job;
use nomad_pipeline::tags::Tag;
use nomad_pipeline::watch::WatchOptions;

pub use nomad_pipeline_test_utils::builders::*;
pub use nomad_pipeline_test_utils::{FakeNomad, init_tracing, with_timeout};

pub const ALLOC_DIR: &str = "/alloc";

/// Process context for `task` of `group` running in allocation `alloc_id`.
pub fn ctx(group: &str, task: &str, alloc_id: &str) -> ProcessContext {
    ProcessContext {
        job_id: JOB_ID.to_string(),
        job_name: "My Pipeline".to_string(),
        group_name: group.to_string(),
        task_name: task.to_string(),
        alloc_id: alloc_id.to_string(),
        alloc_dir: PathBuf::from(ALLOC_DIR),
    }
}

/// `init` → A (root, next = B) → B (dependencies = A).
pub fn chain_job() -> Job {
    JobBuilder::new(JOB_ID)
        .group(init_group())
        .group(
            GroupBuilder::stage("A")
                .tag(Tag::Root, "true")
                .tag(Tag::Next, "B")
                .build(),
        )
        .group(GroupBuilder::stage("B").tag(Tag::Dependencies, "A").build())
        .build()
}

pub fn controller(
    fake: &FakeNomad,
    job: Job,
    ctx: ProcessContext,
) -> PipelineController<FakeNomad> {
    controller_with_fs(fake, job, ctx, Arc::new(MockFileSystem::new()))
}

pub fn controller_with_fs(
    fake: &FakeNomad,
    job: Job,
    ctx: ProcessContext,
    fs: Arc<dyn FileSystem>,
) -> PipelineController<FakeNomad> {
    PipelineController::new(ctx, fake.clone(), job, fs, WatchOptions::default())
}

pub fn count_of(job: &Job, group: &str) -> u32 {
    job.lookup_task_group(group)
        .unwrap_or_else(|| panic!("group {group} missing"))
        .count
}

/// `args` of a task's driver config as strings.
pub fn task_args(job: &Job, group: &str, task: &str) -> Option<Vec<String>> {
    let task = job.lookup_task_group(group)?.lookup_task(task)?;
    let args = task.config.get("args")?.as_array()?;
    Some(
        args.iter()
            .filter_map(|a| a.as_str().map(str::to_string))
            .collect(),
    )
}
