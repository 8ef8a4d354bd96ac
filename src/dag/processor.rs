// src/dag/processor.rs

//! Compile stage tags into Nomad primitives.
//!
//! [`process_task_groups`] reads the pipeline tags of every task group in a
//! job, validates the resulting graph, and injects the `wait` / `next` hook
//! tasks into each stage. It returns the root stages, which the caller
//! activates.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::dag::graph::{StageGraph, StageSpec};
use crate::dag::sidecar::{next_task, wait_task};
use crate::errors::{PipelineError, Result};
use crate::nomad::model::{Job, Resources, Task, TaskGroup};
use crate::tags::{self, Tag};

/// Restricts processing to groups whose `tag` equals `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    pub tag: Tag,
    pub value: String,
    /// Tagged groups to leave alone, e.g. stages an earlier replica merged.
    pub except: BTreeSet<String>,
}

impl TagFilter {
    /// Filter selecting dynamic stages discovered by `parent`.
    pub fn parent(parent: impl Into<String>) -> Self {
        Self {
            tag: Tag::ParentTask,
            value: parent.into(),
            except: BTreeSet::new(),
        }
    }

    /// Whether `group` carries the tag, ignoring `except`.
    pub fn tags(&self, group: &TaskGroup) -> bool {
        group.meta.get(self.tag.key()) == Some(&self.value)
    }

    pub fn matches(&self, group: &TaskGroup) -> bool {
        self.tags(group) && !self.except.contains(&group.name)
    }
}

/// Process the job's stages on behalf of `invoking_task` in `invoking_group`.
///
/// The invoking group itself is never a stage. With a `filter`, only groups
/// it matches are processed. Returns the names of root stages (possibly
/// empty; an empty result is for the caller to reject).
pub fn process_task_groups(
    job: &mut Job,
    invoking_group: &str,
    invoking_task: &str,
    filter: Option<&TagFilter>,
) -> Result<Vec<String>> {
    let template = invoking_template(job, invoking_group, invoking_task)?;

    let mut specs = Vec::new();
    for group in job.task_groups.iter_mut() {
        if group.name == invoking_group {
            continue;
        }
        if let Some(filter) = filter {
            if !filter.matches(group) {
                continue;
            }
        }

        for key in tags::unrecognized_keys(&group.meta) {
            warn!(stage = %group.name, tag = key, "ignoring unrecognized pipeline tag");
        }

        specs.push(read_stage(group)?);
        apply_dynamic_memory(group)?;
    }

    let graph = StageGraph::new(specs);
    graph.validate(job)?;

    for spec in graph.stages() {
        let Some(group) = job.lookup_task_group_mut(&spec.name) else {
            return Err(PipelineError::StageNotFound(spec.name.clone()));
        };

        if !spec.dependencies.is_empty() {
            group.upsert_task(wait_task(&template, &spec.dependencies));
        }
        group.upsert_task(next_task(
            &template,
            &spec.next,
            spec.dynamic_tasks.as_deref(),
        ));

        debug!(
            stage = %spec.name,
            next = ?spec.next,
            dependencies = ?spec.dependencies,
            root = spec.root,
            "attached pipeline hooks"
        );
    }

    Ok(graph.roots())
}

fn invoking_template(job: &Job, group: &str, task: &str) -> Result<Task> {
    job.lookup_task_group(group)
        .ok_or_else(|| PipelineError::StageNotFound(group.to_string()))?
        .lookup_task(task)
        .cloned()
        .ok_or_else(|| PipelineError::StageNotFound(format!("{group}/{task}")))
}

fn read_stage(group: &TaskGroup) -> Result<StageSpec> {
    let dynamic_tasks = tags::lookup_str(&group.meta, Tag::DynamicTasks);

    Ok(StageSpec {
        name: group.name.clone(),
        next: tags::lookup_list(&group.meta, Tag::Next),
        dependencies: tags::lookup_list(&group.meta, Tag::Dependencies),
        root: tags::lookup_bool(&group.meta, Tag::Root)?,
        dynamic_tasks: (!dynamic_tasks.is_empty()).then_some(dynamic_tasks),
    })
}

fn apply_dynamic_memory(group: &mut TaskGroup) -> Result<()> {
    for task in group.tasks.iter_mut() {
        let mem = tags::lookup_int(&task.meta, Tag::DynamicMemoryMb)?;
        if mem > 0 {
            task.resources
                .get_or_insert_with(Resources::default)
                .memory_mb = Some(mem);
            debug!(task = %task.name, stage = %group.name, memory_mb = mem, "setting dynamic memory");
        }
    }
    Ok(())
}
