// src/controller/dynamic.rs

//! Stages discovered at run time.
//!
//! A stage tagged `dynamic-tasks` passes a glob to its `next` hook. The glob
//! is resolved inside the allocation directory; each matching file holds a
//! JSON array of task groups in Nomad's schema. The groups are merged into
//! the job, tagged with the stage that discovered them. Merging only ever
//! appends: stages already in the job are never replaced.

use std::collections::BTreeSet;
use std::path::Path;

use globset::GlobBuilder;
use tracing::{debug, info};

use crate::dag::TagFilter;
use crate::errors::{PipelineError, Result};
use crate::fs::{FileSystem, walk_files};
use crate::nomad::model::{Job, TaskGroup};
use crate::tags::Tag;

/// Task groups loaded from dynamic stage files, not yet part of the job.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicStages {
    /// Stage that discovered these groups.
    pub parent: String,
    pub groups: Vec<TaskGroup>,
}

impl DynamicStages {
    /// Load every file under `alloc_dir` matching `glob`, in sorted path
    /// order. No match yields an empty set.
    pub fn load(
        fs: &dyn FileSystem,
        alloc_dir: &Path,
        glob: &str,
        parent: impl Into<String>,
    ) -> Result<Self> {
        let matcher = GlobBuilder::new(glob.trim_start_matches('/'))
            .literal_separator(true)
            .build()
            .map_err(|err| PipelineError::DynamicTasks {
                path: glob.to_string(),
                reason: err.to_string(),
            })?
            .compile_matcher();

        let files = walk_files(fs, alloc_dir).map_err(|err| PipelineError::DynamicTasks {
            path: alloc_dir.display().to_string(),
            reason: err.to_string(),
        })?;

        let matched: Vec<_> = files
            .into_iter()
            .filter(|path| {
                path.strip_prefix(alloc_dir)
                    .is_ok_and(|relative| matcher.is_match(relative))
            })
            .collect();

        info!(glob, files = ?matched, "found dynamic task files");

        let mut groups = Vec::new();
        for path in &matched {
            let raw = fs
                .read_to_string(path)
                .map_err(|err| PipelineError::DynamicTasks {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                })?;

            let mut parsed: Vec<TaskGroup> =
                serde_json::from_str(&raw).map_err(|err| PipelineError::DynamicTasks {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                })?;

            debug!(path = %path.display(), groups = parsed.len(), "parsed dynamic task file");
            groups.append(&mut parsed);
        }

        Ok(Self {
            parent: parent.into(),
            groups,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }
}

impl Job {
    /// Merge dynamic stages into the job.
    ///
    /// New groups are tagged with their parent and appended. A group that
    /// `parent` already merged (another replica of the same stage) is kept
    /// as it is, hooks and count included, and listed in the returned
    /// filter's `except`. A name taken by any other group, or repeated
    /// within `dynamic`, is a configuration error.
    pub fn extend(&mut self, dynamic: DynamicStages) -> Result<TagFilter> {
        let mut filter = TagFilter::parent(dynamic.parent);
        let mut added = BTreeSet::new();

        for mut group in dynamic.groups {
            if added.contains(&group.name) {
                return Err(PipelineError::ConfigError(format!(
                    "dynamic stage '{}' is defined more than once",
                    group.name
                )));
            }

            if let Some(existing) = self.lookup_task_group(&group.name) {
                if !filter.tags(existing) {
                    return Err(PipelineError::ConfigError(format!(
                        "dynamic stage '{}' from '{}' collides with an existing stage",
                        group.name, filter.value
                    )));
                }
                debug!(stage = %group.name, parent = %filter.value, "dynamic stage already merged");
                filter.except.insert(group.name);
                continue;
            }

            group.set_meta(Tag::ParentTask.key(), filter.value.clone());
            added.insert(group.name.clone());
            self.task_groups.push(group);
        }

        Ok(filter)
    }
}
