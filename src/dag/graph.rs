// src/dag/graph.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{PipelineError, Result};
use crate::nomad::model::Job;

/// Pipeline view of one task group, as read from its tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSpec {
    pub name: String,
    /// Stages activated after this one succeeds (`next` tag).
    pub next: Vec<String>,
    /// Stages this one waits for (`dependencies` tag).
    pub dependencies: Vec<String>,
    pub root: bool,
    /// Glob of dynamic stage files (`dynamic-tasks` tag).
    pub dynamic_tasks: Option<String>,
}

/// The candidate stages of one processing pass.
#[derive(Debug, Clone, Default)]
pub struct StageGraph {
    stages: Vec<StageSpec>,
}

impl StageGraph {
    pub fn new(stages: Vec<StageSpec>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Names of stages tagged `root`, in job order.
    pub fn roots(&self) -> Vec<String> {
        self.stages
            .iter()
            .filter(|s| s.root)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Check the stages against the job they came from.
    ///
    /// - every `next` / `dependencies` reference names a group in the job
    /// - every stage has a zero count
    /// - the references do not form a cycle
    pub fn validate(&self, job: &Job) -> Result<()> {
        for stage in &self.stages {
            let group = job
                .lookup_task_group(&stage.name)
                .ok_or_else(|| PipelineError::StageNotFound(stage.name.clone()))?;

            ensure_known(job, &stage.name, &stage.next, "next")?;
            ensure_known(job, &stage.name, &stage.dependencies, "dependent")?;

            if group.count > 0 {
                return Err(PipelineError::NonZeroCount {
                    stage: stage.name.clone(),
                    count: group.count,
                });
            }
        }

        self.ensure_acyclic()
    }

    fn ensure_acyclic(&self) -> Result<()> {
        // Edge direction is execution order: A -> B when B runs after A,
        // whether declared as A.next = B or B.dependencies = A.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for stage in &self.stages {
            graph.add_node(stage.name.as_str());
            for next in &stage.next {
                graph.add_edge(stage.name.as_str(), next.as_str(), ());
            }
            for dep in &stage.dependencies {
                graph.add_edge(dep.as_str(), stage.name.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(_order) => Ok(()),
            Err(cycle) => Err(PipelineError::DagCycle(format!(
                "cycle detected in stage graph involving stage '{}'",
                cycle.node_id()
            ))),
        }
    }
}

fn ensure_known(job: &Job, source: &str, refs: &[String], relation: &'static str) -> Result<()> {
    match refs.iter().find(|name| !job.has_task_group(name)) {
        Some(missing) => Err(PipelineError::UnknownStage {
            source_stage: source.to_string(),
            missing: missing.clone(),
            relation,
        }),
        None => Ok(()),
    }
}
