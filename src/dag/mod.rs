// src/dag/mod.rs

//! Pipeline graph derived from task group tags.
//!
//! - [`graph`] holds the per-stage view ([`StageSpec`]) and graph validation.
//! - [`processor`] turns a job's tags into injected hook tasks.
//! - [`sidecar`] builds the `wait` / `next` hook tasks themselves.

pub mod graph;
pub mod processor;
pub mod sidecar;

pub use graph::{StageGraph, StageSpec};
pub use processor::{TagFilter, process_task_groups};
pub use sidecar::{INIT_TASK, NEXT_TASK, WAIT_TASK, is_synthetic_task};
