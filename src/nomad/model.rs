// src/nomad/model.rs

//! Subset of the Nomad job / allocation schema the pipeline works with.
//!
//! Only the fields the controller reads or writes are typed. Everything else
//! is carried through `extra` so a job read from Nomad and registered back
//! loses nothing.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// String metadata attached to jobs, groups and tasks.
pub type Meta = BTreeMap<String, String>;

/// Event type recorded when a task process exits.
pub const TASK_TERMINATED: &str = "Terminated";

/// Task lifecycle state once the task will not run again.
pub const TASK_STATE_DEAD: &str = "dead";

/// Nomad sends `null` for empty maps and lists.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Job {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: Meta,

    #[serde(default, deserialize_with = "null_as_default")]
    pub task_groups: Vec<TaskGroup>,

    #[serde(default)]
    pub version: u64,

    /// Index used for optimistic concurrency on register.
    #[serde(default)]
    pub job_modify_index: u64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    pub fn lookup_task_group(&self, name: &str) -> Option<&TaskGroup> {
        self.task_groups.iter().find(|tg| tg.name == name)
    }

    pub fn lookup_task_group_mut(&mut self, name: &str) -> Option<&mut TaskGroup> {
        self.task_groups.iter_mut().find(|tg| tg.name == name)
    }

    pub fn has_task_group(&self, name: &str) -> bool {
        self.lookup_task_group(name).is_some()
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(key.into(), value.into());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskGroup {
    pub name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub count: u32,

    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: Meta,

    #[serde(default, deserialize_with = "null_as_default")]
    pub tasks: Vec<Task>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskGroup {
    pub fn lookup_task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(key.into(), value.into());
    }

    /// Add a task, replacing a task with the same name if one exists.
    pub fn upsert_task(&mut self, task: Task) {
        match self.tasks.iter_mut().find(|t| t.name == task.name) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleHook {
    Prestart,
    Poststart,
    Poststop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskLifecycle {
    pub hook: LifecycleHook,
    #[serde(default)]
    pub sidecar: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(rename = "MemoryMB", default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<i64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Task {
    pub name: String,

    #[serde(default)]
    pub driver: String,

    /// Opaque driver configuration.
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: Map<String, Value>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub env: Meta,

    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: Meta,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<TaskLifecycle>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            config: Map::new(),
            env: Meta::new(),
            meta: Meta::new(),
            lifecycle: None,
            resources: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskEvent {
    #[serde(rename = "Type")]
    pub kind: String,

    /// Unix time in nanoseconds.
    #[serde(default)]
    pub time: i64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub details: Meta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskState {
    #[serde(default)]
    pub state: String,

    #[serde(default)]
    pub failed: bool,

    #[serde(default)]
    pub restarts: u64,

    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<TaskEvent>,
}

impl TaskState {
    /// Dead with a real (non zero-value) finish time.
    pub fn is_terminal(&self) -> bool {
        self.state == TASK_STATE_DEAD
            && self.finished_at.is_some_and(|at| at.year() > 1)
    }
}

/// Allocation as returned by the job allocations listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllocationStub {
    #[serde(rename = "ID")]
    pub id: String,

    /// `<job>.<group>[<index>]`, stable across reschedules of one slot.
    #[serde(default)]
    pub name: String,

    pub task_group: String,

    #[serde(default)]
    pub job_version: u64,

    #[serde(default)]
    pub create_index: u64,

    #[serde(default)]
    pub client_status: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub task_states: BTreeMap<String, TaskState>,
}

/// Full allocation, as returned by the allocation endpoint and carried in
/// event stream payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Allocation {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub task_group: String,

    #[serde(default)]
    pub create_index: u64,

    #[serde(default)]
    pub client_status: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub task_states: BTreeMap<String, TaskState>,
}

impl Allocation {
    /// Build a listing stub, taking the job version from `job`.
    pub fn stub(&self, job: &Job) -> AllocationStub {
        AllocationStub {
            id: self.id.clone(),
            name: self.name.clone(),
            task_group: self.task_group.clone(),
            job_version: job.version,
            create_index: self.create_index,
            client_status: self.client_status.clone(),
            task_states: self.task_states.clone(),
        }
    }
}

/// Result of listing a job's allocations.
#[derive(Debug, Clone, Default)]
pub struct AllocationList {
    pub allocations: Vec<AllocationStub>,
    /// Raft index the listing was served at; event streams resume from here.
    pub last_index: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterResponse {
    #[serde(rename = "EvalID", default)]
    pub eval_id: String,

    pub job_modify_index: u64,
}

/// Nomad event type for allocation changes.
pub const ALLOCATION_UPDATED: &str = "AllocationUpdated";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    #[serde(default)]
    pub topic: String,

    #[serde(rename = "Type", default)]
    pub kind: String,

    #[serde(default)]
    pub key: String,

    #[serde(default)]
    pub index: u64,

    #[serde(default)]
    pub payload: Value,
}

impl Event {
    /// Decode the allocation carried in the payload, if any.
    pub fn allocation(&self) -> Result<Option<Allocation>, serde_json::Error> {
        match self.payload.get("Allocation") {
            None | Some(Value::Null) => Ok(None),
            Some(raw) => Allocation::deserialize(raw).map(Some),
        }
    }
}

/// One frame of the event stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBatch {
    pub index: u64,
    pub events: Vec<Event>,
}
