#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use nomad_pipeline::nomad::model::{
    ALLOCATION_UPDATED, Allocation, AllocationStub, Event, EventBatch, Job, Meta, Task,
    TaskEvent, TaskGroup, TaskState, TASK_STATE_DEAD, TASK_TERMINATED,
};
use nomad_pipeline::tags::Tag;

/// Job id used by the builders unless told otherwise.
pub const JOB_ID: &str = "pipeline";

/// Builder for `Job` to simplify test setup.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            job: Job {
                id: id.to_string(),
                name: id.to_string(),
                meta: Meta::new(),
                task_groups: Vec::new(),
                version: 0,
                job_modify_index: 1,
                extra: Map::new(),
            },
        }
    }

    pub fn group(mut self, group: TaskGroup) -> Self {
        self.job.task_groups.push(group);
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.job.version = version;
        self
    }

    pub fn modify_index(mut self, index: u64) -> Self {
        self.job.job_modify_index = index;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// Builder for `TaskGroup`.
pub struct GroupBuilder {
    group: TaskGroup,
}

impl GroupBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            group: TaskGroup {
                name: name.to_string(),
                count: 0,
                meta: Meta::new(),
                tasks: Vec::new(),
                extra: Map::new(),
            },
        }
    }

    /// A stage with a single `main` task.
    pub fn stage(name: &str) -> Self {
        Self::new(name).task(task("main"))
    }

    pub fn count(mut self, count: u32) -> Self {
        self.group.count = count;
        self
    }

    pub fn tag(mut self, tag: Tag, value: &str) -> Self {
        self.group.meta.insert(tag.key().to_string(), value.to_string());
        self
    }

    pub fn meta(mut self, key: &str, value: &str) -> Self {
        self.group.meta.insert(key.to_string(), value.to_string());
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.group.tasks.push(task);
        self
    }

    pub fn build(self) -> TaskGroup {
        self.group
    }
}

/// A docker task running the pipeline image.
pub fn task(name: &str) -> Task {
    let mut task = Task::new(name, "docker");
    task.config
        .insert("image".to_string(), json!("hyperbadger/nomad-pipeline:latest"));
    task.env
        .insert("NOMAD_ADDR".to_string(), "http://nomad.service:4646".to_string());
    task
}

/// The `init` group every pipeline job starts with.
pub fn init_group() -> TaskGroup {
    GroupBuilder::new("init").count(1).task(task("init")).build()
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("valid timestamp")
}

fn event(kind: &str, secs: i64, details: &[(&str, &str)]) -> TaskEvent {
    TaskEvent {
        kind: kind.to_string(),
        time: secs * 1_000_000_000,
        details: details
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

/// A dead task that exited with `exit_code`.
pub fn terminated(exit_code: i32, failed: bool) -> TaskState {
    let code = exit_code.to_string();
    TaskState {
        state: TASK_STATE_DEAD.to_string(),
        failed,
        restarts: 0,
        finished_at: Some(at(1_700_000_100)),
        events: vec![
            event("Started", 1_700_000_000, &[]),
            event(TASK_TERMINATED, 1_700_000_090, &[("exit_code", &code)]),
        ],
    }
}

pub fn succeeded() -> TaskState {
    terminated(0, false)
}

pub fn failed() -> TaskState {
    terminated(1, true)
}

pub fn running() -> TaskState {
    TaskState {
        state: "running".to_string(),
        failed: false,
        restarts: 0,
        finished_at: None,
        events: vec![event("Started", 1_700_000_000, &[])],
    }
}

/// Builder for `AllocationStub`.
pub struct AllocBuilder {
    stub: AllocationStub,
}

impl AllocBuilder {
    /// Allocation `id` for slot 0 of `group`.
    pub fn new(id: &str, group: &str) -> Self {
        Self {
            stub: AllocationStub {
                id: id.to_string(),
                name: format!("{JOB_ID}.{group}[0]"),
                task_group: group.to_string(),
                job_version: 0,
                create_index: 10,
                client_status: "running".to_string(),
                task_states: BTreeMap::new(),
            },
        }
    }

    pub fn slot(mut self, index: u32) -> Self {
        self.stub.name = format!("{JOB_ID}.{}[{index}]", self.stub.task_group);
        self
    }

    pub fn job_version(mut self, version: u64) -> Self {
        self.stub.job_version = version;
        self
    }

    pub fn create_index(mut self, index: u64) -> Self {
        self.stub.create_index = index;
        self
    }

    pub fn state(mut self, task: &str, state: TaskState) -> Self {
        self.stub.task_states.insert(task.to_string(), state);
        self
    }

    pub fn build(self) -> AllocationStub {
        self.stub
    }
}

/// The full allocation corresponding to a stub.
pub fn to_allocation(stub: &AllocationStub) -> Allocation {
    Allocation {
        id: stub.id.clone(),
        name: stub.name.clone(),
        task_group: stub.task_group.clone(),
        create_index: stub.create_index,
        client_status: stub.client_status.clone(),
        task_states: stub.task_states.clone(),
    }
}

/// An `AllocationUpdated` event carrying `stub`.
pub fn alloc_event(index: u64, stub: &AllocationStub) -> Event {
    Event {
        topic: "Allocation".to_string(),
        kind: ALLOCATION_UPDATED.to_string(),
        key: stub.id.clone(),
        index,
        payload: json!({ "Allocation": to_allocation(stub) }),
    }
}

/// An event of another type, without payload.
pub fn other_event(index: u64, kind: &str) -> Event {
    Event {
        topic: "Allocation".to_string(),
        kind: kind.to_string(),
        key: String::new(),
        index,
        payload: Value::Null,
    }
}

pub fn batch(events: Vec<Event>) -> EventBatch {
    let index = events.iter().map(|e| e.index).max().unwrap_or_default();
    EventBatch { index, events }
}
