#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::future::{pending, ready};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use nomad_pipeline::nomad::api::{ApiFuture, EventSubscription, NomadApi, StreamItem};
use nomad_pipeline::nomad::model::{
    Allocation, AllocationList, AllocationStub, Job, RegisterResponse,
};
use nomad_pipeline::nomad::EngineError;

use crate::builders::to_allocation;

/// One scripted event stream subscription.
#[derive(Debug)]
struct Script {
    items: Vec<StreamItem>,
    keep_open: bool,
}

#[derive(Debug, Default)]
struct State {
    jobs: BTreeMap<String, Job>,
    allocs: Vec<AllocationStub>,
    alloc_index: u64,
    scripts: VecDeque<Script>,
    /// Senders of subscriptions that stay open.
    open: Vec<mpsc::Sender<StreamItem>>,
    subscribe_indices: Vec<u64>,
    subscribe_failures: usize,
    /// Subscription attempts beyond this many never resolve.
    subscribe_limit: Option<usize>,
    stall_allocations: bool,
    registrations: Vec<Job>,
}

/// In-memory `NomadApi` holding a single job's allocations.
///
/// - `register_job` enforces the job modify index like Nomad does.
/// - Each `event_stream` call consumes the next scripted subscription; once
///   the scripts run out, subscriptions stay open and silent.
///
/// Clones share state, so a test can keep a handle after moving one into
/// the controller.
#[derive(Debug, Clone, Default)]
pub struct FakeNomad {
    state: Arc<Mutex<State>>,
}

impl FakeNomad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job(job: Job) -> Self {
        let fake = Self::new();
        fake.put_job(job);
        fake
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn put_job(&self, job: Job) {
        self.lock().jobs.insert(job.id.clone(), job);
    }

    pub fn job(&self, id: &str) -> Option<Job> {
        self.lock().jobs.get(id).cloned()
    }

    /// Insert or replace an allocation (by id).
    pub fn add_allocation(&self, stub: AllocationStub) {
        let mut state = self.lock();
        match state.allocs.iter_mut().find(|a| a.id == stub.id) {
            Some(existing) => *existing = stub,
            None => state.allocs.push(stub),
        }
    }

    /// Index reported by the allocation listing.
    pub fn set_allocation_index(&self, index: u64) {
        self.lock().alloc_index = index;
    }

    /// Next subscription delivers `items`, then ends.
    pub fn script_stream(&self, items: Vec<StreamItem>) {
        self.lock().scripts.push_back(Script {
            items,
            keep_open: false,
        });
    }

    /// Next subscription delivers `items`, then stays open.
    pub fn script_open_stream(&self, items: Vec<StreamItem>) {
        self.lock().scripts.push_back(Script {
            items,
            keep_open: true,
        });
    }

    /// Fail the next `n` subscription attempts.
    pub fn fail_subscribes(&self, n: usize) {
        self.lock().subscribe_failures = n;
    }

    /// Allocation listings never resolve.
    pub fn stall_allocations(&self) {
        self.lock().stall_allocations = true;
    }

    /// Subscription attempts after the first `n` never resolve.
    pub fn stall_subscribes_after(&self, n: usize) {
        self.lock().subscribe_limit = Some(n);
    }

    /// Start index of every subscription attempt, in order.
    pub fn subscribe_indices(&self) -> Vec<u64> {
        self.lock().subscribe_indices.clone()
    }

    /// Every job accepted by `register_job`.
    pub fn registrations(&self) -> Vec<Job> {
        self.lock().registrations.clone()
    }

    fn do_job_info(&self, job_id: &str) -> Result<Job, EngineError> {
        self.lock()
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| EngineError::Status {
                code: 404,
                body: "job not found".to_string(),
            })
    }

    fn do_job_allocations(&self) -> Result<AllocationList, EngineError> {
        let state = self.lock();
        Ok(AllocationList {
            allocations: state.allocs.clone(),
            last_index: state.alloc_index,
        })
    }

    fn do_allocation_info(&self, alloc_id: &str) -> Result<Allocation, EngineError> {
        self.lock()
            .allocs
            .iter()
            .find(|a| a.id == alloc_id)
            .map(to_allocation)
            .ok_or_else(|| EngineError::Status {
                code: 404,
                body: "alloc not found".to_string(),
            })
    }

    fn do_register(&self, job: &Job, modify_index: u64) -> Result<RegisterResponse, EngineError> {
        let mut state = self.lock();
        let stored = state
            .jobs
            .get(&job.id)
            .map(|j| (j.job_modify_index, j.version))
            .unwrap_or_default();

        if stored.0 != modify_index {
            return Err(EngineError::Conflict(format!(
                "Enforcing job modify index {modify_index}: job exists with conflicting job modify index: {}",
                stored.0
            )));
        }

        let mut accepted = job.clone();
        accepted.job_modify_index = stored.0 + 10;
        accepted.version = stored.1 + 1;

        state.registrations.push(accepted.clone());
        state.jobs.insert(accepted.id.clone(), accepted.clone());

        Ok(RegisterResponse {
            eval_id: format!("eval-{}", state.registrations.len()),
            job_modify_index: accepted.job_modify_index,
        })
    }

    fn do_event_stream(&self, index: u64) -> Result<EventSubscription, EngineError> {
        let mut state = self.lock();
        state.subscribe_indices.push(index);

        if state.subscribe_failures > 0 {
            state.subscribe_failures -= 1;
            return Err(EngineError::Transport("connection refused".to_string()));
        }

        let script = state.scripts.pop_front().unwrap_or(Script {
            items: Vec::new(),
            keep_open: true,
        });

        let (tx, rx) = mpsc::channel(script.items.len().max(1));
        for item in script.items {
            let _ = tx.try_send(item);
        }
        if script.keep_open {
            state.open.push(tx);
        }

        Ok(EventSubscription::from_receiver(rx))
    }
}

impl NomadApi for FakeNomad {
    fn job_info<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, Job> {
        Box::pin(ready(self.do_job_info(job_id)))
    }

    fn job_allocations<'a>(&'a self, _job_id: &'a str) -> ApiFuture<'a, AllocationList> {
        if self.lock().stall_allocations {
            return Box::pin(pending::<Result<AllocationList, EngineError>>());
        }
        Box::pin(ready(self.do_job_allocations()))
    }

    fn allocation_info<'a>(&'a self, alloc_id: &'a str) -> ApiFuture<'a, Allocation> {
        Box::pin(ready(self.do_allocation_info(alloc_id)))
    }

    fn register_job<'a>(
        &'a self,
        job: &'a Job,
        modify_index: u64,
    ) -> ApiFuture<'a, RegisterResponse> {
        Box::pin(ready(self.do_register(job, modify_index)))
    }

    fn event_stream<'a>(
        &'a self,
        _job_id: &'a str,
        index: u64,
    ) -> ApiFuture<'a, EventSubscription> {
        let stalled = {
            let mut state = self.lock();
            let stalled = state
                .subscribe_limit
                .is_some_and(|limit| state.subscribe_indices.len() >= limit);
            if stalled {
                state.subscribe_indices.push(index);
            }
            stalled
        };
        if stalled {
            return Box::pin(pending::<Result<EventSubscription, EngineError>>());
        }
        Box::pin(ready(self.do_event_stream(index)))
    }
}
