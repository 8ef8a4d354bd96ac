// src/completion/mod.rs

//! Completion evaluation over an allocation snapshot.
//!
//! Nomad has no notion of "this task group is finished". We derive it: a
//! stage is done once every allocation of its latest job version has run
//! all of its real tasks to a terminal state. [`is_done`] answers that for
//! a set of stages at once and is used both for waiting on dependencies and
//! for deciding whether a stage may be (re)activated.

pub mod success;

use std::collections::{BTreeMap, BTreeSet};
use std::collections::btree_map::Entry;

use tracing::debug;

use crate::dag::sidecar::is_synthetic_task;
use crate::nomad::model::AllocationStub;

pub use success::{EXIT_CODE_DETAIL, task_succeeded};

/// Whether every stage in `stages` is fully done in `allocs`.
///
/// - Empty `allocs` or empty `stages` is never done.
/// - Allocations are deduplicated per slot, keeping the newest job version.
/// - A stage is done when the number of complete allocations reaches the
///   number of (deduplicated) allocations it has.
/// - With `require_success`, a task only counts if it also succeeded;
///   otherwise any terminal outcome counts.
///
/// The result is true only if the done stages are exactly the requested set.
pub fn is_done<S: AsRef<str>>(
    allocs: &[AllocationStub],
    stages: &[S],
    require_success: bool,
) -> bool {
    if stages.is_empty() || allocs.is_empty() {
        return false;
    }

    let requested: BTreeSet<&str> = stages.iter().map(AsRef::as_ref).collect();
    let latest = latest_allocations(allocs);

    let mut expected: BTreeMap<&str, usize> = BTreeMap::new();
    for alloc in &latest {
        *expected.entry(alloc.task_group.as_str()).or_default() += 1;
    }

    let mut completed: BTreeMap<&str, usize> = BTreeMap::new();
    for alloc in latest
        .iter()
        .filter(|a| requested.contains(a.task_group.as_str()))
    {
        if allocation_complete(alloc, require_success) {
            *completed.entry(alloc.task_group.as_str()).or_default() += 1;
        }
    }

    let done: BTreeSet<&str> = completed
        .into_iter()
        .filter(|(stage, count)| {
            let want = expected.get(stage).copied().unwrap_or_default();
            debug!(stage, completions = count, expected = want, "stage completions");
            *count >= want
        })
        .map(|(stage, _)| stage)
        .collect();

    done == requested
}

/// Whether `stage` has any allocation at all.
pub fn stage_allocated(allocs: &[AllocationStub], stage: &str) -> bool {
    allocs.iter().any(|a| a.task_group == stage)
}

/// One allocation per slot, the one from the newest job version.
///
/// Slots are identified by allocation name (`job.group[index]`); ties on
/// job version go to the most recently created allocation. Allocations
/// without a name are kept individually.
pub fn latest_allocations(allocs: &[AllocationStub]) -> Vec<&AllocationStub> {
    let mut latest: BTreeMap<&str, &AllocationStub> = BTreeMap::new();

    for alloc in allocs {
        let key = if alloc.name.is_empty() {
            alloc.id.as_str()
        } else {
            alloc.name.as_str()
        };

        match latest.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(alloc);
            }
            Entry::Occupied(mut slot) => {
                if recency(alloc) > recency(slot.get()) {
                    slot.insert(alloc);
                }
            }
        }
    }

    latest.into_values().collect()
}

fn recency(alloc: &AllocationStub) -> (u64, u64, &str) {
    (alloc.job_version, alloc.create_index, alloc.id.as_str())
}

/// Every real task of the allocation reached a terminal state (and
/// succeeded, if required). An allocation that has not reported any real
/// task yet is not complete.
pub fn allocation_complete(alloc: &AllocationStub, require_success: bool) -> bool {
    let mut real = alloc
        .task_states
        .iter()
        .filter(|(name, _)| !is_synthetic_task(name))
        .peekable();

    if real.peek().is_none() {
        return false;
    }

    real.all(|(_, state)| {
        state.is_terminal() && (!require_success || task_succeeded(state))
    })
}
