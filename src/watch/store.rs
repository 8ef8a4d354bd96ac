// src/watch/store.rs

use std::collections::BTreeMap;

use crate::completion;
use crate::nomad::model::AllocationStub;

/// Latest known state of each allocation, keyed by allocation id.
///
/// Upserts overwrite, so an event delivered twice leaves the store (and the
/// completion result computed from it) unchanged.
#[derive(Debug, Clone, Default)]
pub struct AllocationStore {
    allocs: BTreeMap<String, AllocationStub>,
}

impl AllocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&mut self, allocs: impl IntoIterator<Item = AllocationStub>) {
        for alloc in allocs {
            self.upsert(alloc);
        }
    }

    /// Insert or replace; returns `true` if the allocation was not known.
    pub fn upsert(&mut self, alloc: AllocationStub) -> bool {
        self.allocs.insert(alloc.id.clone(), alloc).is_none()
    }

    pub fn len(&self) -> usize {
        self.allocs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocs.is_empty()
    }

    pub fn values(&self) -> Vec<AllocationStub> {
        self.allocs.values().cloned().collect()
    }

    /// Completion over everything currently in the store.
    pub fn is_done<S: AsRef<str>>(&self, stages: &[S], require_success: bool) -> bool {
        completion::is_done(&self.values(), stages, require_success)
    }
}
