// src/watch/mod.rs

//! Allocation tracking for `wait`.
//!
//! This module is responsible for:
//! - Keeping the latest state of every allocation of the job.
//! - Following the Nomad event stream, resubscribing on disconnects.
//!
//! It does **not** decide what "done" means; that is [`crate::completion`].

pub mod store;
pub mod watcher;

pub use store::AllocationStore;
pub use watcher::{EventWatcher, WatchOptions};
