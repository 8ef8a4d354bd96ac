// src/nomad/mod.rs

//! Everything that talks to (or models) the Nomad API.
//!
//! - [`model`] holds the typed subset of Nomad's JSON schema.
//! - [`api`] defines the [`NomadApi`] seam the controller is written against.
//! - [`client`] is the production HTTP implementation.
//! - [`events`] decodes the newline delimited event stream.

pub mod api;
pub mod client;
pub mod events;
pub mod model;

use thiserror::Error;

pub use api::{ApiFuture, EventSubscription, NomadApi, StreamError, StreamItem};
pub use client::NomadClient;
pub use model::{
    Allocation, AllocationList, AllocationStub, Event, EventBatch, Job, LifecycleHook, Meta,
    RegisterResponse, Resources, Task, TaskEvent, TaskGroup, TaskLifecycle, TaskState,
};

/// Failures talking to the Nomad API.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {code}: {body}")]
    Status { code: u16, body: String },

    /// Register was rejected because the job changed since it was read.
    #[error("{0}")]
    Conflict(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EngineError::Decode(err.to_string())
        } else {
            EngineError::Transport(err.to_string())
        }
    }
}
