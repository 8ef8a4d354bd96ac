// src/nomad/api.rs

//! The engine operations the pipeline consumes.
//!
//! The controller only ever talks to a [`NomadApi`]. Production code uses
//! [`crate::nomad::NomadClient`]; tests plug in an in-memory fake.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::EngineError;
use super::model::{Allocation, AllocationList, EventBatch, Job, RegisterResponse};

/// Boxed future returned by [`NomadApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'a>>;

/// Errors delivered in-band on an event subscription.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A frame could not be decoded. Nomad produces this when the server
    /// drops the connection mid-stream; the subscription should be reopened.
    #[error("malformed stream body: {0}")]
    MalformedBody(String),

    #[error("stream transport error: {0}")]
    Transport(String),
}

impl StreamError {
    /// Whether this error is the known transient disconnect signature.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, StreamError::MalformedBody(_))
    }
}

pub type StreamItem = Result<EventBatch, StreamError>;

/// An open event stream subscription.
///
/// Dropping the subscription stops the background reader, so leaving a
/// scope by any path releases the server-side stream.
#[derive(Debug)]
pub struct EventSubscription {
    rx: mpsc::Receiver<StreamItem>,
    reader: Option<JoinHandle<()>>,
}

impl EventSubscription {
    pub fn new(rx: mpsc::Receiver<StreamItem>, reader: JoinHandle<()>) -> Self {
        Self {
            rx,
            reader: Some(reader),
        }
    }

    /// Subscription fed directly through a channel, with no reader task.
    pub fn from_receiver(rx: mpsc::Receiver<StreamItem>) -> Self {
        Self { rx, reader: None }
    }

    /// Next batch, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }

    /// Stop the reader and discard anything still buffered.
    pub fn cancel(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Engine operations used by the pipeline controller.
pub trait NomadApi: Send + Sync {
    /// Read the full job specification.
    fn job_info<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, Job>;

    /// List every allocation of the job (including terminal ones).
    fn job_allocations<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, AllocationList>;

    /// Read a single allocation.
    fn allocation_info<'a>(&'a self, alloc_id: &'a str) -> ApiFuture<'a, Allocation>;

    /// Register `job`, succeeding only if the stored job modify index still
    /// equals `modify_index`.
    fn register_job<'a>(&'a self, job: &'a Job, modify_index: u64)
    -> ApiFuture<'a, RegisterResponse>;

    /// Subscribe to allocation events for `job_id`, starting at `index`.
    fn event_stream<'a>(&'a self, job_id: &'a str, index: u64)
    -> ApiFuture<'a, EventSubscription>;
}
