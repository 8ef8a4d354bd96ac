// src/watch/watcher.rs

//! Wait for stages to finish by following the job's allocation events.
//!
//! The watcher snapshots the job's allocations, then applies allocation
//! updates from the event stream until the requested stages are done. A
//! single `select!` multiplexes three wake sources: stream batches, an
//! internal resubscribe signal, and outer shutdown. Shutdown also cuts
//! short the initial snapshot and every (re)subscribe.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::StreamSection;
use crate::errors::{PipelineError, Result};
use crate::nomad::api::{EventSubscription, NomadApi};
use crate::nomad::model::{ALLOCATION_UPDATED, EventBatch, Job};

use super::store::AllocationStore;

/// Tuning knobs for [`EventWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Consecutive stream errors tolerated before giving up.
    pub max_consecutive_errors: u32,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            max_consecutive_errors: 5,
        }
    }
}

impl From<&StreamSection> for WatchOptions {
    fn from(section: &StreamSection) -> Self {
        Self {
            max_consecutive_errors: section.max_consecutive_errors,
        }
    }
}

/// Follows one job's allocations on behalf of a `wait` invocation.
pub struct EventWatcher<'a, A: NomadApi + ?Sized> {
    api: &'a A,
    job: &'a Job,
    options: WatchOptions,
}

impl<'a, A: NomadApi + ?Sized> EventWatcher<'a, A> {
    pub fn new(api: &'a A, job: &'a Job, options: WatchOptions) -> Self {
        Self { api, job, options }
    }

    /// Block until every stage in `stages` has finished successfully.
    ///
    /// Returns `Ok(())` straight from the snapshot if the stages are already
    /// done, without opening a stream. Resolving `shutdown` aborts the wait
    /// with [`PipelineError::Cancelled`]. The subscription is released on
    /// every return path.
    pub async fn wait<S, F>(&self, stages: &[S], shutdown: F) -> Result<()>
    where
        S: AsRef<str>,
        F: Future<Output = ()>,
    {
        let names: Vec<&str> = stages.iter().map(AsRef::as_ref).collect();
        tokio::pin!(shutdown);

        let snapshot = until_shutdown(shutdown.as_mut(), async {
            self.api
                .job_allocations(&self.job.id)
                .await
                .map_err(PipelineError::from)
        })
        .await?;

        let mut store = AllocationStore::new();
        store.seed(snapshot.allocations);
        if store.is_empty() {
            debug!(stages = ?names, "no allocations yet");
        }

        if store.is_done(stages, true) {
            info!(stages = ?names, "stages already done");
            return Ok(());
        }

        let mut cursor = Cursor {
            index: snapshot.last_index,
            errors: 0,
            max_errors: self.options.max_consecutive_errors,
        };

        let (resubscribe_tx, mut resubscribe_rx) = mpsc::channel::<()>(1);

        let mut sub = until_shutdown(shutdown.as_mut(), self.subscribe(&mut cursor)).await?;
        info!(stages = ?names, index = cursor.index, "waiting for stages");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.as_mut() => {
                    info!(stages = ?names, "wait cancelled");
                    sub.cancel();
                    return Err(PipelineError::Cancelled);
                }

                Some(()) = resubscribe_rx.recv() => {
                    sub.cancel();
                    sub = until_shutdown(shutdown.as_mut(), self.subscribe(&mut cursor)).await?;
                    debug!(index = cursor.index, "resubscribed to event stream");
                }

                item = sub.recv() => match item {
                    Some(Ok(batch)) => {
                        if self.apply_batch(batch, &mut store, &mut cursor, stages)? {
                            info!(stages = ?names, "stages done");
                            sub.cancel();
                            return Ok(());
                        }
                    }
                    Some(Err(err)) if err.is_disconnect() => {
                        warn!(error = %err, index = cursor.index, "event stream disconnected; resubscribing");
                        sub.cancel();
                        let _ = resubscribe_tx.try_send(());
                    }
                    Some(Err(err)) => {
                        cursor.record_error(&err.to_string())?;
                        sub.cancel();
                        let _ = resubscribe_tx.try_send(());
                    }
                    None => {
                        cursor.record_error("event stream closed")?;
                        let _ = resubscribe_tx.try_send(());
                    }
                },
            }
        }
    }

    /// Open a subscription at the cursor, retrying failures against the
    /// consecutive error budget.
    async fn subscribe(&self, cursor: &mut Cursor) -> Result<EventSubscription> {
        loop {
            match self.api.event_stream(&self.job.id, cursor.index).await {
                Ok(sub) => return Ok(sub),
                Err(err) => cursor.record_error(&err.to_string())?,
            }
        }
    }

    /// Apply one batch in order. Returns `true` as soon as the stages are done.
    ///
    /// Allocation events without a usable payload count against the error
    /// budget. A batch without such events resets it.
    fn apply_batch<S: AsRef<str>>(
        &self,
        batch: EventBatch,
        store: &mut AllocationStore,
        cursor: &mut Cursor,
        stages: &[S],
    ) -> Result<bool> {
        let mut clean = true;

        for event in batch.events {
            cursor.index = cursor.index.max(event.index);

            if event.kind != ALLOCATION_UPDATED {
                debug!(kind = %event.kind, index = event.index, "ignoring event");
                continue;
            }

            let alloc = match event.allocation() {
                Ok(Some(alloc)) => alloc,
                Ok(None) => {
                    clean = false;
                    cursor.record_error("allocation event without payload")?;
                    continue;
                }
                Err(err) => {
                    clean = false;
                    cursor.record_error(&format!("undecodable allocation payload: {err}"))?;
                    continue;
                }
            };

            debug!(
                alloc_id = %alloc.id,
                stage = %alloc.task_group,
                status = %alloc.client_status,
                index = event.index,
                "allocation updated"
            );

            store.upsert(alloc.stub(self.job));
            if store.is_done(stages, true) {
                return Ok(true);
            }
        }

        if clean {
            cursor.errors = 0;
        }
        cursor.index = cursor.index.max(batch.index);
        Ok(false)
    }
}

/// Run `work` unless `shutdown` resolves first.
async fn until_shutdown<T, F, W>(shutdown: Pin<&mut F>, work: W) -> Result<T>
where
    F: Future<Output = ()>,
    W: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;

        _ = shutdown => Err(PipelineError::Cancelled),
        res = work => res,
    }
}

/// Stream position and consecutive error count.
#[derive(Debug)]
struct Cursor {
    index: u64,
    errors: u32,
    max_errors: u32,
}

impl Cursor {
    fn record_error(&mut self, reason: &str) -> Result<()> {
        self.errors += 1;
        warn!(
            error = reason,
            errors = self.errors,
            max = self.max_errors,
            "event stream error"
        );

        if self.errors > self.max_errors {
            return Err(PipelineError::Stream(format!(
                "giving up after {} consecutive errors, last: {reason}",
                self.errors
            )));
        }
        Ok(())
    }
}
