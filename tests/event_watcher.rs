// tests/event_watcher.rs

mod common;

use std::future::pending;
use std::time::Duration;

use common::*;
use nomad_pipeline::errors::PipelineError;
use nomad_pipeline::nomad::api::StreamError;
use nomad_pipeline::nomad::model::{AllocationStub, Event, Job};
use serde_json::{Value, json};
use nomad_pipeline::watch::{AllocationStore, EventWatcher, WatchOptions};

fn job() -> Job {
    JobBuilder::new(JOB_ID)
        .group(GroupBuilder::stage("A").count(1).build())
        .build()
}

fn a_running() -> AllocationStub {
    AllocBuilder::new("a-1", "A").state("main", running()).build()
}

fn a_done() -> AllocationStub {
    AllocBuilder::new("a-1", "A").state("main", succeeded()).build()
}

fn fake_with_running_a() -> FakeNomad {
    let fake = FakeNomad::with_job(job());
    fake.add_allocation(a_running());
    fake.set_allocation_index(100);
    fake
}

fn options(max: u32) -> WatchOptions {
    WatchOptions {
        max_consecutive_errors: max,
    }
}

#[tokio::test]
async fn returns_without_subscribing_when_already_done() {
    init_tracing();
    let fake = FakeNomad::with_job(job());
    fake.add_allocation(a_done());

    let job = job();
    let watcher = EventWatcher::new(&fake, &job, WatchOptions::default());
    with_timeout(watcher.wait(&["A"], pending())).await.unwrap();

    assert!(fake.subscribe_indices().is_empty());
}

#[tokio::test]
async fn completes_when_stream_reports_success() {
    init_tracing();
    let fake = fake_with_running_a();
    fake.script_open_stream(vec![
        Ok(batch(vec![other_event(101, "PlanResult")])),
        Ok(batch(vec![alloc_event(102, &a_running())])),
        Ok(batch(vec![alloc_event(103, &a_done())])),
    ]);

    let job = job();
    let watcher = EventWatcher::new(&fake, &job, WatchOptions::default());
    with_timeout(watcher.wait(&["A"], pending())).await.unwrap();

    assert_eq!(fake.subscribe_indices(), vec![100]);
}

#[tokio::test]
async fn redelivered_events_do_not_change_the_result() {
    init_tracing();
    let fake = fake_with_running_a();
    let running = alloc_event(101, &a_running());
    fake.script_open_stream(vec![
        Ok(batch(vec![running.clone(), running.clone()])),
        Ok(batch(vec![alloc_event(102, &a_done()), alloc_event(102, &a_done())])),
    ]);

    let job = job();
    let watcher = EventWatcher::new(&fake, &job, WatchOptions::default());
    with_timeout(watcher.wait(&["A"], pending())).await.unwrap();
}

#[test]
fn store_upsert_is_idempotent() {
    let mut store = AllocationStore::new();
    assert!(store.upsert(a_done()));
    let before = store.is_done(&["A"], true);

    assert!(!store.upsert(a_done()));
    assert_eq!(store.len(), 1);
    assert_eq!(store.is_done(&["A"], true), before);
    assert!(before);
}

#[tokio::test]
async fn disconnect_resubscribes_from_last_index_without_counting() {
    init_tracing();
    let fake = fake_with_running_a();
    let malformed = || Err(StreamError::MalformedBody("unexpected EOF".into()));

    fake.script_stream(vec![Ok(batch(vec![alloc_event(105, &a_running())])), malformed()]);
    fake.script_stream(vec![malformed()]);
    fake.script_stream(vec![malformed()]);
    fake.script_open_stream(vec![Ok(batch(vec![alloc_event(110, &a_done())]))]);

    let job = job();
    let watcher = EventWatcher::new(&fake, &job, options(1));
    with_timeout(watcher.wait(&["A"], pending())).await.unwrap();

    assert_eq!(fake.subscribe_indices(), vec![100, 105, 105, 105]);
}

#[tokio::test]
async fn too_many_consecutive_errors_is_fatal() {
    init_tracing();
    let fake = fake_with_running_a();
    for _ in 0..6 {
        fake.script_stream(vec![Err(StreamError::Transport("reset by peer".into()))]);
    }

    let job = job();
    let watcher = EventWatcher::new(&fake, &job, options(5));
    let result = with_timeout(watcher.wait(&["A"], pending())).await;

    assert!(matches!(result, Err(PipelineError::Stream(_))), "{result:?}");
    assert_eq!(fake.subscribe_indices().len(), 6);
}

#[tokio::test]
async fn errors_within_budget_are_tolerated() {
    init_tracing();
    let fake = fake_with_running_a();
    fake.fail_subscribes(5);
    fake.script_open_stream(vec![Ok(batch(vec![alloc_event(101, &a_done())]))]);

    let job = job();
    let watcher = EventWatcher::new(&fake, &job, options(5));
    with_timeout(watcher.wait(&["A"], pending())).await.unwrap();
}

#[tokio::test]
async fn closed_streams_count_as_errors() {
    init_tracing();
    let fake = fake_with_running_a();
    for _ in 0..3 {
        fake.script_stream(Vec::new());
    }

    let job = job();
    let watcher = EventWatcher::new(&fake, &job, options(2));
    let result = with_timeout(watcher.wait(&["A"], pending())).await;

    assert!(matches!(result, Err(PipelineError::Stream(_))), "{result:?}");
}

#[tokio::test]
async fn successful_batch_resets_the_error_count() {
    init_tracing();
    let fake = fake_with_running_a();
    let reset = || Err(StreamError::Transport("reset by peer".into()));

    fake.script_stream(vec![reset()]);
    fake.script_stream(vec![Ok(batch(vec![alloc_event(101, &a_running())])), reset()]);
    fake.script_open_stream(vec![Ok(batch(vec![alloc_event(102, &a_done())]))]);

    let job = job();
    let watcher = EventWatcher::new(&fake, &job, options(1));
    with_timeout(watcher.wait(&["A"], pending())).await.unwrap();
}

#[tokio::test]
async fn shutdown_cancels_the_wait() {
    init_tracing();
    let fake = fake_with_running_a();

    let job = job();
    let watcher = EventWatcher::new(&fake, &job, WatchOptions::default());
    let shutdown = tokio::time::sleep(Duration::from_millis(50));
    let result = with_timeout(watcher.wait(&["A"], shutdown)).await;

    assert!(matches!(result, Err(PipelineError::Cancelled)), "{result:?}");
    assert_eq!(fake.subscribe_indices(), vec![100]);
}

#[tokio::test]
async fn controller_wait_follows_the_stream() {
    init_tracing();
    let fake = fake_with_running_a();
    fake.script_open_stream(vec![Ok(batch(vec![alloc_event(101, &a_done())]))]);

    let pc = controller(&fake, job(), ctx("B", "wait", "b-1"));
    with_timeout(pc.wait(&["A"], pending())).await.unwrap();
}

fn undecodable_alloc_event(index: u64) -> Event {
    let mut event = alloc_event(index, &a_running());
    event.payload = json!({ "Allocation": { "ID": 5 } });
    event
}

#[tokio::test]
async fn undecodable_allocations_count_as_errors() {
    init_tracing();
    let fake = fake_with_running_a();
    fake.script_open_stream(
        (101..120)
            .map(|index| Ok(batch(vec![undecodable_alloc_event(index)])))
            .collect(),
    );

    let job = job();
    let watcher = EventWatcher::new(&fake, &job, options(5));
    let result = with_timeout(watcher.wait(&["A"], pending())).await;

    assert!(matches!(result, Err(PipelineError::Stream(_))), "{result:?}");
}

#[tokio::test]
async fn allocation_events_without_payload_count_as_errors() {
    init_tracing();
    let fake = fake_with_running_a();
    let mut empty = alloc_event(101, &a_running());
    empty.payload = Value::Null;
    fake.script_open_stream(vec![Ok(batch(vec![empty.clone(), empty.clone(), empty]))]);

    let job = job();
    let watcher = EventWatcher::new(&fake, &job, options(2));
    let result = with_timeout(watcher.wait(&["A"], pending())).await;

    assert!(matches!(result, Err(PipelineError::Stream(_))), "{result:?}");
}

#[tokio::test]
async fn a_bad_payload_within_budget_is_skipped() {
    init_tracing();
    let fake = fake_with_running_a();
    fake.script_open_stream(vec![
        Ok(batch(vec![undecodable_alloc_event(101)])),
        Ok(batch(vec![alloc_event(102, &a_done())])),
    ]);

    let job = job();
    let watcher = EventWatcher::new(&fake, &job, options(1));
    with_timeout(watcher.wait(&["A"], pending())).await.unwrap();
}

#[tokio::test]
async fn shutdown_interrupts_the_snapshot() {
    init_tracing();
    let fake = fake_with_running_a();
    fake.stall_allocations();

    let job = job();
    let watcher = EventWatcher::new(&fake, &job, WatchOptions::default());
    let shutdown = tokio::time::sleep(Duration::from_millis(50));
    let result = with_timeout(watcher.wait(&["A"], shutdown)).await;

    assert!(matches!(result, Err(PipelineError::Cancelled)), "{result:?}");
    assert!(fake.subscribe_indices().is_empty());
}

#[tokio::test]
async fn shutdown_interrupts_a_resubscribe() {
    init_tracing();
    let fake = fake_with_running_a();
    fake.script_stream(Vec::new());
    fake.stall_subscribes_after(1);

    let job = job();
    let watcher = EventWatcher::new(&fake, &job, WatchOptions::default());
    let shutdown = tokio::time::sleep(Duration::from_millis(50));
    let result = with_timeout(watcher.wait(&["A"], shutdown)).await;

    assert!(matches!(result, Err(PipelineError::Cancelled)), "{result:?}");
    assert_eq!(fake.subscribe_indices(), vec![100, 100]);
}
