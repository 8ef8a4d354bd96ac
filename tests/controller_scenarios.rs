// tests/controller_scenarios.rs

mod common;

use std::sync::Arc;

use common::*;
use nomad_pipeline::controller::{JOB_ID_SLUG, JOB_NAME_SLUG};
use nomad_pipeline::errors::PipelineError;
use nomad_pipeline::fs::mock::MockFileSystem;
use nomad_pipeline::nomad::model::Job;
use nomad_pipeline::tags::Tag;

const NO_STAGES: [&str; 0] = [];

/// Runs `init` for `job` and returns the job as persisted.
async fn initialized(fake: &FakeNomad, job: Job) -> Job {
    fake.put_job(job.clone());
    fake.add_allocation(
        AllocBuilder::new("init-1", "init")
            .state("init", running())
            .build(),
    );

    let mut pc = controller(fake, job, ctx("init", "init", "init-1"));
    assert!(pc.init().await.unwrap());
    pc.commit().await.unwrap();
    fake.job(JOB_ID).unwrap()
}

#[tokio::test]
async fn init_activates_roots_and_deactivates_itself() {
    init_tracing();
    let fake = FakeNomad::new();

    let job = initialized(&fake, chain_job()).await;

    assert_eq!(count_of(&job, "A"), 1);
    assert_eq!(count_of(&job, "B"), 0);
    assert_eq!(count_of(&job, "init"), 0);

    assert_eq!(task_args(&job, "A", "next").unwrap(), vec!["agent", "next", "B"]);
    assert_eq!(task_args(&job, "B", "wait").unwrap(), vec!["agent", "wait", "A"]);

    assert_eq!(job.meta.get(JOB_ID_SLUG).map(String::as_str), Some("pipeline"));
    assert_eq!(job.meta.get(JOB_NAME_SLUG).map(String::as_str), Some("My-Pipeline"));
    assert_eq!(fake.registrations().len(), 1);
}

#[tokio::test]
async fn next_activates_following_stage_after_success() {
    init_tracing();
    let fake = FakeNomad::new();
    let job = initialized(&fake, chain_job()).await;

    fake.add_allocation(
        AllocBuilder::new("a-1", "A")
            .state("main", succeeded())
            .state("next", running())
            .build(),
    );

    let mut pc = controller(&fake, job, ctx("A", "next", "a-1"));
    assert!(pc.next(&["B"], None).await.unwrap());

    assert_eq!(count_of(pc.job(), "B"), 1);
    assert_eq!(count_of(pc.job(), "A"), 0, "finished stage deactivates itself");
}

#[tokio::test]
async fn next_does_nothing_when_a_task_failed() {
    init_tracing();
    let fake = FakeNomad::new();
    let job = initialized(&fake, chain_job()).await;

    fake.add_allocation(
        AllocBuilder::new("a-1", "A")
            .state("main", failed())
            .state("next", running())
            .build(),
    );

    let mut pc = controller(&fake, job, ctx("A", "next", "a-1"));
    assert!(!pc.next(&["B"], None).await.unwrap());

    assert_eq!(count_of(pc.job(), "B"), 0);
    assert_eq!(count_of(pc.job(), "A"), 1);
}

#[tokio::test]
async fn leader_stops_the_whole_pipeline() {
    init_tracing();
    let job = JobBuilder::new(JOB_ID)
        .group(init_group())
        .group(GroupBuilder::stage("A").count(1).build())
        .group(GroupBuilder::stage("L").tag(Tag::Leader, "true").count(1).build())
        .group(GroupBuilder::stage("Z").count(2).build())
        .build();
    let fake = FakeNomad::with_job(job.clone());

    // The leader's own work failed; it still stops everything.
    fake.add_allocation(AllocBuilder::new("l-1", "L").state("main", failed()).build());

    let mut pc = controller(&fake, job, ctx("L", "next", "l-1"));
    assert!(pc.next(&["Z"], None).await.unwrap());

    for group in ["init", "A", "L", "Z"] {
        assert_eq!(count_of(pc.job(), group), 0, "{group}");
    }
}

#[tokio::test]
async fn count_tag_fans_out() {
    init_tracing();
    let job = JobBuilder::new(JOB_ID)
        .group(init_group())
        .group(
            GroupBuilder::stage("A")
                .tag(Tag::Root, "true")
                .tag(Tag::Next, "B")
                .build(),
        )
        .group(
            GroupBuilder::stage("B")
                .tag(Tag::Dependencies, "A")
                .tag(Tag::Count, "3")
                .build(),
        )
        .build();
    let fake = FakeNomad::new();
    let job = initialized(&fake, job).await;

    fake.add_allocation(AllocBuilder::new("a-1", "A").state("main", succeeded()).build());

    let mut pc = controller(&fake, job, ctx("A", "next", "a-1"));
    pc.next(&["B"], None).await.unwrap();

    assert_eq!(count_of(pc.job(), "B"), 3);
}

#[tokio::test]
async fn bad_count_tag_defaults_to_one() {
    init_tracing();
    let job = JobBuilder::new(JOB_ID)
        .group(GroupBuilder::stage("A").count(1).build())
        .group(GroupBuilder::stage("B").tag(Tag::Count, "lots").build())
        .build();
    let fake = FakeNomad::with_job(job.clone());
    fake.add_allocation(AllocBuilder::new("a-1", "A").state("main", succeeded()).build());

    let mut pc = controller(&fake, job, ctx("A", "next", "a-1"));
    pc.next(&["B"], None).await.unwrap();

    assert_eq!(count_of(pc.job(), "B"), 1);
}

#[tokio::test]
async fn running_target_is_not_retriggered_but_failed_one_is() {
    init_tracing();
    let job = JobBuilder::new(JOB_ID)
        .group(GroupBuilder::stage("A").count(1).build())
        .group(GroupBuilder::stage("B").build())
        .group(GroupBuilder::stage("C").build())
        .build();
    let fake = FakeNomad::with_job(job.clone());
    fake.add_allocation(AllocBuilder::new("a-1", "A").state("main", succeeded()).build());
    fake.add_allocation(AllocBuilder::new("b-1", "B").state("main", running()).build());
    fake.add_allocation(AllocBuilder::new("c-1", "C").state("main", failed()).build());

    let mut pc = controller(&fake, job, ctx("A", "next", "a-1"));
    pc.next(&["B", "C"], None).await.unwrap();

    assert_eq!(count_of(pc.job(), "B"), 0, "still running");
    assert_eq!(count_of(pc.job(), "C"), 1, "attempted before, safe to retrigger");
}

#[tokio::test]
async fn unknown_target_is_skipped() {
    init_tracing();
    let job = JobBuilder::new(JOB_ID)
        .group(GroupBuilder::stage("A").count(1).build())
        .group(GroupBuilder::stage("B").build())
        .build();
    let fake = FakeNomad::with_job(job.clone());
    fake.add_allocation(AllocBuilder::new("a-1", "A").state("main", succeeded()).build());

    let mut pc = controller(&fake, job, ctx("A", "next", "a-1"));
    assert!(pc.next(&["ghost", "B"], None).await.unwrap());
    assert_eq!(count_of(pc.job(), "B"), 1);
}

#[tokio::test]
async fn init_without_root_is_fatal() {
    init_tracing();
    let job = JobBuilder::new(JOB_ID)
        .group(init_group())
        .group(GroupBuilder::stage("A").build())
        .build();
    let fake = FakeNomad::with_job(job.clone());
    fake.add_allocation(AllocBuilder::new("init-1", "init").state("init", running()).build());

    let mut pc = controller(&fake, job, ctx("init", "init", "init-1"));
    assert!(matches!(pc.init().await, Err(PipelineError::NoRootStage(_))));
    assert!(fake.registrations().is_empty());
}

const STAGE_X: &str = r#"[
  {
    "Name": "X",
    "Count": 0,
    "Meta": { "nomad-pipeline/root": "true", "nomad-pipeline/next": "Y" },
    "Tasks": [{ "Name": "main", "Driver": "docker", "Config": { "image": "alpine" } }]
  }
]"#;

const STAGE_Y: &str = r#"[
  {
    "Name": "Y",
    "Count": null,
    "Meta": { "nomad-pipeline/dependencies": "X" },
    "Tasks": [{ "Name": "main", "Driver": "docker", "Config": { "image": "alpine" } }]
  }
]"#;

fn discover_job() -> Job {
    JobBuilder::new(JOB_ID)
        .group(
            GroupBuilder::stage("discover")
                .task(task("next"))
                .tag(Tag::DynamicTasks, "out/*.json")
                .count(1)
                .build(),
        )
        .group(GroupBuilder::stage("report").build())
        .build()
}

#[tokio::test]
async fn dynamic_stages_are_merged_and_their_roots_activated() {
    init_tracing();
    let job = discover_job();
    let fake = FakeNomad::with_job(job.clone());
    fake.add_allocation(
        AllocBuilder::new("d-1", "discover")
            .state("main", succeeded())
            .build(),
    );

    let fs = MockFileSystem::new();
    fs.add_file("/alloc/out/1.json", STAGE_X);
    fs.add_file("/alloc/out/2.json", STAGE_Y);
    fs.add_file("/alloc/logs/ignored.json", "not json");

    let mut pc = controller_with_fs(&fake, job, ctx("discover", "next", "d-1"), Arc::new(fs));
    assert!(pc.next(&NO_STAGES, Some("out/*.json")).await.unwrap());

    let job = pc.job();
    for stage in ["X", "Y"] {
        let group = job.lookup_task_group(stage).unwrap();
        assert_eq!(
            group.meta.get(Tag::ParentTask.key()).map(String::as_str),
            Some("discover"),
            "{stage}"
        );
    }

    assert_eq!(count_of(job, "X"), 1);
    assert_eq!(count_of(job, "Y"), 0);
    assert_eq!(count_of(job, "report"), 0);
    assert_eq!(count_of(job, "discover"), 0);

    assert_eq!(task_args(job, "X", "next").unwrap(), vec!["agent", "next", "Y"]);
    assert_eq!(task_args(job, "Y", "wait").unwrap(), vec!["agent", "wait", "X"]);
}

#[tokio::test]
async fn dynamic_stages_without_root_are_fatal() {
    init_tracing();
    let job = discover_job();
    let fake = FakeNomad::with_job(job.clone());
    fake.add_allocation(
        AllocBuilder::new("d-1", "discover")
            .state("main", succeeded())
            .build(),
    );

    let fs = MockFileSystem::new();
    fs.add_file("/alloc/out/2.json", STAGE_Y.replace("\"X\"", "\"report\""));

    let mut pc = controller_with_fs(&fake, job, ctx("discover", "next", "d-1"), Arc::new(fs));
    let result = pc.next(&NO_STAGES, Some("out/*.json")).await;

    assert!(matches!(result, Err(PipelineError::NoRootStage(_))), "{result:?}");
}

#[tokio::test]
async fn malformed_dynamic_file_is_reported_with_its_path() {
    init_tracing();
    let job = discover_job();
    let fake = FakeNomad::with_job(job.clone());
    fake.add_allocation(
        AllocBuilder::new("d-1", "discover")
            .state("main", succeeded())
            .build(),
    );

    let fs = MockFileSystem::new();
    fs.add_file("/alloc/out/broken.json", "{ nope");

    let mut pc = controller_with_fs(&fake, job, ctx("discover", "next", "d-1"), Arc::new(fs));
    match pc.next(&NO_STAGES, Some("out/*.json")).await {
        Err(PipelineError::DynamicTasks { path, .. }) => assert!(path.ends_with("broken.json")),
        other => panic!("expected DynamicTasks, got {other:?}"),
    }
}

#[tokio::test]
async fn second_replica_keeps_running_dynamic_stages() {
    init_tracing();
    let mut job = discover_job();
    job.lookup_task_group_mut("discover").unwrap().count = 2;
    let fake = FakeNomad::with_job(job.clone());
    fake.add_allocation(
        AllocBuilder::new("d-1", "discover")
            .state("main", succeeded())
            .build(),
    );
    fake.add_allocation(
        AllocBuilder::new("d-2", "discover")
            .slot(1)
            .state("main", running())
            .build(),
    );

    let files = || {
        let fs = MockFileSystem::new();
        fs.add_file("/alloc/out/1.json", STAGE_X);
        fs.add_file("/alloc/out/2.json", STAGE_Y);
        Arc::new(fs)
    };

    let mut first = controller_with_fs(&fake, job, ctx("discover", "next", "d-1"), files());
    assert!(first.next(&NO_STAGES, Some("out/*.json")).await.unwrap());
    first.commit().await.unwrap();

    let merged = fake.job(JOB_ID).unwrap();
    assert_eq!(count_of(&merged, "X"), 1);
    assert_eq!(count_of(&merged, "discover"), 2, "d-2 still running");

    fake.add_allocation(AllocBuilder::new("x-1", "X").state("main", running()).build());
    fake.add_allocation(
        AllocBuilder::new("d-2", "discover")
            .slot(1)
            .state("main", succeeded())
            .build(),
    );

    let mut second = controller_with_fs(&fake, merged, ctx("discover", "next", "d-2"), files());
    assert!(second.next(&NO_STAGES, Some("out/*.json")).await.unwrap());
    second.commit().await.unwrap();

    let job = fake.job(JOB_ID).unwrap();
    assert_eq!(count_of(&job, "X"), 1);
    assert_eq!(count_of(&job, "Y"), 0);
    assert_eq!(count_of(&job, "discover"), 0);
    assert_eq!(task_args(&job, "X", "next").unwrap(), vec!["agent", "next", "Y"]);
    assert_eq!(
        job.task_groups.iter().filter(|g| g.name == "X").count(),
        1,
        "no duplicate groups"
    );
}
