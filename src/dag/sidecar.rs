// src/dag/sidecar.rs

//! Synthetic `wait` / `next` tasks injected into pipeline stages.
//!
//! `wait` runs as a prestart hook and blocks the stage until its
//! dependencies succeeded. `next` runs as a poststop hook and activates the
//! stages that follow. Both run this binary, so they are built from the
//! invoking task: same driver, same config, same env, different args.

use serde_json::Value;

use crate::nomad::model::{LifecycleHook, Task, TaskLifecycle};

pub const WAIT_TASK: &str = "wait";
pub const NEXT_TASK: &str = "next";

/// Task name of the pipeline initializer.
pub const INIT_TASK: &str = "init";

/// Driver used when the template task does not name one.
const DEFAULT_DRIVER: &str = "docker";

/// Whether `name` is one of the injected hook tasks.
pub fn is_synthetic_task(name: &str) -> bool {
    name == WAIT_TASK || name == NEXT_TASK
}

pub fn wait_args(dependencies: &[String]) -> Vec<String> {
    let mut args = vec!["agent".to_string(), "wait".to_string()];
    args.extend(dependencies.iter().cloned());
    args
}

pub fn next_args(next: &[String], dynamic_tasks: Option<&str>) -> Vec<String> {
    let mut args = vec!["agent".to_string(), "next".to_string()];
    if let Some(glob) = dynamic_tasks {
        args.push("--dynamic-tasks".to_string());
        args.push(glob.to_string());
    }
    args.extend(next.iter().cloned());
    args
}

pub fn wait_task(template: &Task, dependencies: &[String]) -> Task {
    hook_task(
        template,
        WAIT_TASK,
        LifecycleHook::Prestart,
        wait_args(dependencies),
    )
}

pub fn next_task(template: &Task, next: &[String], dynamic_tasks: Option<&str>) -> Task {
    hook_task(
        template,
        NEXT_TASK,
        LifecycleHook::Poststop,
        next_args(next, dynamic_tasks),
    )
}

fn hook_task(template: &Task, name: &str, hook: LifecycleHook, args: Vec<String>) -> Task {
    let driver = if template.driver.is_empty() {
        DEFAULT_DRIVER
    } else {
        template.driver.as_str()
    };

    let mut task = Task::new(name, driver);
    task.env = template.env.clone();
    task.config = template.config.clone();
    task.config.insert(
        "args".to_string(),
        Value::Array(args.into_iter().map(Value::String).collect()),
    );
    task.lifecycle = Some(TaskLifecycle {
        hook,
        sidecar: false,
    });
    task
}
