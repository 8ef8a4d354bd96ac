// src/completion/success.rs

//! Did a single task finish successfully?

use tracing::{error, warn};

use crate::nomad::model::{TASK_TERMINATED, TaskState};

/// Detail key carrying a terminated task's exit code.
pub const EXIT_CODE_DETAIL: &str = "exit_code";

/// Success predicate for one task's state.
///
/// A task is successful when it is not marked failed and its latest
/// `Terminated` event reports exit code 0 (or no exit code at all). A task
/// with no `Terminated` event is never considered successful.
pub fn task_succeeded(state: &TaskState) -> bool {
    if state.failed {
        return false;
    }

    let Some(last) = state
        .events
        .iter()
        .filter(|event| event.kind == TASK_TERMINATED)
        .max_by_key(|event| event.time)
    else {
        warn!("task not marked as failed and has no terminated events");
        return false;
    };

    let Some(code_str) = last.details.get(EXIT_CODE_DETAIL) else {
        return true;
    };

    match code_str.trim().parse::<i64>() {
        Ok(0) => true,
        Ok(code) => {
            warn!(
                exit_code = code,
                "non-zero exit code and task not marked as failed, likely stopped by signal"
            );
            false
        }
        Err(err) => {
            error!(exit_code = %code_str, error = %err, "can't convert exit code to an integer");
            false
        }
    }
}
