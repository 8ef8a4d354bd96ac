// src/controller/mutator.rs

use tracing::debug;

use crate::errors::Result;
use crate::nomad::api::NomadApi;
use crate::nomad::model::Job;

/// Persist `job` with optimistic concurrency.
///
/// The write carries the job modify index the job was read at and only
/// succeeds if Nomad still holds that index. On success the cached index is
/// advanced so a later commit in the same invocation chains correctly.
/// Conflicts and transport failures are returned as-is, never retried.
pub async fn commit<A: NomadApi + ?Sized>(api: &A, job: &mut Job) -> Result<()> {
    debug!(
        job_id = %job.id,
        modify_index = job.job_modify_index,
        "updating job"
    );

    let resp = api.register_job(job, job.job_modify_index).await?;

    debug!(
        job_id = %job.id,
        modify_index = resp.job_modify_index,
        eval_id = %resp.eval_id,
        "updated job"
    );
    job.job_modify_index = resp.job_modify_index;

    Ok(())
}
