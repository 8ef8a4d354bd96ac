// src/controller/init.rs

use regex::Regex;
use tracing::info;

use crate::dag::process_task_groups;
use crate::errors::{PipelineError, Result};
use crate::nomad::api::NomadApi;
use crate::tags::Tag;

use super::PipelineController;

/// Job meta key holding the identifier-safe job id.
pub const JOB_ID_SLUG: &str = "JOB_ID_SLUG";

/// Job meta key holding the identifier-safe job name.
pub const JOB_NAME_SLUG: &str = "JOB_NAME_SLUG";

/// Replace runs of non-alphanumerics with `-` and trim the ends.
///
/// `my_job/2024.01` becomes `my-job-2024-01`.
pub fn slugify(raw: &str) -> Result<String> {
    let re = Regex::new(r"[^A-Za-z0-9]+").map_err(anyhow::Error::from)?;
    Ok(re.replace_all(raw, "-").trim_matches('-').to_string())
}

impl<A: NomadApi> PipelineController<A> {
    /// Prepare the whole job and activate its root stages.
    ///
    /// Writes the slug tags, processes every stage, then hands the roots to
    /// [`PipelineController::next`]. A job without a root stage is rejected.
    pub async fn init(&mut self) -> Result<bool> {
        let id_slug = slugify(&self.ctx.job_id)?;
        let name_slug = slugify(&self.ctx.job_name)?;
        self.job.set_meta(JOB_ID_SLUG, id_slug);
        self.job.set_meta(JOB_NAME_SLUG, name_slug);

        let roots = process_task_groups(
            &mut self.job,
            &self.ctx.group_name,
            &self.ctx.task_name,
            None,
        )?;

        if roots.is_empty() {
            return Err(PipelineError::NoRootStage(format!(
                "set the {} tag on at least one stage",
                Tag::Root.key()
            )));
        }

        info!(roots = ?roots, "found root stages");
        self.next(&roots, None).await
    }
}
