//! Runs a job type's executable for one delivered job.

use std::path::Path;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::ProviderJobId;
use crate::queue::QueuedJob;

/// Result of running a job's executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { duration_ms: u64 },
    Failed { error: String, duration_ms: u64 },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            RunOutcome::Completed { duration_ms } | RunOutcome::Failed { duration_ms, .. } => {
                *duration_ms
            }
        }
    }
}

/// Run `command` for `job`. The job is passed through the environment:
/// `DEFERQ_JOB_TYPE`, `DEFERQ_JOB_KEY`, `DEFERQ_JOB_ARGS` (JSON array) and
/// `DEFERQ_PROVIDER_JOB_ID`.
pub async fn run_command(
    command: &Path,
    job: &QueuedJob,
    provider_job_id: &ProviderJobId,
) -> RunOutcome {
    let start = Instant::now();
    match spawn(command, job, provider_job_id).await {
        Ok(()) => RunOutcome::Completed {
            duration_ms: start.elapsed().as_millis() as u64,
        },
        Err(e) => RunOutcome::Failed {
            error: e.to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        },
    }
}

async fn spawn(command: &Path, job: &QueuedJob, provider_job_id: &ProviderJobId) -> Result<()> {
    // Relative commands resolve against the process CWD (project root).
    let abs_command = if command.is_relative() {
        std::env::current_dir()?.join(command)
    } else {
        command.to_path_buf()
    };

    let args = serde_json::to_string(&job.args)
        .map_err(|e| Error::Other(format!("serialize job args: {e}")))?;

    debug!(
        job_type = %job.job_type,
        command = %abs_command.display(),
        "running job command"
    );

    let status = Command::new(&abs_command)
        .env("DEFERQ_JOB_TYPE", &job.job_type)
        .env("DEFERQ_JOB_KEY", &job.key)
        .env("DEFERQ_JOB_ARGS", args)
        .env("DEFERQ_PROVIDER_JOB_ID", provider_job_id.as_str())
        .status()
        .await?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::Other(format!(
            "{} exited with status {}",
            job.job_type,
            status.code().unwrap_or(-1)
        )))
    }
}
