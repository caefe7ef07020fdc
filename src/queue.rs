//! Host scheduler adapter: submits coordinated jobs to a pgmq queue.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::coordinator::{Coordinator, Submission};
use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{JobInvocation, ProviderJobId};

/// Message body carried through the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job_type: String,
    pub args: Vec<Value>,
    /// Key computed at enqueue time, so the worker correlates on exactly
    /// the key the tracker was saved under.
    pub key: String,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl From<&JobInvocation> for QueuedJob {
    fn from(job: &JobInvocation) -> Self {
        Self {
            job_type: job.job_type().to_string(),
            args: job.args().to_vec(),
            key: job.key(),
            scheduled_at: job.scheduled_at(),
        }
    }
}

/// Submits jobs through the coordinator to a pgmq queue. The pgmq
/// message id is the provider job id.
#[derive(Clone)]
pub struct JobQueue {
    db: Arc<Db>,
    coordinator: Coordinator<Db, Db>,
    queue_name: String,
}

impl JobQueue {
    pub fn new(db: Arc<Db>, coordinator: Coordinator<Db, Db>, queue_name: impl Into<String>) -> Self {
        Self {
            db,
            coordinator,
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn coordinator(&self) -> &Coordinator<Db, Db> {
        &self.coordinator
    }

    /// Enqueue `job`, delayed until its scheduled time.
    pub async fn enqueue(&self, job: &JobInvocation) -> Result<Submission> {
        let message = QueuedJob::from(job);
        let delay = job
            .scheduled_at()
            .map(|at| at - self.coordinator.clock().now())
            .unwrap_or(TimeDelta::zero());
        let db = &self.db;
        let queue_name = self.queue_name.as_str();

        self.coordinator
            .submit(job, move || async move {
                let payload = serde_json::to_value(&message)
                    .map_err(|e| Error::Submission(format!("serialize job: {e}")))?;
                let msg_id = db.send_to_queue(queue_name, &payload, delay).await?;
                Ok(Some(ProviderJobId::from(msg_id)))
            })
            .await
    }
}
