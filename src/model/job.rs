use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::key;
use crate::model::policy::{Policy, PolicyOptions};

/// Replaces default key derivation for a job type.
pub type KeyFn = Arc<dyn Fn(&[Value]) -> String + Send + Sync>;

// ---------------------------------------------------------------------------
// Job descriptor
// ---------------------------------------------------------------------------

/// Static description of a job type: its name, tracking policy and key
/// derivation. Built once at registration, then shared immutably.
#[derive(Clone)]
pub struct JobDescriptor {
    job_type: String,
    policy: Policy,
    key_fn: Option<KeyFn>,
}

impl JobDescriptor {
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            policy: Policy::default(),
            key_fn: None,
        }
    }

    /// Register tracking options. Repeated calls merge, last write wins.
    pub fn track(mut self, options: PolicyOptions) -> Self {
        self.policy.merge(options);
        self
    }

    /// Override key derivation for this job type.
    pub fn key_with<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&[Value]) -> String + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Key for `args`: the override when one is installed, the default
    /// derivation otherwise.
    pub fn key_for(&self, args: &[Value]) -> String {
        match &self.key_fn {
            Some(key_fn) => key_fn(args),
            None => key::derive(&self.job_type, args),
        }
    }

    /// Start a scheduling request for this job type.
    pub fn invoke(self: &Arc<Self>, args: Vec<Value>) -> JobInvocation {
        JobInvocation {
            descriptor: Arc::clone(self),
            args,
            scheduled_at: None,
        }
    }
}

impl std::fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("job_type", &self.job_type)
            .field("policy", &self.policy)
            .field("key_fn", &self.key_fn.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Job invocation
// ---------------------------------------------------------------------------

/// One request to schedule a job: type, ordered arguments, and run time.
#[derive(Debug, Clone)]
pub struct JobInvocation {
    descriptor: Arc<JobDescriptor>,
    args: Vec<Value>,
    scheduled_at: Option<DateTime<Utc>>,
}

impl JobInvocation {
    /// Run at or after `at`.
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn descriptor(&self) -> &Arc<JobDescriptor> {
        &self.descriptor
    }

    pub fn job_type(&self) -> &str {
        self.descriptor.job_type()
    }

    pub fn policy(&self) -> &Policy {
        self.descriptor.policy()
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.scheduled_at
    }

    pub fn key(&self) -> String {
        self.descriptor.key_for(&self.args)
    }
}
