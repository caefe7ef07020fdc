use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// The most recent pending scheduling request for a logical key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracker {
    /// Store-assigned identity. `None` until the tracker has been saved.
    pub id: Option<TrackerId>,

    /// Deterministic identity derived from job type and arguments.
    /// Unique across persisted trackers.
    pub key: String,

    /// Handle assigned by the host scheduler to the admitted execution.
    pub provider_job_id: Option<ProviderJobId>,

    /// When the tracked execution is intended to run.
    pub scheduled_at: Option<DateTime<Utc>>,

    /// Last time the store wrote this row.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Tracker {
    /// An unsaved tracker for `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            id: None,
            key: key.into(),
            provider_job_id: None,
            scheduled_at: None,
            updated_at: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Does this tracker currently point at `provider_job_id`?
    pub fn names(&self, provider_job_id: &ProviderJobId) -> bool {
        self.provider_job_id.as_ref() == Some(provider_job_id)
    }
}

/// Newtype for tracker row IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackerId(pub Uuid);

impl TrackerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrackerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

// ---------------------------------------------------------------------------
// Provider identifier
// ---------------------------------------------------------------------------

/// Opaque handle the host scheduler assigns to one scheduled execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderJobId(pub String);

impl ProviderJobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ProviderJobId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}
