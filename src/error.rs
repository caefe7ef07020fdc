//! Error types for deferq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A throttle setting that is neither a positive duration nor "daily".
    /// Raised when the cache expiry is computed, not at registration.
    #[error("policy misconfiguration for {job_type}: {reason}")]
    PolicyMisconfiguration { job_type: String, reason: String },

    /// Key uniqueness violation while persisting a tracker.
    #[error("tracker for key {key:?} already exists")]
    StoreConflict { key: String },

    /// The TTL cache could not be reached. Never downgraded to admission.
    #[error("ttl cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("submission failed: {0}")]
    Submission(String),

    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
