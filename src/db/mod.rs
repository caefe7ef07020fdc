//! Postgres backing for the coordinator.
//!
//! [`Db`] is both the durable [`TrackerStore`](crate::store::TrackerStore)
//! and the shared [`TtlCache`](crate::cache::TtlCache), and carries the pgmq
//! queue operations the host scheduler adapter sends through.

pub mod cache;
pub mod pgmq;
pub mod trackers;

use std::time::Duration;

use secrecy::ExposeSecret as _;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Config;
use crate::error::{Error, Result};

/// Pool size. Each in-flight job holds at most one connection at a time.
const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Connect, apply migrations and make sure the configured queue exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let db = Self::connect(config.database_url.expose_secret()).await?;
        db.migrate().await?;
        db.create_queue(&config.queue_name).await?;
        Ok(db)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Fails with [`Error::Config`] when the database is reachable but the
    /// pgmq extension is not installed.
    pub async fn health_check(&self) -> Result<()> {
        let installed: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'pgmq')")
                .fetch_one(&self.pool)
                .await?;
        if !installed {
            return Err(Error::Config("pgmq extension is not installed".into()));
        }
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
