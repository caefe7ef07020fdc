//! Throttle entries in the `coordinator_cache` table.
//!
//! Fetch-or-compute claims the key before computing: an upsert that only
//! overwrites expired rows. Postgres serializes concurrent upserts on the
//! same key, so exactly one caller gets the row back and runs the
//! computation. The claim row itself is the throttle entry; it is removed
//! again if the computation fails.

use chrono::TimeDelta;
use std::future::Future;
use tracing::warn;
use uuid::Uuid;

use crate::cache::{Fetched, TtlCache};
use crate::error::{Error, Result};

fn unavailable(e: sqlx::Error) -> Error {
    Error::CacheUnavailable(e.to_string())
}

impl TtlCache for super::Db {
    async fn fetch_or_compute<T, F, Fut>(
        &self,
        key: &str,
        ttl: TimeDelta,
        compute: F,
    ) -> Result<Fetched<T>>
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let claim = Uuid::new_v4().to_string();

        let claimed: Option<(String,)> = sqlx::query_as(
            "INSERT INTO coordinator_cache (key, value, expires_at)
             VALUES ($1, $2, now() + ($3::float8 / 1000.0) * interval '1 second')
             ON CONFLICT (key) DO UPDATE
                 SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
                 WHERE coordinator_cache.expires_at <= now()
             RETURNING key",
        )
        .bind(key)
        .bind(&claim)
        .bind(ttl.num_milliseconds())
        .fetch_optional(self.pool())
        .await
        .map_err(unavailable)?;

        if claimed.is_none() {
            return Ok(Fetched::Cached);
        }

        match compute().await {
            Ok(value) => Ok(Fetched::Computed(value)),
            Err(e) => {
                let released = sqlx::query(
                    "DELETE FROM coordinator_cache WHERE key = $1 AND value = $2",
                )
                .bind(key)
                .bind(&claim)
                .execute(self.pool())
                .await;
                if let Err(release_err) = released {
                    warn!(%key, error = %release_err, "failed to release throttle claim");
                }
                Err(e)
            }
        }
    }

    async fn write(&self, key: &str, value: &str, ttl: TimeDelta) -> Result<()> {
        sqlx::query(
            "INSERT INTO coordinator_cache (key, value, expires_at)
             VALUES ($1, $2, now() + ($3::float8 / 1000.0) * interval '1 second')
             ON CONFLICT (key) DO UPDATE
                 SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.num_milliseconds())
        .execute(self.pool())
        .await
        .map_err(unavailable)?;
        Ok(())
    }
}

impl super::Db {
    /// Remaining lifetime of the live entry for `key`.
    pub async fn cache_ttl(&self, key: &str) -> Result<Option<TimeDelta>> {
        let row: Option<(f64,)> = sqlx::query_as(
            "SELECT EXTRACT(EPOCH FROM (expires_at - now()))::float8
             FROM coordinator_cache WHERE key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(unavailable)?;

        Ok(row.map(|(secs,)| TimeDelta::milliseconds((secs * 1000.0) as i64)))
    }

    /// Delete expired entries. Returns how many were removed.
    pub async fn purge_expired_cache(&self) -> Result<u64> {
        let rows_affected = sqlx::query("DELETE FROM coordinator_cache WHERE expires_at <= now()")
            .execute(self.pool())
            .await
            .map_err(unavailable)?
            .rows_affected();
        Ok(rows_affected)
    }
}
