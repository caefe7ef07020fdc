//! Tracker rows: find by key, insert-or-update, compare-and-delete.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{ProviderJobId, Tracker, TrackerId};
use crate::store::TrackerStore;

impl TrackerStore for super::Db {
    async fn find_by_key(&self, key: &str) -> Result<Option<Tracker>> {
        let row: Option<TrackerRow> = sqlx::query_as(
            "SELECT id, key, provider_job_id, scheduled_at, updated_at
             FROM trackers WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Tracker::from))
    }

    async fn save(&self, tracker: &mut Tracker) -> Result<()> {
        let provider_job_id = tracker.provider_job_id.as_ref().map(ProviderJobId::as_str);

        if let Some(id) = tracker.id {
            let updated: Option<(DateTime<Utc>,)> = sqlx::query_as(
                "UPDATE trackers SET provider_job_id = $2, scheduled_at = $3, updated_at = now()
                 WHERE id = $1
                 RETURNING updated_at",
            )
            .bind(id.0)
            .bind(provider_job_id)
            .bind(tracker.scheduled_at)
            .fetch_optional(self.pool())
            .await?;

            if let Some((updated_at,)) = updated {
                tracker.updated_at = Some(updated_at);
                return Ok(());
            }
            // Row was cleaned up underneath us; re-insert under the same id.
        }

        let id = tracker.id.unwrap_or_default();
        // The unique index on key turns a concurrent insert into DO NOTHING.
        let inserted: Option<(DateTime<Utc>,)> = sqlx::query_as(
            "INSERT INTO trackers (id, key, provider_job_id, scheduled_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (key) DO NOTHING
             RETURNING updated_at",
        )
        .bind(id.0)
        .bind(&tracker.key)
        .bind(provider_job_id)
        .bind(tracker.scheduled_at)
        .fetch_optional(self.pool())
        .await?;

        match inserted {
            Some((updated_at,)) => {
                tracker.id = Some(id);
                tracker.updated_at = Some(updated_at);
                Ok(())
            }
            None => Err(Error::StoreConflict {
                key: tracker.key.clone(),
            }),
        }
    }

    async fn delete(&self, tracker: &Tracker) -> Result<bool> {
        let Some(id) = tracker.id else {
            return Ok(false);
        };

        let rows_affected = sqlx::query(
            "DELETE FROM trackers
             WHERE id = $1 AND provider_job_id IS NOT DISTINCT FROM $2",
        )
        .bind(id.0)
        .bind(tracker.provider_job_id.as_ref().map(ProviderJobId::as_str))
        .execute(self.pool())
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }
}

impl super::Db {
    /// List trackers, most recently written first.
    pub async fn list_trackers(&self, prefix: Option<&str>, limit: i64) -> Result<Vec<Tracker>> {
        let rows: Vec<TrackerRow> = sqlx::query_as(
            "SELECT id, key, provider_job_id, scheduled_at, updated_at
             FROM trackers
             WHERE ($1::text IS NULL OR starts_with(key, $1))
             ORDER BY updated_at DESC
             LIMIT $2",
        )
        .bind(prefix)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Tracker::from).collect())
    }

    /// Delete trackers whose execution time (or last write, when
    /// unscheduled) is before `cutoff`. Returns how many were removed.
    pub async fn purge_stale_trackers(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let rows_affected = sqlx::query(
            "DELETE FROM trackers WHERE COALESCE(scheduled_at, updated_at) < $1",
        )
        .bind(cutoff)
        .execute(self.pool())
        .await?
        .rows_affected();

        Ok(rows_affected)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct TrackerRow {
    id: Uuid,
    key: String,
    provider_job_id: Option<String>,
    scheduled_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<TrackerRow> for Tracker {
    fn from(row: TrackerRow) -> Self {
        Tracker {
            id: Some(TrackerId(row.id)),
            key: row.key,
            provider_job_id: row.provider_job_id.map(ProviderJobId),
            scheduled_at: row.scheduled_at,
            updated_at: Some(row.updated_at),
        }
    }
}
