//! pgmq queue operations via direct SQLx.
//!
//! The host scheduler side of deferq: delayed delivery comes from
//! `pgmq.send`'s delay argument, and the returned `msg_id` is the provider
//! job id the coordinator tracks.

use chrono::{DateTime, TimeDelta, Utc};
use opentelemetry::KeyValue;

use crate::error::Result;
use crate::telemetry::metrics;

/// A message read from a pgmq queue.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub msg_id: i64,
    /// Deliveries so far, including this one.
    pub read_ct: i32,
    pub enqueued_at: DateTime<Utc>,
    /// Visible again to other readers after this instant.
    pub vt: DateTime<Utc>,
    pub message: serde_json::Value,
}

type MessageRow = (i64, i32, DateTime<Utc>, DateTime<Utc>, serde_json::Value);

/// Whole seconds to hold back a message, rounding partial seconds up so
/// delivery never precedes the requested time.
pub fn delay_seconds(delay: TimeDelta) -> i32 {
    if delay <= TimeDelta::zero() {
        return 0;
    }
    let secs = delay.num_seconds() + i64::from(delay.subsec_nanos() > 0);
    i32::try_from(secs).unwrap_or(i32::MAX)
}

fn count(queue_name: &str, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue_name.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}

impl super::Db {
    /// Create a pgmq queue (idempotent).
    pub async fn create_queue(&self, queue_name: &str) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(self.pool())
            .await?;
        count(queue_name, "create");
        Ok(())
    }

    /// Send a message, invisible to readers until `delay` has passed.
    /// Returns the message ID.
    pub async fn send_to_queue(
        &self,
        queue_name: &str,
        payload: &serde_json::Value,
        delay: TimeDelta,
    ) -> Result<i64> {
        let (msg_id,): (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, $3)")
            .bind(queue_name)
            .bind(payload)
            .bind(delay_seconds(delay))
            .fetch_one(self.pool())
            .await?;
        count(queue_name, "send");
        Ok(msg_id)
    }

    /// Read the next visible message, hiding it for `vt_seconds`.
    /// Returns None if nothing is visible.
    pub async fn read_from_queue(
        &self,
        queue_name: &str,
        vt_seconds: i32,
    ) -> Result<Option<QueueMessage>> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT msg_id, read_ct, enqueued_at, vt, message FROM pgmq.read($1, $2, 1)",
        )
        .bind(queue_name)
        .bind(vt_seconds)
        .fetch_optional(self.pool())
        .await?;

        count(queue_name, if row.is_some() { "read" } else { "read_empty" });

        Ok(row.map(|(msg_id, read_ct, enqueued_at, vt, message)| QueueMessage {
            msg_id,
            read_ct,
            enqueued_at,
            vt,
            message,
        }))
    }

    /// Archive a message (moves to archive table, preserves for audit).
    pub async fn archive_message(&self, queue_name: &str, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .execute(self.pool())
            .await?;
        count(queue_name, "archive");
        Ok(())
    }

    /// Delete a message permanently.
    pub async fn delete_message(&self, queue_name: &str, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.delete($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .execute(self.pool())
            .await?;
        count(queue_name, "delete");
        Ok(())
    }
}
