//! SQLite-backed durable duel queue.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DuelRequest, QueueCounts, QueueStatus};
use crate::domain::ports::DuelQueue;

/// Durable duel queue stored in the experiment's `duel_queue` table.
#[derive(Clone)]
pub struct SqliteDuelQueue {
    pool: SqlitePool,
}

impl SqliteDuelQueue {
    /// Queue over an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn transition(&self, message_id: Uuid, to: QueueStatus) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE duel_queue SET status = ?, done_at = ? WHERE message_id = ? AND status = 'locked'",
        )
        .bind(to.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(message_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let actual: Option<(String,)> = sqlx::query_as("SELECT status FROM duel_queue WHERE message_id = ?")
                .bind(message_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            return Err(DomainError::InvalidQueueTransition {
                message_id,
                actual: actual.map_or_else(|| "missing".to_string(), |(s,)| s),
            });
        }

        Ok(())
    }

    async fn requeue(&self, from: QueueStatus) -> DomainResult<bool> {
        let result = sqlx::query(
            "UPDATE duel_queue SET status = 'pending', message_id = NULL, locked_at = NULL, done_at = NULL WHERE status = ?",
        )
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DuelQueue for SqliteDuelQueue {
    async fn add(&self, request: &DuelRequest) -> DomainResult<()> {
        sqlx::query("INSERT INTO duel_queue (payload, status, enqueued_at) VALUES (?, 'pending', ?)")
            .bind(serde_json::to_string(request)?)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_all(&self, requests: &[DuelRequest]) -> DomainResult<usize> {
        let enqueued_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for request in requests {
            sqlx::query("INSERT INTO duel_queue (payload, status, enqueued_at) VALUES (?, 'pending', ?)")
                .bind(serde_json::to_string(request)?)
                .bind(&enqueued_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(requests.len())
    }

    async fn get(&self) -> DomainResult<Option<DuelRequest>> {
        let message_id = Uuid::new_v4();
        // Single statement, so two consumers can never lock the same row.
        let row: Option<(String,)> = sqlx::query_as(
            r#"UPDATE duel_queue
               SET status = 'locked', message_id = ?, locked_at = ?, attempts = attempts + 1
               WHERE seq = (SELECT seq FROM duel_queue WHERE status = 'pending' ORDER BY seq LIMIT 1)
               RETURNING payload"#,
        )
        .bind(message_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(payload,)| {
            let mut request: DuelRequest = serde_json::from_str(&payload)?;
            request.message_id = Some(message_id);
            Ok::<_, DomainError>(request)
        })
        .transpose()
    }

    async fn mark_done(&self, message_id: Uuid) -> DomainResult<()> {
        self.transition(message_id, QueueStatus::Done).await
    }

    async fn mark_failed(&self, message_id: Uuid) -> DomainResult<()> {
        self.transition(message_id, QueueStatus::Failed).await
    }

    async fn retry_failed(&self) -> DomainResult<bool> {
        self.requeue(QueueStatus::Failed).await
    }

    async fn retry_locked(&self) -> DomainResult<bool> {
        self.requeue(QueueStatus::Locked).await
    }

    async fn prune(&self, include_failed: bool) -> DomainResult<u64> {
        let sql = if include_failed {
            "DELETE FROM duel_queue WHERE status IN ('done', 'failed')"
        } else {
            "DELETE FROM duel_queue WHERE status = 'done'"
        };
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn pending_count(&self) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM duel_queue WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn status_counts(&self) -> DomainResult<QueueCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT status, COUNT(*) FROM duel_queue GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = QueueCounts::default();
        for (status, count) in rows {
            let count = count as u64;
            match QueueStatus::from_str(&status) {
                Some(QueueStatus::Pending) => counts.pending = count,
                Some(QueueStatus::Locked) => counts.locked = count,
                Some(QueueStatus::Done) => counts.done = count,
                Some(QueueStatus::Failed) => counts.failed = count,
                None => {
                    return Err(DomainError::SerializationError(format!("Invalid queue status: {status}")));
                }
            }
        }
        Ok(counts)
    }

    async fn clear(&self) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM duel_queue").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
