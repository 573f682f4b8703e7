//! SQLite implementation of the ResultStore.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::parse_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CompetitionTask, DuelKey, DuelResult, Experiment, MetricScores};
use crate::domain::ports::ResultStore;

/// Experiment, task and duel result tables of one experiment database.
#[derive(Clone)]
pub struct SqliteResultStore {
    pool: SqlitePool,
}

impl SqliteResultStore {
    /// Store over an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn load_experiment(&self) -> DomainResult<Option<Experiment>> {
        let row: Option<ExperimentRow> = sqlx::query_as(
            "SELECT created_at, initialized, template_id, worker_ids, rounds, pairs_per_round, task_count, total_duels FROM experiment WHERE id = 0",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn save_experiment(&self, experiment: &Experiment) -> DomainResult<()> {
        let result = sqlx::query(
            r#"INSERT INTO experiment (id, created_at, initialized, template_id, worker_ids, rounds, pairs_per_round, task_count, total_duels)
               VALUES (0, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO NOTHING"#,
        )
        .bind(experiment.created_at.to_rfc3339())
        .bind(experiment.initialized)
        .bind(&experiment.template_id)
        .bind(serde_json::to_string(&experiment.worker_ids)?)
        .bind(experiment.rounds as i64)
        .bind(experiment.pairs_per_round as i64)
        .bind(experiment.task_count as i64)
        .bind(experiment.total_duels as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ExperimentAlreadyExists);
        }
        Ok(())
    }

    async fn mark_initialized(&self) -> DomainResult<()> {
        let result = sqlx::query("UPDATE experiment SET initialized = 1 WHERE id = 0")
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ValidationFailed("no experiment to mark as initialized".to_string()));
        }
        Ok(())
    }

    async fn reset(&self) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM duel_result").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM competition_task").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM experiment").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_task(&self, task: &CompetitionTask) -> DomainResult<()> {
        sqlx::query("INSERT INTO competition_task (task_index, description, created_by, created_at) VALUES (?, ?, ?, ?)")
            .bind(task.task_index as i64)
            .bind(&task.description)
            .bind(&task.created_by)
            .bind(task.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_tasks(&self) -> DomainResult<Vec<CompetitionTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT task_index, description, created_by, created_at FROM competition_task ORDER BY task_index",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn save_duel_result(&self, result: &DuelResult) -> DomainResult<bool> {
        let outcome = sqlx::query(
            r#"INSERT INTO duel_result (created_at, round, task_index, master_id, student_id, scores)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(master_id, student_id, round) DO NOTHING"#,
        )
        .bind(result.created_at.to_rfc3339())
        .bind(result.round as i64)
        .bind(result.task_index as i64)
        .bind(&result.master_id)
        .bind(&result.student_id)
        .bind(serde_json::to_string(&result.scores)?)
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() > 0)
    }

    async fn has_result(&self, key: &DuelKey) -> DomainResult<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM duel_result WHERE master_id = ? AND student_id = ? AND round = ?")
                .bind(&key.master_id)
                .bind(&key.student_id)
                .bind(key.round as i64)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn list_results(&self) -> DomainResult<Vec<DuelResult>> {
        let rows: Vec<ResultRow> = sqlx::query_as(
            "SELECT created_at, round, task_index, master_id, student_id, scores FROM duel_result ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count_results(&self) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM duel_result")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[derive(sqlx::FromRow)]
struct ExperimentRow {
    created_at: String,
    initialized: bool,
    template_id: String,
    worker_ids: String,
    rounds: i64,
    pairs_per_round: i64,
    task_count: i64,
    total_duels: i64,
}

impl TryFrom<ExperimentRow> for Experiment {
    type Error = DomainError;

    fn try_from(row: ExperimentRow) -> Result<Self, Self::Error> {
        Ok(Experiment {
            created_at: parse_datetime(&row.created_at)?,
            initialized: row.initialized,
            template_id: row.template_id,
            worker_ids: serde_json::from_str(&row.worker_ids)?,
            rounds: row.rounds as usize,
            pairs_per_round: row.pairs_per_round as usize,
            task_count: row.task_count as usize,
            total_duels: row.total_duels as usize,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    task_index: i64,
    description: String,
    created_by: String,
    created_at: String,
}

impl TryFrom<TaskRow> for CompetitionTask {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(CompetitionTask {
            task_index: row.task_index as usize,
            description: row.description,
            created_by: row.created_by,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    created_at: String,
    round: i64,
    task_index: i64,
    master_id: String,
    student_id: String,
    scores: String,
}

impl TryFrom<ResultRow> for DuelResult {
    type Error = DomainError;

    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        let scores: MetricScores = serde_json::from_str(&row.scores)?;
        Ok(DuelResult {
            created_at: parse_datetime(&row.created_at)?,
            round: row.round as usize,
            task_index: row.task_index as usize,
            master_id: row.master_id,
            student_id: row.student_id,
            scores,
        })
    }
}
