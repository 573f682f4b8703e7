//! Storage port for experiment metadata, tasks and duel results.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CompetitionTask, DuelKey, DuelResult, Experiment};

/// Persistent record of one experiment: its metadata, generated tasks and
/// duel results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// The stored experiment, if any.
    async fn load_experiment(&self) -> DomainResult<Option<Experiment>>;

    /// Store the experiment record. Fails with `ExperimentAlreadyExists`
    /// when one is already present.
    async fn save_experiment(&self, experiment: &Experiment) -> DomainResult<()>;

    /// Flag the experiment as fully planned; resumes skip planning afterwards.
    async fn mark_initialized(&self) -> DomainResult<()>;

    /// Drop the experiment record, its tasks and its results.
    async fn reset(&self) -> DomainResult<()>;

    /// Persist one generated task.
    async fn save_task(&self, task: &CompetitionTask) -> DomainResult<()>;

    /// All tasks ordered by index.
    async fn list_tasks(&self) -> DomainResult<Vec<CompetitionTask>>;

    /// Insert a result; returns false when a result for the same duel key
    /// already exists (the stored one is kept).
    async fn save_duel_result(&self, result: &DuelResult) -> DomainResult<bool>;

    /// Whether a result for `key` is already stored.
    async fn has_result(&self, key: &DuelKey) -> DomainResult<bool>;

    /// Every stored result.
    async fn list_results(&self) -> DomainResult<Vec<DuelResult>>;

    /// Number of stored results.
    async fn count_results(&self) -> DomainResult<u64>;
}
