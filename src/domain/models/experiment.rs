//! Experiment metadata and generated tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single experiment stored in an arena database.
///
/// Once `initialized` is set the plan (workers, template, duel count) is
/// frozen for that database file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    /// When the experiment was first planned
    pub created_at: DateTime<Utc>,
    /// Set once every planned duel is enqueued; the plan is frozen after that.
    pub initialized: bool,
    /// Competition id
    pub template_id: String,
    /// Order defines the score matrix indices.
    pub worker_ids: Vec<String>,
    /// Planned rounds
    pub rounds: usize,
    /// Ordered pairs dueling each round
    pub pairs_per_round: usize,
    /// Size of the task pool
    pub task_count: usize,
    /// `rounds * pairs_per_round`.
    pub total_duels: usize,
}

impl Experiment {
    /// A not-yet-initialized experiment.
    pub fn new(
        template_id: impl Into<String>,
        worker_ids: Vec<String>,
        rounds: usize,
        pairs_per_round: usize,
        task_count: usize,
    ) -> Self {
        Self {
            created_at: Utc::now(),
            initialized: false,
            template_id: template_id.into(),
            worker_ids,
            rounds,
            pairs_per_round,
            task_count,
            total_duels: rounds * pairs_per_round,
        }
    }

    /// Index of a worker in the score matrix.
    pub fn worker_index(&self, worker_id: &str) -> Option<usize> {
        self.worker_ids.iter().position(|id| id == worker_id)
    }
}

/// A generated task, authored by one of the workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitionTask {
    /// Position in the pool
    pub task_index: usize,
    /// Task text given to students
    pub description: String,
    /// Worker that generated the task.
    pub created_by: String,
    /// Generation time
    pub created_at: DateTime<Utc>,
}

impl CompetitionTask {
    /// Task stamped with the current time.
    pub fn new(task_index: usize, description: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            task_index,
            description: description.into(),
            created_by: created_by.into(),
            created_at: Utc::now(),
        }
    }
}
