//! Duel requests (queue payloads) and duel results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::score::MetricScores;

/// Lifecycle of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Waiting for a consumer.
    Pending,
    /// Claimed by a consumer; orphaned if that process dies.
    Locked,
    /// Finished; removed by `prune`.
    Done,
    /// Gave up; `retry_failed` puts it back.
    Failed,
}

impl QueueStatus {
    /// Value stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Locked => "locked",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parse a `status` column value.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "locked" => Some(Self::Locked),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Number of queue items per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    /// Items waiting for a consumer
    pub pending: u64,
    /// Items claimed by a consumer
    pub locked: u64,
    /// Finished items not pruned yet
    pub done: u64,
    /// Items that gave up
    pub failed: u64,
}

impl QueueCounts {
    /// Items in any state.
    pub fn total(&self) -> u64 {
        self.pending + self.locked + self.done + self.failed
    }
}

/// Identity of a duel within an experiment: one per ordered pair per round.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DuelKey {
    /// Grader
    pub master_id: String,
    /// Answerer
    pub student_id: String,
    /// Zero-based round
    pub round: usize,
}

/// A scheduled duel. `message_id` is assigned by the queue on dequeue and is
/// never part of the stored payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuelRequest {
    /// Grader
    pub master_id: String,
    /// Answerer
    pub student_id: String,
    /// Competition the duel belongs to
    pub template_id: String,
    /// Task text, copied so the payload is self-contained.
    pub task: String,
    /// Index into the task pool
    pub task_index: usize,
    /// Zero-based round
    pub round: usize,
    /// Assigned by the queue on `get`; never persisted in the payload.
    #[serde(skip)]
    pub message_id: Option<Uuid>,
}

impl DuelRequest {
    /// Identity used for duplicate detection.
    pub fn key(&self) -> DuelKey {
        DuelKey {
            master_id: self.master_id.clone(),
            student_id: self.student_id.clone(),
            round: self.round,
        }
    }
}

/// Outcome of a completed duel: the master's scores for the student's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuelResult {
    /// When the result was recorded
    pub created_at: DateTime<Utc>,
    /// Zero-based round
    pub round: usize,
    /// Index into the task pool
    pub task_index: usize,
    /// Grader
    pub master_id: String,
    /// Answerer
    pub student_id: String,
    /// Validated metric scores
    pub scores: MetricScores,
}

impl DuelResult {
    /// Result for `request`, timestamped now.
    pub fn new(request: &DuelRequest, scores: MetricScores) -> Self {
        Self {
            created_at: Utc::now(),
            round: request.round,
            task_index: request.task_index,
            master_id: request.master_id.clone(),
            student_id: request.student_id.clone(),
            scores,
        }
    }

    /// Identity used for duplicate detection.
    pub fn key(&self) -> DuelKey {
        DuelKey {
            master_id: self.master_id.clone(),
            student_id: self.student_id.clone(),
            round: self.round,
        }
    }
}
