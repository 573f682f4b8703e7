//! Domain models.

pub mod competition;
pub mod config;
pub mod duel;
pub mod experiment;
pub mod score;

pub use competition::{CompetitionTemplate, MetricSet, PromptTemplate, PromptVars};
pub use config::{
    Config, DatabaseConfig, LoggingConfig, PlanConfig, ProviderConfig, ProvidersConfig,
    ReportConfig, RetryConfig, SchedulerConfig, TaskAssignment,
};
pub use duel::{DuelKey, DuelRequest, DuelResult, QueueCounts, QueueStatus};
pub use experiment::{CompetitionTask, Experiment};
pub use score::{parse_scores, MetricScores, ScoreMatrix, ScoreParseError};
