//! Application services: experiment setup, duel scheduling, retries and
//! reporting.

pub mod duel_scheduler;
pub mod experiment_builder;
pub mod report;
pub mod retry;

pub use duel_scheduler::{DuelOutcome, DuelScheduler};
pub use experiment_builder::ExperimentBuilder;
pub use report::{format_scores, ScoreReport};
pub use retry::{classify, CallOutcome, ErrorClass, RetryPolicy};
