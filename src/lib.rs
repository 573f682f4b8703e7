//! Resumable round-robin duels between language models.
//!
//! Every worker answers tasks as a student and grades the others as a
//! master. Duels live in a durable SQLite queue so an interrupted run picks
//! up where it stopped; results aggregate into per-pair score matrices.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    CompetitionTemplate, Config, DuelRequest, DuelResult, Experiment, MetricScores, ScoreMatrix,
};
pub use domain::ports::{ChatError, ChatModel, DuelQueue, ModelFactory, ResultStore};
pub use services::{DuelScheduler, ExperimentBuilder, RetryPolicy, ScoreReport};
