//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use duel_arena::adapters::sqlite::{initialize_database, SqliteDuelQueue, SqliteResultStore};
use duel_arena::adapters::substrates::{MockChatModel, ModelRegistry};
use duel_arena::domain::models::RetryConfig;
use duel_arena::domain::ports::{ChatError, ChatModel};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Grade accepted by the `creative_writing` evaluation prompt.
pub const GRADE: &str = r#"{"creativity": 0.8, "depth": 0.6, "flow": 0.4}"#;

/// Responder deciding what a scripted worker says to a prompt.
pub type Script = Arc<dyn Fn(&str, &str, usize) -> Result<String, ChatError> + Send + Sync>;

/// Database file inside a fresh temp directory.
pub fn temp_db_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("experiment.db");
    (dir, db_path)
}

pub fn db_url(path: &std::path::Path) -> String {
    format!("sqlite:{}", path.display())
}

/// Open (or reopen) a migrated experiment database on disk.
pub async fn open_db(path: &std::path::Path) -> SqlitePool {
    initialize_database(&db_url(path), None)
        .await
        .expect("Failed to open experiment database")
}

pub fn stores(pool: &SqlitePool) -> (Arc<SqliteDuelQueue>, Arc<SqliteResultStore>) {
    (
        Arc::new(SqliteDuelQueue::new(pool.clone())),
        Arc::new(SqliteResultStore::new(pool.clone())),
    )
}

/// Retry policy with millisecond backoff so tests stay fast.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 4,
    }
}

/// Default behaviour of a well-behaved worker for the creative writing
/// competition: writes a topic, answers with a poem, grades with [`GRADE`].
pub fn well_behaved(worker_id: &str, prompt: &str, _call: usize) -> Result<String, ChatError> {
    if prompt.contains("Work to evaluate") {
        Ok(GRADE.to_string())
    } else if prompt.contains("Topic:") {
        Ok(format!("A poem by {worker_id}"))
    } else {
        Ok(format!("a lighthouse imagined by {worker_id}"))
    }
}

/// Registry whose `mock` provider builds scripted workers.
pub fn scripted_registry(script: Script) -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.register("mock", move |worker_id, _model| {
        let script = script.clone();
        let id = worker_id.to_string();
        Ok(Arc::new(MockChatModel::new(worker_id, move |prompt, call| script(&id, prompt, call))) as Arc<dyn ChatModel>)
    });
    registry
}

pub fn worker_ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| format!("mock:{n}")).collect()
}

pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
