mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use duel_arena::domain::models::{PlanConfig, SchedulerConfig};
use duel_arena::domain::ports::{ChatError, DuelQueue, ResultStore};
use duel_arena::services::{DuelScheduler, ExperimentBuilder};

use common::{fast_retry, open_db, scripted_registry, stores, temp_db_path, well_behaved, worker_ids, Script};

async fn scheduler(pool: &sqlx::SqlitePool, script: Script, workers: &[&str], rounds: usize) -> DuelScheduler {
    let (queue, store) = stores(pool);
    ExperimentBuilder::new(
        worker_ids(workers),
        "creative_writing",
        Arc::new(scripted_registry(script)),
        queue,
        store,
    )
    .with_plan(PlanConfig { rounds: Some(rounds), ..PlanConfig::default() })
    .with_retry(fast_retry())
    .with_scheduler_config(SchedulerConfig { max_recovery_passes: 1, ..SchedulerConfig::default() })
    .with_seed(11)
    .create()
    .await
    .unwrap()
}

#[tokio::test]
async fn test_full_run_scores_every_duel() {
    common::setup_test_logging();
    let (_dir, path) = temp_db_path();
    let pool = open_db(&path).await;
    let scheduler = scheduler(&pool, Arc::new(well_behaved), &["a", "b", "c"], 2).await;

    let scores = scheduler.run(3).await.unwrap();

    let (queue, store) = stores(&pool);
    assert_eq!(scores.total_count(), 12);
    assert_eq!(store.count_results().await.unwrap(), 12);
    assert_eq!(queue.status_counts().await.unwrap().total(), 0);
    assert!(scores.approx_eq(&scheduler.live_scores().await, 1e-9));

    for master in 0..3 {
        for student in 0..3 {
            let expected = u32::from(master != student) * 2;
            assert_eq!(scores.count(master, student), expected);
        }
    }
    let students = scores.student_averages();
    let a = students[0].as_ref().unwrap();
    assert!((a["creativity"] - 0.8).abs() < 1e-9);
    assert!((a["flow"] - 0.4).abs() < 1e-9);
}

#[tokio::test]
async fn test_rate_limited_calls_are_retried() {
    let (_dir, path) = temp_db_path();
    let pool = open_db(&path).await;
    let throttled = Arc::new(AtomicUsize::new(0));
    let seen = throttled.clone();
    let script: Script = Arc::new(move |id: &str, prompt: &str, call: usize| {
        if prompt.contains("Topic:") && seen.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(ChatError::Http { status: 429, body: "rate_limit_error".to_string() });
        }
        well_behaved(id, prompt, call)
    });
    let scheduler = scheduler(&pool, script, &["a", "b"], 1).await;

    let scores = scheduler.run(1).await.unwrap();

    assert_eq!(scores.total_count(), 2);
    assert_eq!(throttled.load(Ordering::SeqCst), 3);
    let (queue, _) = stores(&pool);
    assert_eq!(queue.status_counts().await.unwrap().failed, 0);
}

#[tokio::test]
async fn test_fatal_errors_fail_only_their_duels() {
    let (_dir, path) = temp_db_path();
    let pool = open_db(&path).await;
    let script: Script = Arc::new(|id: &str, prompt: &str, call: usize| {
        if id == "mock:c" && prompt.contains("Topic:") {
            return Err(ChatError::Http { status: 400, body: "context length exceeded".to_string() });
        }
        well_behaved(id, prompt, call)
    });
    let scheduler = scheduler(&pool, script, &["a", "b", "c"], 1).await;

    let scores = scheduler.run(2).await.unwrap();

    assert_eq!(scores.total_count(), 4);
    assert_eq!(scores.count(0, 2), 0);
    assert_eq!(scores.count(1, 2), 0);
    assert_eq!(scores.count(2, 0), 1);
    assert!(scores.student_averages()[2].is_none());

    let (queue, store) = stores(&pool);
    assert_eq!(queue.status_counts().await.unwrap().failed, 2);
    assert_eq!(store.count_results().await.unwrap(), 4);
}

#[tokio::test]
async fn test_unparseable_grades_are_failed() {
    let (_dir, path) = temp_db_path();
    let pool = open_db(&path).await;
    let script: Script = Arc::new(|id: &str, prompt: &str, call: usize| {
        if id == "mock:b" && prompt.contains("Work to evaluate") {
            return Ok(r#"{"creativity": "high"}"#.to_string());
        }
        well_behaved(id, prompt, call)
    });
    let scheduler = scheduler(&pool, script, &["a", "b"], 1).await;

    let scores = scheduler.run(2).await.unwrap();

    assert_eq!(scores.count(0, 1), 1);
    assert_eq!(scores.count(1, 0), 0);
    let (queue, _) = stores(&pool);
    assert_eq!(queue.status_counts().await.unwrap().failed, 1);
}

#[tokio::test]
async fn test_interrupted_run_resumes_to_the_same_totals() {
    let (_dir, path) = temp_db_path();

    let pool = open_db(&path).await;
    let first = scheduler(&pool, Arc::new(well_behaved), &["a", "b", "c"], 1).await;
    let total_duels = first.experiment().total_duels;
    let (queue, _) = stores(&pool);
    // A worker picked a duel up and the process died before finishing it.
    let orphan = queue.get().await.unwrap().unwrap();
    pool.close().await;

    let pool = open_db(&path).await;
    let resumed = scheduler(&pool, Arc::new(well_behaved), &[], 1).await;
    let scores = resumed.run(2).await.unwrap();

    let (queue, store) = stores(&pool);
    assert_eq!(scores.total_count() as usize, total_duels);
    assert_eq!(store.count_results().await.unwrap() as usize, total_duels);
    assert!(store.has_result(&orphan.key()).await.unwrap());
    assert_eq!(queue.status_counts().await.unwrap().total(), 0);
}

#[tokio::test]
async fn test_second_run_on_finished_experiment_only_rebuilds() {
    let (_dir, path) = temp_db_path();
    let pool = open_db(&path).await;
    let scheduler = scheduler(&pool, Arc::new(well_behaved), &["a", "b"], 2).await;
    let first = scheduler.run(2).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let counting: Script = Arc::new(move |id: &str, prompt: &str, call: usize| {
        counter.fetch_add(1, Ordering::SeqCst);
        well_behaved(id, prompt, call)
    });
    let again = self::scheduler(&pool, counting, &["a", "b"], 2).await;
    let second = again.run(2).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(first.approx_eq(&second, 1e-9));
    assert_eq!(again.live_scores().await.total_count(), 0);
}
