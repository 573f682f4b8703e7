mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use duel_arena::domain::models::PlanConfig;
use duel_arena::domain::ports::{DuelQueue, ResultStore};
use duel_arena::services::ExperimentBuilder;
use duel_arena::DomainError;

use common::{fast_retry, open_db, scripted_registry, stores, temp_db_path, well_behaved, worker_ids, Script};

fn builder(pool: &sqlx::SqlitePool, script: Script, workers: &[&str]) -> ExperimentBuilder {
    let (queue, store) = stores(pool);
    ExperimentBuilder::new(
        worker_ids(workers),
        "creative_writing",
        Arc::new(scripted_registry(script)),
        queue,
        store,
    )
    .with_retry(fast_retry())
    .with_seed(7)
}

#[tokio::test]
async fn test_default_plan_schedules_every_ordered_pair_each_round() {
    let (_dir, path) = temp_db_path();
    let pool = open_db(&path).await;

    let scheduler = builder(&pool, Arc::new(well_behaved), &["a", "b", "c"]).create().await.unwrap();

    let experiment = scheduler.experiment();
    assert!(experiment.initialized);
    assert_eq!(experiment.rounds, 3);
    assert_eq!(experiment.task_count, 3);
    assert_eq!(experiment.total_duels, 18);

    let (queue, store) = stores(&pool);
    assert_eq!(queue.pending_count().await.unwrap(), 18);

    let tasks = store.list_tasks().await.unwrap();
    let authors: Vec<&str> = tasks.iter().map(|t| t.created_by.as_str()).collect();
    assert_eq!(authors, ["mock:a", "mock:b", "mock:c"]);
}

#[tokio::test]
async fn test_restart_resumes_without_replanning() {
    let (_dir, path) = temp_db_path();
    let generated = Arc::new(AtomicUsize::new(0));
    let counter = generated.clone();
    let script: Script = Arc::new(move |id: &str, prompt: &str, call: usize| {
        if prompt.starts_with("Find an idea") {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        well_behaved(id, prompt, call)
    });

    let pool = open_db(&path).await;
    let plan = PlanConfig { rounds: Some(1), tasks: Some(2), ..PlanConfig::default() };
    builder(&pool, script.clone(), &["a", "b"]).with_plan(plan).create().await.unwrap();
    pool.close().await;
    assert_eq!(generated.load(Ordering::SeqCst), 2);

    let pool = open_db(&path).await;
    let scheduler = builder(&pool, script, &[]).create().await.unwrap();

    assert_eq!(scheduler.experiment().worker_ids, worker_ids(&["a", "b"]));
    assert_eq!(scheduler.experiment().rounds, 1);
    assert_eq!(generated.load(Ordering::SeqCst), 2);
    let (queue, _) = stores(&pool);
    assert_eq!(queue.pending_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_resume_with_other_template_is_refused() {
    let (_dir, path) = temp_db_path();
    let pool = open_db(&path).await;
    builder(&pool, Arc::new(well_behaved), &["a", "b"]).create().await.unwrap();

    let (queue, store) = stores(&pool);
    let result = ExperimentBuilder::new(
        worker_ids(&["a", "b"]),
        "debate_persuasion",
        Arc::new(scripted_registry(Arc::new(well_behaved))),
        queue,
        store,
    )
    .create()
    .await;

    assert!(matches!(result, Err(DomainError::Configuration(msg)) if msg.contains("creative_writing")));
}

#[tokio::test]
async fn test_failed_task_generation_leaves_nothing_to_resume() {
    let (_dir, path) = temp_db_path();
    let pool = open_db(&path).await;

    let broken: Script = Arc::new(|_: &str, _: &str, _: usize| -> Result<String, duel_arena::ChatError> {
        Err(duel_arena::ChatError::Http { status: 400, body: "bad request".to_string() })
    });
    let result = builder(&pool, broken, &["a", "b"]).create().await;
    assert!(matches!(result, Err(DomainError::Invocation { .. })));

    let (queue, store) = stores(&pool);
    assert_eq!(queue.status_counts().await.unwrap().total(), 0);
    assert!(!store.load_experiment().await.unwrap().unwrap().initialized);

    let scheduler = builder(&pool, Arc::new(well_behaved), &["a", "b"]).create().await.unwrap();
    assert!(scheduler.experiment().initialized);
    assert_eq!(queue.pending_count().await.unwrap(), 4);
}
