mod common;

use duel_arena::domain::models::DuelRequest;
use duel_arena::domain::ports::DuelQueue;

use common::{open_db, stores, temp_db_path};

fn request(master: &str, student: &str, round: usize) -> DuelRequest {
    DuelRequest {
        master_id: master.to_string(),
        student_id: student.to_string(),
        template_id: "creative_writing".to_string(),
        task: "a lighthouse".to_string(),
        task_index: 0,
        round,
        message_id: None,
    }
}

#[tokio::test]
async fn test_locked_items_survive_a_crash() {
    let (_dir, path) = temp_db_path();

    let pool = open_db(&path).await;
    let (queue, _) = stores(&pool);
    queue
        .add_all(&[request("mock:a", "mock:b", 0), request("mock:b", "mock:a", 0), request("mock:a", "mock:b", 1)])
        .await
        .unwrap();

    let first = queue.get().await.unwrap().unwrap();
    let second = queue.get().await.unwrap().unwrap();
    queue.mark_done(first.message_id.unwrap()).await.unwrap();
    assert_eq!(second.key(), request("mock:b", "mock:a", 0).key());

    // Process dies with `second` still locked.
    pool.close().await;

    let pool = open_db(&path).await;
    let (queue, _) = stores(&pool);
    let counts = queue.status_counts().await.unwrap();
    assert_eq!((counts.pending, counts.locked, counts.done), (1, 1, 1));

    assert!(queue.retry_locked().await.unwrap());
    assert_eq!(queue.pending_count().await.unwrap(), 2);

    let recovered = queue.get().await.unwrap().unwrap();
    assert_eq!(recovered.key(), second.key());
    assert_ne!(recovered.message_id, second.message_id);

    let last = queue.get().await.unwrap().unwrap();
    assert_eq!(last.key(), request("mock:a", "mock:b", 1).key());
    assert!(queue.get().await.unwrap().is_none());
}

#[tokio::test]
async fn test_stale_message_id_cannot_complete_recovered_item() {
    let (_dir, path) = temp_db_path();
    let pool = open_db(&path).await;
    let (queue, _) = stores(&pool);
    queue.add(&request("mock:a", "mock:b", 0)).await.unwrap();

    let stale = queue.get().await.unwrap().unwrap();
    assert!(queue.retry_locked().await.unwrap());

    assert!(queue.mark_done(stale.message_id.unwrap()).await.is_err());
    assert_eq!(queue.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_items_return_after_restart() {
    let (_dir, path) = temp_db_path();

    let pool = open_db(&path).await;
    let (queue, _) = stores(&pool);
    queue.add(&request("mock:a", "mock:b", 0)).await.unwrap();
    let item = queue.get().await.unwrap().unwrap();
    queue.mark_failed(item.message_id.unwrap()).await.unwrap();
    pool.close().await;

    let pool = open_db(&path).await;
    let (queue, _) = stores(&pool);
    assert_eq!(queue.status_counts().await.unwrap().failed, 1);
    assert!(queue.retry_failed().await.unwrap());
    assert!(!queue.retry_failed().await.unwrap());
    assert_eq!(queue.get().await.unwrap().unwrap().key(), item.key());
}
