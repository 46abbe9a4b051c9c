use kestrel_core::models::ResourceRecord;
use kestrel_core::traits::RecordStore;
use kestrel_db::ResourceRepository;
use serde_json::json;

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn upsert_then_exists() {
    let (pool, _container) = setup_test_db().await;
    let repo = ResourceRepository::new(pool);

    assert!(!repo.exists(105).await.unwrap());

    let record = ResourceRecord::from_payload(105, json!({"id": 105, "finished": null}));
    repo.upsert(&record).await.unwrap();

    assert!(repo.exists(105).await.unwrap());
    let stored = repo.get(105).await.unwrap().unwrap();
    assert_eq!(stored.record, record);
}

#[tokio::test]
async fn upsert_is_idempotent_and_updates_payload() {
    let (pool, _container) = setup_test_db().await;
    let repo = ResourceRepository::new(pool);

    repo.upsert(&ResourceRecord::from_payload(7, json!({"id": 7})))
        .await
        .unwrap();
    repo.upsert(&ResourceRecord::from_payload(7, json!({"id": 7})))
        .await
        .unwrap();
    repo.upsert(&ResourceRecord::from_payload(
        7,
        json!({"id": 7, "finished": "2024-05-01T00:00:00Z"}),
    ))
    .await
    .unwrap();

    let stored = repo.get(7).await.unwrap().unwrap();
    assert!(stored.record.finished);
    assert!(stored.fetched_at >= stored.first_seen_at);
    assert_eq!(repo.counts().await.unwrap(), (1, 0));
}

#[tokio::test]
async fn unfinished_ids_skip_finished_and_respect_limit() {
    let (pool, _container) = setup_test_db().await;
    let repo = ResourceRepository::new(pool);

    for id in 1..=4 {
        repo.upsert(&ResourceRecord::from_payload(id, json!({"id": id})))
            .await
            .unwrap();
    }
    repo.upsert(&ResourceRecord::from_payload(
        5,
        json!({"id": 5, "finished": "2024-05-01T00:00:00Z"}),
    ))
    .await
    .unwrap();

    let mut ids = repo.unfinished_ids(10).await.unwrap();
    ids.sort();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(repo.unfinished_ids(2).await.unwrap().len(), 2);
    assert_eq!(repo.counts().await.unwrap(), (5, 4));
}
