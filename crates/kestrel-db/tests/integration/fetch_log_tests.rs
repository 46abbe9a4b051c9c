use kestrel_core::models::{FetchOutcome, NewFetchLogEntry};
use kestrel_core::traits::FetchLogStore;
use kestrel_db::FetchLogRepository;

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn record_and_read_back() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchLogRepository::new(pool);

    repo.record(&NewFetchLogEntry {
        url: "https://esi.example.com/wars/".into(),
        outcome: FetchOutcome::Ok,
        items_observed: 3,
        items_new: 2,
        error_message: None,
    })
    .await
    .unwrap();
    repo.record(&NewFetchLogEntry {
        url: "https://esi.example.com/wars/?max_war_id=103".into(),
        outcome: FetchOutcome::Error,
        items_observed: 0,
        items_new: 0,
        error_message: Some("Upstream is offline".into()),
    })
    .await
    .unwrap();

    let entries = repo.recent(10).await.unwrap();
    assert_eq!(entries.len(), 2);

    let ok = entries
        .iter()
        .find(|e| e.outcome == FetchOutcome::Ok)
        .unwrap();
    assert_eq!(ok.items_observed, 3);
    assert_eq!(ok.items_new, 2);

    let err = entries
        .iter()
        .find(|e| e.outcome == FetchOutcome::Error)
        .unwrap();
    assert_eq!(err.error_message.as_deref(), Some("Upstream is offline"));
}
