use chrono::{TimeDelta, Utc};
use kestrel_core::job::{EnqueueRequest, JobStatus, RESCAN_PRIORITY, RetentionPolicy};
use kestrel_core::job_queue::JobQueue;
use kestrel_db::FetchJobRepository;

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn enqueue_and_verify_fields() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchJobRepository::new(pool);

    let job = repo.enqueue(EnqueueRequest::new(105)).await.unwrap();

    assert_eq!(job.resource_id, 105);
    assert_eq!(job.priority, 1);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_attempts, 10);
    assert!(job.worker_id.is_none());
    assert!(job.started_at.is_none());
}

#[tokio::test]
async fn duplicate_enqueue_creates_two_jobs() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchJobRepository::new(pool);

    let first = repo.enqueue(EnqueueRequest::new(7)).await.unwrap();
    let second = repo.enqueue(EnqueueRequest::new(7)).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(repo.count_by_status(JobStatus::Pending).await.unwrap(), 2);
}

#[tokio::test]
async fn enqueue_bulk_inserts_all() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchJobRepository::new(pool);

    let requests: Vec<_> = [105, 103, 101].into_iter().map(EnqueueRequest::new).collect();
    let inserted = repo.enqueue_bulk(&requests).await.unwrap();

    assert_eq!(inserted, 3);
    let mut ids: Vec<_> = repo
        .list_jobs(Some(JobStatus::Pending), 10)
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.resource_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec![101, 103, 105]);

    assert_eq!(repo.enqueue_bulk(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn claim_job_sets_running_and_worker() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchJobRepository::new(pool);

    repo.enqueue(EnqueueRequest::new(1)).await.unwrap();

    let claimed = repo
        .claim_job("worker-1")
        .await
        .unwrap()
        .expect("Should claim the job");

    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.worker_id.as_deref(), Some("worker-1"));
    assert!(claimed.started_at.is_some());
}

#[tokio::test]
async fn claim_job_returns_none_when_empty() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchJobRepository::new(pool);

    assert!(repo.claim_job("worker-1").await.unwrap().is_none());
}

#[tokio::test]
async fn claim_job_skips_running_jobs() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchJobRepository::new(pool);

    repo.enqueue(EnqueueRequest::new(1)).await.unwrap();

    assert!(repo.claim_job("worker-1").await.unwrap().is_some());
    assert!(repo.claim_job("worker-2").await.unwrap().is_none());
}

#[tokio::test]
async fn claim_order_is_priority_first() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchJobRepository::new(pool);

    repo.enqueue(EnqueueRequest::new(1).with_priority(RESCAN_PRIORITY))
        .await
        .unwrap();
    repo.enqueue(EnqueueRequest::new(2)).await.unwrap();
    repo.enqueue(EnqueueRequest::new(3)).await.unwrap();

    let order: Vec<i64> = {
        let mut order = Vec::new();
        while let Some(job) = repo.claim_job("w").await.unwrap() {
            order.push(job.resource_id);
        }
        order
    };

    assert_eq!(order, vec![2, 3, 1]);
}

#[tokio::test]
async fn concurrent_claims_never_share_a_job() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchJobRepository::new(pool);

    let requests: Vec<_> = (1..=20).map(EnqueueRequest::new).collect();
    repo.enqueue_bulk(&requests).await.unwrap();

    let mut handles = Vec::new();
    for w in 0..4 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(job) = repo.claim_job(&format!("worker-{w}")).await.unwrap() {
                claimed.push(job.id);
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    let total = all.len();
    all.sort();
    all.dedup();
    assert_eq!(total, 20);
    assert_eq!(all.len(), 20);
}

#[tokio::test]
async fn complete_job_sets_completed() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchJobRepository::new(pool);

    let job = repo.enqueue(EnqueueRequest::new(1)).await.unwrap();
    repo.claim_job("w").await.unwrap();
    repo.complete_job(job.id).await.unwrap();

    let done = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.completed_at.is_some());
    assert!(done.worker_id.is_none());
}

#[tokio::test]
async fn fail_job_with_retry_returns_to_pending() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchJobRepository::new(pool);

    let job = repo.enqueue(EnqueueRequest::new(1)).await.unwrap();
    repo.claim_job("w").await.unwrap();

    let retry_at = Utc::now() + TimeDelta::minutes(5);
    repo.fail_job(job.id, "Upstream is offline", Some(retry_at))
        .await
        .unwrap();

    let failed = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Pending);
    assert_eq!(failed.attempts, 1);
    assert!(failed.next_retry_at.is_some());
    assert_eq!(failed.error_message.as_deref(), Some("Upstream is offline"));

    // Not due yet.
    assert!(repo.claim_job("w").await.unwrap().is_none());
}

#[tokio::test]
async fn fail_job_without_retry_is_terminal() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchJobRepository::new(pool);

    let job = repo.enqueue(EnqueueRequest::new(1)).await.unwrap();
    repo.claim_job("w").await.unwrap();
    repo.fail_job(job.id, "gave up", None).await.unwrap();

    let failed = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.completed_at.is_some());
    assert_eq!(repo.count_by_status(JobStatus::Failed).await.unwrap(), 1);
}

#[tokio::test]
async fn release_worker_jobs_resets_running() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchJobRepository::new(pool);

    repo.enqueue(EnqueueRequest::new(1)).await.unwrap();
    repo.enqueue(EnqueueRequest::new(2)).await.unwrap();
    repo.claim_job("worker-1").await.unwrap();
    repo.claim_job("worker-2").await.unwrap();

    let released = repo.release_worker_jobs("worker-1").await.unwrap();

    assert_eq!(released, 1);
    assert_eq!(repo.count_by_status(JobStatus::Pending).await.unwrap(), 1);
    assert_eq!(repo.count_by_status(JobStatus::Running).await.unwrap(), 1);
}

#[tokio::test]
async fn prune_keeps_newest_terminal_jobs() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchJobRepository::new(pool);

    for id in 0..5 {
        let job = repo.enqueue(EnqueueRequest::new(id)).await.unwrap();
        repo.claim_job("w").await.unwrap();
        repo.complete_job(job.id).await.unwrap();
    }
    for id in 10..13 {
        let job = repo.enqueue(EnqueueRequest::new(id)).await.unwrap();
        repo.claim_job("w").await.unwrap();
        repo.fail_job(job.id, "boom", None).await.unwrap();
    }
    repo.enqueue(EnqueueRequest::new(99)).await.unwrap();

    let deleted = repo
        .prune(&RetentionPolicy {
            keep_completed: 2,
            keep_failed: 1,
        })
        .await
        .unwrap();

    assert_eq!(deleted, 5);
    assert_eq!(repo.count_by_status(JobStatus::Completed).await.unwrap(), 2);
    assert_eq!(repo.count_by_status(JobStatus::Failed).await.unwrap(), 1);
    assert_eq!(repo.count_by_status(JobStatus::Pending).await.unwrap(), 1);
}
