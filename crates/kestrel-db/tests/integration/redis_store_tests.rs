use std::time::Duration;

use kestrel_core::circuit_gate::{CircuitGate, GateConfig, GateState};
use kestrel_core::rate_limiter::{Admission, RateLimiter, RateLimiterConfig};
use kestrel_core::shared_store::SharedStore;

use crate::integration::common::setup_test_redis;

#[tokio::test]
async fn incr_sets_expiry_on_first_increment() {
    let (store, _container) = setup_test_redis().await;

    assert_eq!(
        store
            .incr_with_expiry("t:window", Duration::from_millis(300))
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        store
            .incr_with_expiry("t:window", Duration::from_secs(60))
            .await
            .unwrap(),
        2
    );

    // The second call must not have extended the first TTL.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.get("t:window").await.unwrap(), None);
}

#[tokio::test]
async fn set_get_delete() {
    let (store, _container) = setup_test_redis().await;

    store.set("t:flag", "1", None).await.unwrap();
    assert_eq!(store.get("t:flag").await.unwrap().as_deref(), Some("1"));

    store.set("t:flag", "2", None).await.unwrap();
    assert_eq!(store.get("t:flag").await.unwrap().as_deref(), Some("2"));

    store.delete("t:flag").await.unwrap();
    assert_eq!(store.get("t:flag").await.unwrap(), None);
}

#[tokio::test]
async fn set_with_ttl_expires() {
    let (store, _container) = setup_test_redis().await;

    store
        .set("t:pause", "123", Some(Duration::from_millis(200)))
        .await
        .unwrap();
    assert!(store.get("t:pause").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.get("t:pause").await.unwrap(), None);
}

#[tokio::test]
async fn limiter_shares_window_across_clones() {
    let (store, _container) = setup_test_redis().await;
    let a = RateLimiter::new(store.clone(), "fleet", RateLimiterConfig::new(3));
    let b = RateLimiter::new(store, "fleet", RateLimiterConfig::new(3));

    let mut immediate = 0;
    for limiter in [&a, &b, &a] {
        if limiter.acquire().await.unwrap() == Admission::Immediate {
            immediate += 1;
        }
    }
    assert_eq!(immediate, 3);

    // Fourth request in the same window has to wait.
    assert!(matches!(b.acquire().await.unwrap(), Admission::Delayed(_)));
}

#[tokio::test]
async fn pause_is_visible_to_other_workers() {
    let (store, _container) = setup_test_redis().await;
    let first = CircuitGate::new(store.clone(), "fleet", GateConfig::default());
    let second = CircuitGate::new(store, "fleet", GateConfig::default());

    first.pause(Duration::from_secs(60)).await.unwrap();

    match second.state().await.unwrap() {
        GateState::Paused { remaining } => assert!(remaining > Duration::from_secs(55)),
        other => panic!("expected paused, got {other}"),
    }

    second.set_offline(true).await.unwrap();
    assert!(first.is_offline().await.unwrap());
}
