//! Live query behavior: initial snapshot, refresh on mutation, release.

use chrono::Utc;
use nscan::{DeviceRecord, DeviceStore, LiveQueryService, SessionRecord};

#[tokio::test]
async fn devices_subscription_delivers_initial_then_refreshed_snapshots() {
    let store = DeviceStore::open_in_memory().await;
    let live = LiveQueryService::new(store.clone());
    let mut query = live.subscribe_devices();

    // First snapshot arrives without any mutation
    let initial = query.next().await.unwrap();
    assert!(initial.is_empty());

    let device = DeviceRecord::bluetooth("periph-1", Some("Speaker".into()), Some(-40), None, Utc::now());
    store.put_device(&device).await.unwrap();

    let refreshed = query.next().await.unwrap();
    assert_eq!(refreshed.len(), 1);
    assert_eq!(refreshed[0].id, device.id);
}

#[tokio::test]
async fn sessions_subscription_tracks_lifecycle_mutations() {
    let store = DeviceStore::open_in_memory().await;
    let live = LiveQueryService::new(store.clone());
    let mut query = live.subscribe_sessions();

    assert!(query.next().await.unwrap().is_empty());

    let session = SessionRecord::started(Utc::now());
    store.create_session(&session).await.unwrap();
    let snapshot = query.next().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].session.is_active());

    store.finish_session(&session.id, Utc::now()).await.unwrap();
    let snapshot = query.next().await.unwrap();
    assert!(!snapshot[0].session.is_active());
}

#[tokio::test]
async fn closing_a_subscription_ends_the_stream() {
    let store = DeviceStore::open_in_memory().await;
    let live = LiveQueryService::new(store.clone());
    let mut query = live.subscribe_devices();

    assert!(query.next().await.is_some());
    query.close();
    // Any buffered snapshot drains, then the stream ends
    while query.next().await.is_some() {}

    // Later mutations must not panic or wake the closed subscription
    let device = DeviceRecord::lan("10.0.0.5", None, None, Utc::now());
    store.put_device(&device).await.unwrap();
    assert!(query.next().await.is_none());
}

#[tokio::test]
async fn independent_subscriptions_see_the_same_store() {
    let store = DeviceStore::open_in_memory().await;
    let live = LiveQueryService::new(store.clone());
    let mut a = live.subscribe_devices();
    let mut b = live.subscribe_devices();

    assert!(a.next().await.unwrap().is_empty());
    assert!(b.next().await.unwrap().is_empty());

    let device = DeviceRecord::lan("10.0.0.8", Some("aa:bb:cc:dd:ee:ff".into()), None, Utc::now());
    store.put_device(&device).await.unwrap();

    assert_eq!(a.next().await.unwrap().len(), 1);
    assert_eq!(b.next().await.unwrap().len(), 1);
}
