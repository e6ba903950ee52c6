//! Integration tests for the device/session store.

use chrono::{Duration, Utc};
use nscan_db::{DbError, DeviceStore};
use nscan_protocol::{
    DeviceRecord, DeviceTypeFilter, SessionRecord, SortOrder, TimeWindow,
};

fn bt_device(radio_id: &str, rssi: i64) -> DeviceRecord {
    DeviceRecord::bluetooth(
        radio_id,
        Some(format!("device {radio_id}")),
        Some(rssi),
        Some("advertising".to_string()),
        Utc::now(),
    )
}

fn lan_device(ip: &str) -> DeviceRecord {
    DeviceRecord::lan(ip, Some("aa:bb:cc:dd:ee:ff".to_string()), Some("printer".to_string()), Utc::now())
}

#[tokio::test]
async fn device_round_trip_preserves_all_fields() {
    let store = DeviceStore::open_in_memory().await;
    assert!(store.init_error().is_none());

    let device = bt_device("periph-1", -61);
    store.put_device(&device).await.unwrap();

    let loaded = store.get_device(&device.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, device.id);
    assert_eq!(loaded.kind, device.kind);
    assert_eq!(loaded.name, device.name);
    assert_eq!(loaded.radio_id, device.radio_id);
    assert_eq!(loaded.rssi, device.rssi);
    assert_eq!(loaded.status, device.status);
    assert_eq!(loaded.ip_address, None);
    assert_eq!(loaded.mac_address, None);
    // Millisecond precision survives the integer encoding
    assert_eq!(
        loaded.discovered_at.timestamp_millis(),
        device.discovered_at.timestamp_millis()
    );
}

#[tokio::test]
async fn put_device_is_first_write_wins() {
    let store = DeviceStore::open_in_memory().await;

    let device = bt_device("periph-1", -40);
    store.put_device(&device).await.unwrap();

    let mut louder = device.clone();
    louder.rssi = Some(-20);
    louder.name = Some("renamed".to_string());
    store.put_device(&louder).await.unwrap();

    let loaded = store.get_device(&device.id).await.unwrap().unwrap();
    assert_eq!(loaded.rssi, Some(-40));
    assert_eq!(loaded.name, device.name);
}

#[tokio::test]
async fn at_most_one_active_session() {
    let store = DeviceStore::open_in_memory().await;

    let first = SessionRecord::started(Utc::now());
    store.create_session(&first).await.unwrap();

    let second = SessionRecord::started(Utc::now());
    let err = store.create_session(&second).await.unwrap_err();
    assert!(matches!(err, DbError::Constraint(_)), "got: {err}");

    // Once the first finishes, a new active session is allowed again.
    store.finish_session(&first.id, Utc::now()).await.unwrap();
    store.create_session(&second).await.unwrap();

    let active = store.active_session().await.unwrap().unwrap();
    assert_eq!(active.id, second.id);
}

#[tokio::test]
async fn finish_session_is_idempotent() {
    let store = DeviceStore::open_in_memory().await;

    let session = SessionRecord::started(Utc::now());
    store.create_session(&session).await.unwrap();
    store
        .append_members(&session.id, &[bt_device("a", -50)])
        .await
        .unwrap();

    let first_end = Utc::now();
    store.finish_session(&session.id, first_end).await.unwrap();
    store
        .finish_session(&session.id, first_end + Duration::hours(1))
        .await
        .unwrap();

    let snapshots = store.sessions_all(SortOrder::Descending).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    let ended_at = snapshots[0].session.ended_at.unwrap();
    assert_eq!(ended_at.timestamp_millis(), first_end.timestamp_millis());
    assert_eq!(snapshots[0].member_count(), 1);
}

#[tokio::test]
async fn finish_unknown_session_is_an_error() {
    let store = DeviceStore::open_in_memory().await;
    let ghost = SessionRecord::started(Utc::now());
    let err = store.finish_session(&ghost.id, Utc::now()).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
}

#[tokio::test]
async fn append_members_is_idempotent_and_ordered() {
    let store = DeviceStore::open_in_memory().await;

    let session = SessionRecord::started(Utc::now());
    store.create_session(&session).await.unwrap();

    let a = bt_device("a", -50);
    let b = lan_device("10.0.0.2");
    store.append_members(&session.id, &[a.clone()]).await.unwrap();
    // Re-delivery of a plus a new device in the same batch
    store
        .append_members(&session.id, &[a.clone(), b.clone()])
        .await
        .unwrap();
    store.append_members(&session.id, &[b.clone()]).await.unwrap();

    let snapshots = store.sessions_all(SortOrder::Descending).await.unwrap();
    assert_eq!(snapshots[0].member_count(), 2);
    // Insertion order preserved
    assert_eq!(snapshots[0].devices[0].id, a.id);
    assert_eq!(snapshots[0].devices[1].id, b.id);
}

#[tokio::test]
async fn append_to_missing_session_fails() {
    let store = DeviceStore::open_in_memory().await;
    let ghost = SessionRecord::started(Utc::now());
    let err = store
        .append_members(&ghost.id, &[bt_device("a", -50)])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
}

#[tokio::test]
async fn device_is_never_moved_between_sessions() {
    let store = DeviceStore::open_in_memory().await;

    let first = SessionRecord::started(Utc::now());
    store.create_session(&first).await.unwrap();
    let shared = bt_device("sticky", -50);
    store.append_members(&first.id, &[shared.clone()]).await.unwrap();
    store.finish_session(&first.id, Utc::now()).await.unwrap();

    let second = SessionRecord::started(Utc::now());
    store.create_session(&second).await.unwrap();
    store.append_members(&second.id, &[shared.clone()]).await.unwrap();

    let snapshots = store.sessions_all(SortOrder::Ascending).await.unwrap();
    assert_eq!(snapshots[0].session.id, first.id);
    assert_eq!(snapshots[0].member_count(), 1);
    assert_eq!(snapshots[1].member_count(), 0);
}

#[tokio::test]
async fn delete_session_removes_session_and_member_devices() {
    let store = DeviceStore::open_in_memory().await;

    let session = SessionRecord::started(Utc::now());
    store.create_session(&session).await.unwrap();
    let member = bt_device("a", -50);
    store
        .append_members(&session.id, &[member.clone()])
        .await
        .unwrap();
    store.finish_session(&session.id, Utc::now()).await.unwrap();

    store.delete_session(&session.id).await.unwrap();

    assert!(store.sessions_all(SortOrder::Descending).await.unwrap().is_empty());
    assert!(store.get_device(&member.id).await.unwrap().is_none());
    assert_eq!(store.device_count().await.unwrap(), 0);
}

#[tokio::test]
async fn delete_session_spares_other_sessions_devices() {
    let store = DeviceStore::open_in_memory().await;

    let first = SessionRecord::started(Utc::now());
    store.create_session(&first).await.unwrap();
    let kept = bt_device("kept", -50);
    store.append_members(&first.id, &[kept.clone()]).await.unwrap();
    store.finish_session(&first.id, Utc::now()).await.unwrap();

    let second = SessionRecord::started(Utc::now());
    store.create_session(&second).await.unwrap();
    let dropped = lan_device("10.0.0.9");
    store.append_members(&second.id, &[dropped.clone()]).await.unwrap();
    store.finish_session(&second.id, Utc::now()).await.unwrap();

    store.delete_session(&second.id).await.unwrap();

    let snapshots = store.sessions_all(SortOrder::Descending).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].session.id, first.id);
    assert!(store.get_device(&kept.id).await.unwrap().is_some());
    assert!(store.get_device(&dropped.id).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_device_also_clears_its_membership() {
    let store = DeviceStore::open_in_memory().await;

    let session = SessionRecord::started(Utc::now());
    store.create_session(&session).await.unwrap();
    let a = bt_device("a", -50);
    let b = lan_device("10.0.0.2");
    store
        .append_members(&session.id, &[a.clone(), b.clone()])
        .await
        .unwrap();

    store.delete_device(&a.id).await.unwrap();

    assert!(store.get_device(&a.id).await.unwrap().is_none());
    let snapshots = store.sessions_all(SortOrder::Descending).await.unwrap();
    assert_eq!(snapshots[0].member_count(), 1);
    assert_eq!(snapshots[0].devices[0].id, b.id);
}

#[tokio::test]
async fn delete_all_wipes_everything() {
    let store = DeviceStore::open_in_memory().await;

    let session = SessionRecord::started(Utc::now());
    store.create_session(&session).await.unwrap();
    store
        .append_members(&session.id, &[bt_device("a", -50), lan_device("10.0.0.3")])
        .await
        .unwrap();

    store.delete_all().await.unwrap();

    assert_eq!(store.device_count().await.unwrap(), 0);
    assert!(store.sessions_all(SortOrder::Descending).await.unwrap().is_empty());
    assert!(store.active_session().await.unwrap().is_none());
}

#[tokio::test]
async fn devices_where_filters_kind_and_sorts() {
    let store = DeviceStore::open_in_memory().await;

    let mut older = bt_device("old", -50);
    older.discovered_at = Utc::now() - Duration::hours(2);
    let newer = bt_device("new", -60);
    let lan = lan_device("10.0.0.4");

    for d in [&older, &newer, &lan] {
        store.put_device(d).await.unwrap();
    }

    let bluetooth = store
        .devices_where(DeviceTypeFilter::Bluetooth, TimeWindow::All, SortOrder::Ascending)
        .await
        .unwrap();
    assert_eq!(bluetooth.len(), 2);
    assert_eq!(bluetooth[0].id, older.id);
    assert_eq!(bluetooth[1].id, newer.id);

    let recent = store
        .devices_where(DeviceTypeFilter::All, TimeWindow::LastHour, SortOrder::Descending)
        .await
        .unwrap();
    assert!(recent.iter().all(|d| d.id != older.id));
    assert_eq!(recent.len(), 2);
}

#[tokio::test]
async fn failed_open_fails_fast_everywhere() {
    // Parent "directory" is a regular file, so the open cannot succeed.
    let blocker = tempfile::NamedTempFile::new().unwrap();
    let path = blocker.path().join("nested/nscan.sqlite3");

    let store = DeviceStore::open(&path).await;
    assert!(store.init_error().is_some());

    let err = store.device_count().await.unwrap_err();
    assert!(matches!(err, DbError::NotInitialized(_)), "got: {err}");
    let err = store.put_device(&bt_device("a", -50)).await.unwrap_err();
    assert!(matches!(err, DbError::NotInitialized(_)));
}

#[tokio::test]
async fn mutations_bump_the_revision() {
    let store = DeviceStore::open_in_memory().await;
    let mut changes = store.subscribe_changes();
    let before = store.revision();

    let device = bt_device("a", -50);
    store.put_device(&device).await.unwrap();
    assert!(store.revision() > before);
    changes.changed().await.unwrap();
    assert_eq!(*changes.borrow_and_update(), store.revision());

    // Ignored re-delivery commits nothing and notifies nobody
    let rev = store.revision();
    store.put_device(&device).await.unwrap();
    assert_eq!(store.revision(), rev);
}
