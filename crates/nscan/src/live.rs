//! Live queries: store snapshots re-published on every mutation.
//!
//! A subscription immediately delivers the current snapshot, then a fresh
//! one after every committed store write that could affect it. Snapshots
//! are re-queried under the newest revision, so delivery is monotonic in
//! time. Dropping (or closing) the subscription releases its task.

use nscan_db::DeviceStore;
use nscan_protocol::{DeviceRecord, SessionSnapshot, SortOrder, TimeWindow};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Push-style query service over the device store.
#[derive(Clone)]
pub struct LiveQueryService {
    store: DeviceStore,
}

/// An active subscription. `next()` yields snapshots until the
/// subscription is closed or the store goes away.
pub struct LiveQuery<T> {
    rx: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T> LiveQuery<T> {
    /// Next snapshot. The first call resolves immediately with the current
    /// state; later calls resolve after mutations.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Release the subscription. Also happens on drop.
    pub fn close(&mut self) {
        self.task.abort();
        self.rx.close();
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl LiveQueryService {
    pub fn new(store: DeviceStore) -> Self {
        Self { store }
    }

    /// All devices, newest first, refreshed on every store change.
    pub fn subscribe_devices(&self) -> LiveQuery<Vec<DeviceRecord>> {
        let store = self.store.clone();
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            let mut changes = store.subscribe_changes();
            loop {
                let snapshot = match store
                    .devices_where(Default::default(), TimeWindow::All, SortOrder::Descending)
                    .await
                {
                    Ok(devices) => devices,
                    Err(e) => {
                        // Degrade to empty, never crash the subscriber.
                        warn!(error = %e, "Live device query failed");
                        Vec::new()
                    }
                };
                if tx.send(snapshot).await.is_err() {
                    break;
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
        });

        LiveQuery { rx, task }
    }

    /// All sessions with members, newest first, refreshed on every store
    /// change.
    pub fn subscribe_sessions(&self) -> LiveQuery<Vec<SessionSnapshot>> {
        let store = self.store.clone();
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            let mut changes = store.subscribe_changes();
            loop {
                let snapshot = match store.sessions_all(SortOrder::Descending).await {
                    Ok(sessions) => sessions,
                    Err(e) => {
                        warn!(error = %e, "Live session query failed");
                        Vec::new()
                    }
                };
                if tx.send(snapshot).await.is_err() {
                    break;
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
        });

        LiveQuery { rx, task }
    }
}
