//! The engine facade exposed to presentation layers.

use std::sync::Arc;

use chrono::Utc;
use nscan_db::DeviceStore;
use nscan_protocol::{
    DeviceKind, DeviceRecord, SessionId, SessionSnapshot, SortOrder, TimeWindow,
};
use tracing::info;

use crate::aggregator::{DiscoveryAggregator, ScanConfig, ScanHandle};
use crate::driver::ScanDriver;
use crate::error::{EngineError, Result};
use crate::history;
use crate::live::{LiveQuery, LiveQueryService};

/// Stored-device totals, overall and per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total_devices: u64,
    pub bluetooth_devices: u64,
    pub lan_devices: u64,
}

/// Everything a frontend needs: run control, live collections, history
/// filtering, and deletion. Construct one per store; clones share it.
#[derive(Clone)]
pub struct ScanService {
    store: DeviceStore,
    live: LiveQueryService,
}

impl ScanService {
    pub fn new(store: DeviceStore) -> Self {
        let live = LiveQueryService::new(store.clone());
        Self { store, live }
    }

    pub fn store(&self) -> &DeviceStore {
        &self.store
    }

    /// Start a scan run over the given drivers.
    ///
    /// Rejected with `RunAlreadyActive` while a previous run's session is
    /// still open; stop (or wait out) the previous run first.
    pub async fn start_run(
        &self,
        drivers: Vec<Arc<dyn ScanDriver>>,
        config: ScanConfig,
    ) -> Result<ScanHandle> {
        if self.store.active_session().await?.is_some() {
            return Err(EngineError::RunAlreadyActive);
        }
        DiscoveryAggregator::start(self.store.clone(), drivers, config).await
    }

    /// Live view of all stored devices, newest first.
    pub fn subscribe_devices(&self) -> LiveQuery<Vec<DeviceRecord>> {
        self.live.subscribe_devices()
    }

    /// Live view of all sessions with their members, newest first.
    pub fn subscribe_sessions(&self) -> LiveQuery<Vec<SessionSnapshot>> {
        self.live.subscribe_sessions()
    }

    /// Filtered, sorted, text-searched session history (pure filtering
    /// over the current store snapshot).
    pub async fn filtered_sessions(
        &self,
        window: TimeWindow,
        query: &str,
        sort: SortOrder,
    ) -> Result<Vec<SessionSnapshot>> {
        let sessions = self.store.sessions_all(sort).await?;
        Ok(history::filter_sessions(
            &sessions,
            window,
            query,
            sort,
            Utc::now(),
        ))
    }

    /// Delete one session and all its member devices.
    pub async fn delete_session(&self, id: &SessionId) -> Result<()> {
        self.store.delete_session(id).await?;
        info!(session = %id, "Session deleted");
        Ok(())
    }

    /// Wipe the whole store.
    pub async fn delete_all_data(&self) -> Result<()> {
        self.store.delete_all().await?;
        info!("All scan data deleted");
        Ok(())
    }

    /// Stored-device totals.
    pub async fn statistics(&self) -> Result<Statistics> {
        let total_devices = self.store.device_count().await?;
        let mut stats = Statistics {
            total_devices,
            ..Default::default()
        };
        for (kind, count) in self.store.device_count_by_kind().await? {
            match kind {
                DeviceKind::Bluetooth => stats.bluetooth_devices = count,
                DeviceKind::Lan => stats.lan_devices = count,
            }
        }
        Ok(stats)
    }
}
