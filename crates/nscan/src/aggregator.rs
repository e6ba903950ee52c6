//! Discovery aggregator: merges the two driver streams into one scan run.
//!
//! One tokio task owns the whole run. It computes the OR of the drivers'
//! scanning flags, dedups discoveries by identity, forwards new devices to
//! the session manager, and finishes the session exactly once when the OR
//! transitions back to false. A wall-clock ceiling bounds the run even if
//! a driver never reports inactive.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nscan_db::DeviceStore;
use nscan_protocol::{DeviceIdentity, DriverEvent, DriverKind, SessionId, TaggedEvent};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::driver::ScanDriver;
use crate::error::Result;
use crate::session::SessionManager;

/// Tuning knobs for a scan run.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Hard ceiling on the run; both drivers are force-stopped when it
    /// elapses. Matches the drivers' own 15 s scan window by default.
    pub max_scan_duration: Duration,
    /// Bound on buffered driver events.
    pub event_buffer: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_scan_duration: Duration::from_secs(15),
            event_buffer: 256,
        }
    }
}

pub struct DiscoveryAggregator;

impl DiscoveryAggregator {
    /// Start a scan run: create the session, start both drivers, and spawn
    /// the coordination task.
    ///
    /// Fails with `SessionAlreadyActive` (and starts nothing) if a session
    /// is still accepting appends.
    pub async fn start(
        store: DeviceStore,
        drivers: Vec<Arc<dyn ScanDriver>>,
        config: ScanConfig,
    ) -> Result<ScanHandle> {
        let mut sessions = SessionManager::new(store);
        // Session first, drivers second: a discovery arriving before the
        // session exists would have nowhere to go.
        let session_id = sessions.start_run().await?;

        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let (scanning_tx, scanning_rx) = watch::channel(false);
        let (progress_tx, progress_rx) = watch::channel(0.0);
        let (count_tx, count_rx) = watch::channel(0usize);
        let (error_tx, error_rx) = mpsc::channel(32);

        for driver in &drivers {
            driver.start(event_tx.clone());
        }
        drop(event_tx);

        let run = RunLoop {
            sessions,
            events: event_rx,
            scanning: scanning_tx,
            progress: progress_tx,
            count: count_tx,
            errors: error_tx,
            drivers: drivers.clone(),
            max_scan_duration: config.max_scan_duration,
        };
        let task = tokio::spawn(run.run());

        Ok(ScanHandle {
            session_id,
            scanning: scanning_rx,
            progress: progress_rx,
            device_count: count_rx,
            errors: error_rx,
            drivers,
            task,
        })
    }
}

/// Live handle to a running (or finished) scan run.
pub struct ScanHandle {
    session_id: SessionId,
    scanning: watch::Receiver<bool>,
    progress: watch::Receiver<f64>,
    device_count: watch::Receiver<usize>,
    errors: mpsc::Receiver<String>,
    drivers: Vec<Arc<dyn ScanDriver>>,
    task: JoinHandle<()>,
}

impl ScanHandle {
    /// The session this run appends into.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// OR of both drivers' scanning flags.
    pub fn is_scanning(&self) -> bool {
        *self.scanning.borrow()
    }

    /// Watch the combined scanning flag.
    pub fn subscribe_scanning(&self) -> watch::Receiver<bool> {
        self.scanning.clone()
    }

    /// Merged progress indicator, 0.0..=1.0 (network driver; forced to 1.0
    /// at run end).
    pub fn progress(&self) -> f64 {
        *self.progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<f64> {
        self.progress.clone()
    }

    /// Distinct devices accepted into the session so far.
    pub fn device_count(&self) -> usize {
        *self.device_count.borrow()
    }

    pub fn subscribe_device_count(&self) -> watch::Receiver<usize> {
        self.device_count.clone()
    }

    /// Next merged error (both drivers plus persistence failures).
    /// Returns `None` once the run is over and the backlog is drained.
    pub async fn next_error(&mut self) -> Option<String> {
        self.errors.recv().await
    }

    pub fn try_next_error(&mut self) -> Option<String> {
        self.errors.try_recv().ok()
    }

    /// Stop the run. Idempotent; stops both drivers even if one already
    /// finished on its own.
    pub fn stop(&self) {
        for driver in &self.drivers {
            driver.stop();
        }
    }

    /// Wait for the coordination task to wind down and return the run's
    /// session id.
    pub async fn wait(self) -> SessionId {
        let _ = self.task.await;
        self.session_id
    }
}

struct RunLoop {
    sessions: SessionManager,
    events: mpsc::Receiver<TaggedEvent>,
    scanning: watch::Sender<bool>,
    progress: watch::Sender<f64>,
    count: watch::Sender<usize>,
    errors: mpsc::Sender<String>,
    drivers: Vec<Arc<dyn ScanDriver>>,
    max_scan_duration: Duration,
}

impl RunLoop {
    async fn run(mut self) {
        let mut radio_scanning = false;
        let mut network_scanning = false;
        let mut finished = false;
        let mut ceiling_hit = false;
        let mut seen: HashSet<DeviceIdentity> = HashSet::new();

        let ceiling = tokio::time::sleep(self.max_scan_duration);
        tokio::pin!(ceiling);

        loop {
            tokio::select! {
                _ = &mut ceiling, if !ceiling_hit => {
                    warn!("Scan duration ceiling reached, forcing stop");
                    ceiling_hit = true;
                    for driver in &self.drivers {
                        driver.stop();
                    }
                }

                maybe = self.events.recv() => {
                    let Some(TaggedEvent { driver, event }) = maybe else {
                        // Both drivers dropped their senders.
                        break;
                    };
                    match event {
                        DriverEvent::ScanningChanged(active) => {
                            let was_scanning = radio_scanning || network_scanning;
                            match driver {
                                DriverKind::Radio => radio_scanning = active,
                                DriverKind::Network => network_scanning = active,
                            }
                            let now_scanning = radio_scanning || network_scanning;
                            if was_scanning != now_scanning {
                                self.scanning.send_replace(now_scanning);
                            }
                            if was_scanning && !now_scanning && !finished {
                                finished = true;
                                self.finish().await;
                            }
                        }

                        DriverEvent::Discovered(discovery) => {
                            if finished {
                                debug!(?driver, "Discovery after run end ignored");
                                continue;
                            }
                            let identity = discovery.identity();
                            // First seen wins: a repeated identity is dropped
                            // here even when its payload (rssi, name) differs.
                            if !seen.insert(identity.clone()) {
                                continue;
                            }
                            let record = discovery.into_record(Utc::now());
                            match self.sessions.append_devices(std::slice::from_ref(&record)).await {
                                Ok(()) => {
                                    self.count.send_modify(|c| *c += 1);
                                }
                                Err(e) => {
                                    // Forget the identity so a re-advertisement
                                    // retries the persist.
                                    seen.remove(&identity);
                                    warn!(error = %e, "Failed to persist discovered device");
                                    let _ = self.errors.try_send(e.to_string());
                                }
                            }
                        }

                        DriverEvent::Progress(fraction) => {
                            if !finished {
                                self.progress.send_replace(fraction.clamp(0.0, 1.0));
                            }
                        }

                        DriverEvent::Error(message) => {
                            // A driver error does not stop the other driver.
                            warn!(?driver, error = %message, "Scan driver reported an error");
                            let _ = self.errors.try_send(message);
                        }
                    }
                }
            }
        }

        // Drivers went away without reporting inactive (crash, forced
        // stop): close out the run.
        if !finished {
            self.scanning.send_replace(false);
            self.finish().await;
        }
    }

    async fn finish(&mut self) {
        self.progress.send_replace(1.0);
        if let Err(e) = self.sessions.finish_run().await {
            warn!(error = %e, "Failed to finalize scan session");
            let _ = self.errors.try_send(e.to_string());
        }
    }
}
