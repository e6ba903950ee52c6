//! Scan-driver contract and the scripted driver used by tests and demos.
//!
//! The two physical drivers (Bluetooth advertisement scanner, LAN prober)
//! live outside this crate; the engine only sees this trait. Both drivers
//! push into one shared channel, each event tagged with its origin, and no
//! delivery order is guaranteed between them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nscan_protocol::{DriverEvent, DriverKind, TaggedEvent};
use tokio::sync::mpsc;

/// One discovery channel as the aggregator sees it.
///
/// `start` hands the driver the event sender and returns immediately; the
/// driver runs on its own task/thread from then on. `stop` must be
/// idempotent and must eventually be answered with a
/// `ScanningChanged(false)` event (or by dropping the sender).
pub trait ScanDriver: Send + Sync {
    fn kind(&self) -> DriverKind;
    fn start(&self, events: mpsc::Sender<TaggedEvent>);
    fn stop(&self);
}

/// Driver that replays a fixed event script, one event per step delay.
///
/// Used by the engine tests and by `nscan scan --simulate`. On stop (or
/// script end) it reports `ScanningChanged(false)` and drops its sender.
pub struct ScriptedDriver {
    kind: DriverKind,
    script: Vec<DriverEvent>,
    step_delay: Duration,
    stopped: Arc<AtomicBool>,
}

impl ScriptedDriver {
    pub fn new(kind: DriverKind, script: Vec<DriverEvent>, step_delay: Duration) -> Self {
        Self {
            kind,
            script,
            step_delay,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ScanDriver for ScriptedDriver {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    fn start(&self, events: mpsc::Sender<TaggedEvent>) {
        let kind = self.kind;
        let script = self.script.clone();
        let step_delay = self.step_delay;
        let stopped = Arc::clone(&self.stopped);

        tokio::spawn(async move {
            for event in script {
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                if !step_delay.is_zero() {
                    tokio::time::sleep(step_delay).await;
                }
                if events.send(TaggedEvent::new(kind, event)).await.is_err() {
                    return;
                }
            }
            // A redundant inactive flag is harmless; a missing one would
            // leave the run hanging.
            let _ = events
                .send(TaggedEvent::new(kind, DriverEvent::ScanningChanged(false)))
                .await;
        });
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
