//! Session lifecycle state machine.
//!
//! Two states: Idle (no active session) and Active (one session accepting
//! appends). All calls come from the aggregator's single coordination
//! task, so no internal locking is needed; the store's single-active
//! index backstops the invariant against any second writer.

use chrono::Utc;
use nscan_db::DeviceStore;
use nscan_protocol::{DeviceRecord, SessionId, SessionRecord};
use tracing::{info, warn};

use crate::error::{EngineError, Result};

pub struct SessionManager {
    store: DeviceStore,
    current: Option<SessionId>,
}

impl SessionManager {
    pub fn new(store: DeviceStore) -> Self {
        Self {
            store,
            current: None,
        }
    }

    /// The session currently accepting appends, if any.
    pub fn current(&self) -> Option<&SessionId> {
        self.current.as_ref()
    }

    /// Idle -> Active: create and persist an empty session.
    ///
    /// While Active this is a logic error: it is rejected without touching
    /// the existing session.
    pub async fn start_run(&mut self) -> Result<SessionId> {
        if let Some(current) = &self.current {
            warn!(session = %current, "start_run called while a session is active");
            return Err(EngineError::SessionAlreadyActive);
        }

        let session = SessionRecord::started(Utc::now());
        match self.store.create_session(&session).await {
            Ok(()) => {
                info!(session = %session.id, "Scan session started");
                self.current = Some(session.id.clone());
                Ok(session.id)
            }
            Err(e) if e.is_unique_violation() => {
                warn!("start_run refused: the store already holds an active session");
                Err(EngineError::SessionAlreadyActive)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist devices and add them to the active session's member list.
    ///
    /// Idempotent per device: re-delivery of an existing member changes
    /// nothing. Persistence failures propagate; the state machine stays
    /// Active and the caller may retry with the same records.
    pub async fn append_devices(&self, devices: &[DeviceRecord]) -> Result<()> {
        let session_id = self.current.as_ref().ok_or(EngineError::NoActiveSession)?;
        self.store.append_members(session_id, devices).await?;
        Ok(())
    }

    /// Active -> Idle: stamp the end time and clear the current reference.
    ///
    /// While Idle this is a no-op. The current reference is cleared even
    /// when the persist fails, so a failed finish never leaves the run
    /// half-active; the caller can retry against the store with the
    /// returned session id.
    pub async fn finish_run(&mut self) -> Result<()> {
        let Some(session_id) = self.current.take() else {
            return Ok(());
        };

        self.store.finish_session(&session_id, Utc::now()).await?;
        info!(session = %session_id, "Scan session finished");
        Ok(())
    }
}
