//! Engine error types.

use nscan_db::DbError;
use thiserror::Error;

/// Engine operation result type.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the scan engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Persistence failure from the device store.
    #[error(transparent)]
    Db(#[from] DbError),

    /// `start_run` while a session is already accepting appends. The
    /// at-most-one-active-session invariant is preserved; the call is a
    /// rejected no-op.
    #[error("A scan session is already active")]
    SessionAlreadyActive,

    /// `append_devices` with no active session.
    #[error("No scan session is active")]
    NoActiveSession,

    /// A second concurrent scan run was requested.
    #[error("A scan run is already in progress")]
    RunAlreadyActive,

    /// Failure reported by a scan driver.
    #[error("Scan driver error: {0}")]
    Driver(String),
}
