//! Durable device/session store for NScan.
//!
//! This crate is the single source of truth for persistence. The engine,
//! CLI, and any other frontend go through [`DeviceStore`]; no other crate
//! touches SQL.
//!
//! # Usage
//!
//! ```rust,ignore
//! use nscan_db::DeviceStore;
//!
//! let store = DeviceStore::open("~/.nscan/nscan.sqlite3").await;
//! if let Some(err) = store.init_error() {
//!     eprintln!("store unavailable: {err}");
//! }
//! let devices = store.devices_where(Default::default(), Default::default(), Default::default()).await?;
//! ```
//!
//! Initialization failures are sticky: `open` always returns a handle, and
//! a handle whose backing medium could not be opened fails every operation
//! fast with [`DbError::NotInitialized`] instead of silently no-opping.

mod devices;
mod error;
mod schema;
mod sessions;

pub use error::{DbError, Result};

use std::path::Path;
use std::sync::Arc;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::sync::watch;
use tracing::{error, info};

enum StoreState {
    Ready(SqlitePool),
    Failed(String),
}

struct Inner {
    state: StoreState,
    /// Bumped after every committed mutation; live queries watch this.
    changes: watch::Sender<u64>,
}

/// Handle to the device/session store. Cheap to clone; all clones share
/// the same pool and change channel.
#[derive(Clone)]
pub struct DeviceStore {
    inner: Arc<Inner>,
}

impl DeviceStore {
    /// Open or create a store at the given path.
    ///
    /// Never panics and never returns an error: a failed open yields a
    /// handle with a persistent error flag (see [`DeviceStore::init_error`]).
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        match Self::try_open(path).await {
            Ok(pool) => {
                info!(path = %path.display(), "Device store opened");
                Self::ready(pool)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Device store failed to open");
                Self::failed(e.to_string())
            }
        }
    }

    /// Open an in-memory store (tests and throwaway runs).
    pub async fn open_in_memory() -> Self {
        match Self::try_open_memory().await {
            Ok(pool) => Self::ready(pool),
            Err(e) => Self::failed(e.to_string()),
        }
    }

    async fn try_open(path: &Path) -> Result<SqlitePool> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        schema::ensure_schema(&pool).await?;
        Ok(pool)
    }

    async fn try_open_memory() -> Result<SqlitePool> {
        // A single connection keeps every caller on the same in-memory db.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        schema::ensure_schema(&pool).await?;
        Ok(pool)
    }

    fn ready(pool: SqlitePool) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: StoreState::Ready(pool),
                changes,
            }),
        }
    }

    fn failed(message: String) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: StoreState::Failed(message),
                changes,
            }),
        }
    }

    /// The initialization failure, if the backing medium could not be opened.
    pub fn init_error(&self) -> Option<&str> {
        match &self.inner.state {
            StoreState::Ready(_) => None,
            StoreState::Failed(msg) => Some(msg),
        }
    }

    /// Current mutation revision. Starts at 0 for a fresh handle.
    pub fn revision(&self) -> u64 {
        *self.inner.changes.borrow()
    }

    /// Subscribe to mutation notifications. The receiver yields the new
    /// revision after every committed write.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    pub(crate) fn pool(&self) -> Result<&SqlitePool> {
        match &self.inner.state {
            StoreState::Ready(pool) => Ok(pool),
            StoreState::Failed(msg) => Err(DbError::NotInitialized(msg.clone())),
        }
    }

    pub(crate) fn bump_revision(&self) {
        self.inner.changes.send_modify(|rev| *rev += 1);
    }

    /// Close the store. Outstanding operations finish first.
    pub async fn close(&self) {
        if let StoreState::Ready(pool) = &self.inner.state {
            pool.close().await;
        }
    }
}

// Timestamp helpers: timestamps are persisted as milliseconds since epoch.
impl DeviceStore {
    pub(crate) fn to_millis(dt: chrono::DateTime<chrono::Utc>) -> i64 {
        dt.timestamp_millis()
    }

    pub(crate) fn from_millis(millis: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }
}
