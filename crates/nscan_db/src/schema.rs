//! Schema creation for the device store.
//!
//! All CREATE TABLE statements live here - single source of truth.

use crate::error::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Ensure all tables and indexes exist.
pub(crate) async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    // WAL keeps readers on a consistent snapshot while the single
    // writer commits.
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    sqlx::query("PRAGMA synchronous=NORMAL")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON").execute(pool).await?;

    // Devices: append-only records, one row per discovery identity per run
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            name TEXT,
            radio_id TEXT,
            rssi INTEGER,
            status TEXT,
            ip_address TEXT,
            mac_address TEXT,
            discovered_at INTEGER NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    // Sessions: one row per scan run; active while ended_at is NULL
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS scan_sessions (
            id TEXT PRIMARY KEY,
            started_at INTEGER NOT NULL,
            ended_at INTEGER
        )"#,
    )
    .execute(pool)
    .await?;

    // At most one active session, enforced at the storage layer
    sqlx::query(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_single_active
           ON scan_sessions(ended_at IS NULL) WHERE ended_at IS NULL"#,
    )
    .execute(pool)
    .await?;

    // Membership: a device belongs to exactly one session; position
    // preserves insertion order
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS session_members (
            session_id TEXT NOT NULL REFERENCES scan_sessions(id),
            device_id TEXT NOT NULL UNIQUE REFERENCES devices(id),
            position INTEGER NOT NULL,
            PRIMARY KEY (session_id, device_id)
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_devices_kind ON devices(kind)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_devices_discovered ON devices(discovered_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_started ON scan_sessions(started_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_members_session ON session_members(session_id)")
        .execute(pool)
        .await?;

    info!("Device store schema verified");
    Ok(())
}
