//! Scan session operations.

use std::collections::HashMap;

use crate::devices::row_to_device;
use crate::error::{DbError, Result};
use crate::DeviceStore;
use chrono::{DateTime, Utc};
use nscan_protocol::{DeviceRecord, SessionId, SessionRecord, SessionSnapshot, SortOrder};
use sqlx::Row;

impl DeviceStore {
    /// Persist a new session record.
    ///
    /// Inserting a second active session violates the single-active index
    /// and surfaces as [`DbError::Constraint`].
    pub async fn create_session(&self, session: &SessionRecord) -> Result<()> {
        let pool = self.pool()?;

        let result = sqlx::query(
            "INSERT INTO scan_sessions (id, started_at, ended_at) VALUES (?, ?, ?)",
        )
        .bind(session.id.as_str())
        .bind(Self::to_millis(session.started_at))
        .bind(session.ended_at.map(Self::to_millis))
        .execute(pool)
        .await;

        match result {
            Ok(_) => {
                self.bump_revision();
                Ok(())
            }
            Err(e) => {
                let err = DbError::from(e);
                if err.is_unique_violation() {
                    Err(DbError::constraint(format!(
                        "cannot create session {}: another session is still active",
                        session.id
                    )))
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Append devices to a session's member list, persisting any device
    /// records not yet stored. One transaction per call; re-delivery of an
    /// existing member (or a device already owned by another session) is
    /// ignored, so appends are idempotent.
    pub async fn append_members(
        &self,
        session_id: &SessionId,
        devices: &[DeviceRecord],
    ) -> Result<()> {
        if devices.is_empty() {
            return Ok(());
        }
        let pool = self.pool()?;

        let mut tx = pool.begin().await?;

        // Appending to a session whose creation never committed must fail,
        // not silently invent membership rows.
        let exists = sqlx::query("SELECT 1 FROM scan_sessions WHERE id = ?")
            .bind(session_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(DbError::not_found(format!("session {session_id}")));
        }

        let row = sqlx::query(
            "SELECT COALESCE(MAX(position), -1) AS max_pos FROM session_members WHERE session_id = ?",
        )
        .bind(session_id.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let mut position: i64 = row.get::<i64, _>("max_pos") + 1;

        let mut mutated = false;
        for device in devices {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO devices
                    (id, kind, name, radio_id, rssi, status, ip_address, mac_address, discovered_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(device.id.as_str())
            .bind(device.kind.as_str())
            .bind(&device.name)
            .bind(&device.radio_id)
            .bind(device.rssi)
            .bind(&device.status)
            .bind(&device.ip_address)
            .bind(&device.mac_address)
            .bind(Self::to_millis(device.discovered_at))
            .execute(&mut *tx)
            .await?;

            let inserted = sqlx::query(
                "INSERT OR IGNORE INTO session_members (session_id, device_id, position) VALUES (?, ?, ?)",
            )
            .bind(session_id.as_str())
            .bind(device.id.as_str())
            .bind(position)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() > 0 {
                position += 1;
                mutated = true;
            }
        }

        tx.commit().await?;

        if mutated {
            self.bump_revision();
        }
        Ok(())
    }

    /// Stamp a session's end time. Idempotent: a session that already has
    /// an end time keeps it.
    pub async fn finish_session(&self, session_id: &SessionId, ended_at: DateTime<Utc>) -> Result<()> {
        let pool = self.pool()?;

        let result = sqlx::query(
            "UPDATE scan_sessions SET ended_at = ? WHERE id = ? AND ended_at IS NULL",
        )
        .bind(Self::to_millis(ended_at))
        .bind(session_id.as_str())
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            self.bump_revision();
            return Ok(());
        }

        // Distinguish already-finished (fine) from never-created (error).
        let exists = sqlx::query("SELECT 1 FROM scan_sessions WHERE id = ?")
            .bind(session_id.as_str())
            .fetch_optional(pool)
            .await?;
        if exists.is_none() {
            return Err(DbError::not_found(format!("session {session_id}")));
        }
        Ok(())
    }

    /// The session currently accepting appends, if any.
    pub async fn active_session(&self) -> Result<Option<SessionRecord>> {
        let pool = self.pool()?;

        let row = sqlx::query(
            "SELECT id, started_at, ended_at FROM scan_sessions WHERE ended_at IS NULL LIMIT 1",
        )
        .fetch_optional(pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    /// All sessions with their members in insertion order, sorted by
    /// `started_at`.
    pub async fn sessions_all(&self, sort: SortOrder) -> Result<Vec<SessionSnapshot>> {
        let pool = self.pool()?;

        let order = if sort.is_ascending() { "ASC" } else { "DESC" };
        let sql =
            format!("SELECT id, started_at, ended_at FROM scan_sessions ORDER BY started_at {order}");
        let rows = sqlx::query(&sql).fetch_all(pool).await?;

        let sessions: Vec<SessionRecord> = rows
            .iter()
            .map(row_to_session)
            .collect::<Result<Vec<_>>>()?;

        let member_rows = sqlx::query(
            r#"
            SELECT sm.session_id AS session_id,
                   d.id, d.kind, d.name, d.radio_id, d.rssi, d.status,
                   d.ip_address, d.mac_address, d.discovered_at
            FROM session_members sm
            JOIN devices d ON d.id = sm.device_id
            ORDER BY sm.session_id, sm.position
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut members: HashMap<String, Vec<DeviceRecord>> = HashMap::new();
        for row in &member_rows {
            let session_id: String = row.get("session_id");
            members
                .entry(session_id)
                .or_default()
                .push(row_to_device(row)?);
        }

        Ok(sessions
            .into_iter()
            .map(|session| {
                let devices = members.remove(session.id.as_str()).unwrap_or_default();
                SessionSnapshot { session, devices }
            })
            .collect())
    }

    /// Delete a session together with all its member devices. Devices
    /// belonging to other sessions are untouched.
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        let pool = self.pool()?;

        let mut tx = pool.begin().await?;
        // Membership rows reference their device rows, so capture the
        // member ids and delete child rows before parents.
        let member_rows = sqlx::query("SELECT device_id FROM session_members WHERE session_id = ?")
            .bind(session_id.as_str())
            .fetch_all(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM session_members WHERE session_id = ?")
            .bind(session_id.as_str())
            .execute(&mut *tx)
            .await?;
        for row in &member_rows {
            sqlx::query("DELETE FROM devices WHERE id = ?")
                .bind(row.get::<String, _>("device_id"))
                .execute(&mut *tx)
                .await?;
        }
        let result = sqlx::query("DELETE FROM scan_sessions WHERE id = ?")
            .bind(session_id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(format!("session {session_id}")));
        }
        self.bump_revision();
        Ok(())
    }

    /// Wipe every device, membership, and session record.
    pub async fn delete_all(&self) -> Result<()> {
        let pool = self.pool()?;

        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM session_members")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM devices").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM scan_sessions")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.bump_revision();
        Ok(())
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRecord> {
    let id: String = row.get("id");
    Ok(SessionRecord {
        id: SessionId::parse(&id).map_err(|e| DbError::constraint(e.to_string()))?,
        started_at: DeviceStore::from_millis(row.get("started_at")),
        ended_at: row
            .get::<Option<i64>, _>("ended_at")
            .map(DeviceStore::from_millis),
    })
}
