//! Device record operations.

use crate::error::{DbError, Result};
use crate::DeviceStore;
use nscan_protocol::{DeviceId, DeviceKind, DeviceRecord, DeviceTypeFilter, SortOrder, TimeWindow};
use sqlx::Row;

const DEVICE_COLUMNS: &str =
    "id, kind, name, radio_id, rssi, status, ip_address, mac_address, discovered_at";

impl DeviceStore {
    /// Persist a device record. First write wins: re-delivery of an
    /// already-stored id is ignored, never overwritten.
    pub async fn put_device(&self, device: &DeviceRecord) -> Result<()> {
        let pool = self.pool()?;

        let result = sqlx::query(
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
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            self.bump_revision();
        }
        Ok(())
    }

    /// Get a device by id.
    pub async fn get_device(&self, id: &DeviceId) -> Result<Option<DeviceRecord>> {
        let pool = self.pool()?;

        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(pool)
            .await?;

        row.as_ref().map(row_to_device).transpose()
    }

    /// Query devices by kind and discovery-time window, sorted by
    /// `discovered_at`. Relative windows are anchored to the current time.
    pub async fn devices_where(
        &self,
        filter: DeviceTypeFilter,
        window: TimeWindow,
        sort: SortOrder,
    ) -> Result<Vec<DeviceRecord>> {
        let pool = self.pool()?;

        let kind = match filter {
            DeviceTypeFilter::All => None,
            DeviceTypeFilter::Bluetooth => Some(DeviceKind::Bluetooth),
            DeviceTypeFilter::Lan => Some(DeviceKind::Lan),
        };
        let (start, end) = window.bounds(chrono::Utc::now());

        let mut sql = format!("SELECT {DEVICE_COLUMNS} FROM devices");
        let mut clauses: Vec<&str> = Vec::new();
        if kind.is_some() {
            clauses.push("kind = ?");
        }
        if start.is_some() {
            clauses.push("discovered_at >= ?");
        }
        if end.is_some() {
            clauses.push("discovered_at <= ?");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(if sort.is_ascending() {
            " ORDER BY discovered_at ASC"
        } else {
            " ORDER BY discovered_at DESC"
        });

        let mut query = sqlx::query(&sql);
        if let Some(kind) = kind {
            query = query.bind(kind.as_str());
        }
        if let Some(start) = start {
            query = query.bind(Self::to_millis(start));
        }
        if let Some(end) = end {
            query = query.bind(Self::to_millis(end));
        }

        let rows = query.fetch_all(pool).await?;
        rows.iter().map(row_to_device).collect()
    }

    /// Delete a single device and its session membership.
    pub async fn delete_device(&self, id: &DeviceId) -> Result<()> {
        let pool = self.pool()?;

        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM session_members WHERE device_id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM devices WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if result.rows_affected() > 0 {
            self.bump_revision();
        }
        Ok(())
    }

    /// Total number of stored devices.
    pub async fn device_count(&self) -> Result<u64> {
        let pool = self.pool()?;
        let row = sqlx::query("SELECT COUNT(*) AS n FROM devices")
            .fetch_one(pool)
            .await?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    /// Stored device counts broken down by kind.
    pub async fn device_count_by_kind(&self) -> Result<Vec<(DeviceKind, u64)>> {
        let pool = self.pool()?;
        let rows = sqlx::query("SELECT kind, COUNT(*) AS n FROM devices GROUP BY kind")
            .fetch_all(pool)
            .await?;

        let mut counts = Vec::new();
        for row in rows {
            let kind_str: String = row.get("kind");
            let kind = DeviceKind::parse(&kind_str)
                .ok_or_else(|| DbError::constraint(format!("unknown device kind: {kind_str}")))?;
            counts.push((kind, row.get::<i64, _>("n") as u64));
        }
        Ok(counts)
    }
}

pub(crate) fn row_to_device(row: &sqlx::sqlite::SqliteRow) -> Result<DeviceRecord> {
    let id: String = row.get("id");
    let kind_str: String = row.get("kind");
    let kind = DeviceKind::parse(&kind_str)
        .ok_or_else(|| DbError::constraint(format!("unknown device kind: {kind_str}")))?;

    Ok(DeviceRecord {
        id: DeviceId::parse(&id).map_err(|e| DbError::constraint(e.to_string()))?,
        kind,
        name: row.get("name"),
        radio_id: row.get("radio_id"),
        rssi: row.get("rssi"),
        status: row.get("status"),
        ip_address: row.get("ip_address"),
        mac_address: row.get("mac_address"),
        discovered_at: DeviceStore::from_millis(row.get("discovered_at")),
    })
}
