//! Canonical device/session records and the query vocabulary.
//!
//! `DeviceRecord` and `SessionRecord` are exactly what the Device Store
//! persists. Records are append-only: once created they are never mutated,
//! only deleted (single device, whole session, or full wipe).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::{DeviceId, SessionId};

// ============================================================================
// Device
// ============================================================================

/// Which discovery channel produced a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Short-range radio advertisement (Bluetooth LE).
    Bluetooth,
    /// Local-network probe (LAN).
    Lan,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bluetooth => "bluetooth",
            Self::Lan => "lan",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bluetooth" => Some(Self::Bluetooth),
            "lan" => Some(Self::Lan),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The deduplication key for a discovered device.
///
/// Two discovery events refer to the same device when their identities are
/// equal, regardless of payload differences (rssi, name updates, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceIdentity {
    /// Bluetooth peripheral identifier.
    Radio(String),
    /// LAN address pair. The mac is part of the key when known.
    Network { ip: String, mac: Option<String> },
}

/// A device discovered during a scan run.
///
/// Exactly the fields relevant to `kind` are populated; cross-kind fields
/// stay `None`. Use [`DeviceRecord::bluetooth`] / [`DeviceRecord::lan`]
/// rather than building the struct by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub kind: DeviceKind,
    pub name: Option<String>,
    /// Bluetooth peripheral identifier (bluetooth kind only).
    pub radio_id: Option<String>,
    /// Signal strength in dBm (bluetooth kind only).
    pub rssi: Option<i64>,
    /// Free-text connection status (bluetooth kind only).
    pub status: Option<String>,
    /// IPv4 address (lan kind only).
    pub ip_address: Option<String>,
    /// Hardware address (lan kind only).
    pub mac_address: Option<String>,
    /// Set once at creation, immutable afterwards.
    pub discovered_at: DateTime<Utc>,
}

impl DeviceRecord {
    pub fn bluetooth(
        radio_id: impl Into<String>,
        name: Option<String>,
        rssi: Option<i64>,
        status: Option<String>,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeviceId::new(),
            kind: DeviceKind::Bluetooth,
            name,
            radio_id: Some(radio_id.into()),
            rssi,
            status,
            ip_address: None,
            mac_address: None,
            discovered_at,
        }
    }

    pub fn lan(
        ip_address: impl Into<String>,
        mac_address: Option<String>,
        name: Option<String>,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeviceId::new(),
            kind: DeviceKind::Lan,
            name,
            radio_id: None,
            rssi: None,
            status: None,
            ip_address: Some(ip_address.into()),
            mac_address,
            discovered_at,
        }
    }

    /// Deduplication key for this record.
    ///
    /// `None` only for malformed records missing their kind's identity
    /// field (which the constructors make impossible).
    pub fn identity(&self) -> Option<DeviceIdentity> {
        match self.kind {
            DeviceKind::Bluetooth => self.radio_id.clone().map(DeviceIdentity::Radio),
            DeviceKind::Lan => self.ip_address.clone().map(|ip| DeviceIdentity::Network {
                ip,
                mac: self.mac_address.clone(),
            }),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// One bounded scan run. Active while `ended_at` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn started(started_at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            started_at,
            ended_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Elapsed time; for an active session, measured up to `now`.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.ended_at.unwrap_or(now) - self.started_at
    }
}

/// A session together with its member devices, in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session: SessionRecord,
    pub devices: Vec<DeviceRecord>,
}

impl SessionSnapshot {
    pub fn member_count(&self) -> usize {
        self.devices.len()
    }
}

// ============================================================================
// Query vocabulary
// ============================================================================

/// Kind filter for device queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceTypeFilter {
    #[default]
    All,
    Bluetooth,
    Lan,
}

impl DeviceTypeFilter {
    pub fn matches(&self, kind: DeviceKind) -> bool {
        match self {
            Self::All => true,
            Self::Bluetooth => kind == DeviceKind::Bluetooth,
            Self::Lan => kind == DeviceKind::Lan,
        }
    }
}

impl FromStr for DeviceTypeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "bluetooth" => Ok(Self::Bluetooth),
            "lan" => Ok(Self::Lan),
            _ => Err(format!(
                "Invalid device filter: '{}'. Expected: all, bluetooth, or lan",
                s
            )),
        }
    }
}

/// Time-window predicate over a session's `started_at` (or a device's
/// `discovered_at`). Relative windows are anchored to the `now` the caller
/// passes in, so evaluation stays deterministic for a fixed `now`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeWindow {
    LastHour,
    /// Since UTC midnight of `now`.
    Today,
    LastWeek,
    #[default]
    All,
    /// Inclusive on both ends.
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl TimeWindow {
    /// Lower/upper inclusive bounds for this window at `now`.
    pub fn bounds(&self, now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        match self {
            Self::LastHour => (Some(now - Duration::hours(1)), None),
            Self::Today => {
                let midnight = now
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is a valid time")
                    .and_utc();
                (Some(midnight), None)
            }
            Self::LastWeek => (Some(now - Duration::days(7)), None),
            Self::All => (None, None),
            Self::Range { start, end } => (Some(*start), Some(*end)),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let (start, end) = self.bounds(now);
        start.map_or(true, |s| at >= s) && end.map_or(true, |e| at <= e)
    }
}

/// Sort direction for time-ordered results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn is_ascending(&self) -> bool {
        matches!(self, Self::Ascending)
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            _ => Err(format!(
                "Invalid sort order: '{}'. Expected: asc or desc",
                s
            )),
        }
    }
}
