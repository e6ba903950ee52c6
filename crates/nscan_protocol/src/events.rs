//! Event contract between the two scan drivers and the aggregator.
//!
//! Both drivers push into one shared channel; every event is tagged with
//! the driver that produced it. No delivery order is guaranteed between
//! the two drivers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DeviceIdentity, DeviceRecord};

/// Which physical driver produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Short-range radio advertisement scanner.
    Radio,
    /// Local-network prober.
    Network,
}

/// Payload of a single discovery event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum Discovery {
    Radio {
        identifier: String,
        name: Option<String>,
        rssi: Option<i64>,
        status: Option<String>,
    },
    Network {
        ip: String,
        mac: Option<String>,
        name: Option<String>,
    },
}

impl Discovery {
    /// Deduplication key for this discovery.
    pub fn identity(&self) -> DeviceIdentity {
        match self {
            Self::Radio { identifier, .. } => DeviceIdentity::Radio(identifier.clone()),
            Self::Network { ip, mac, .. } => DeviceIdentity::Network {
                ip: ip.clone(),
                mac: mac.clone(),
            },
        }
    }

    /// Materialize a device record, stamped with its discovery time.
    pub fn into_record(self, discovered_at: DateTime<Utc>) -> DeviceRecord {
        match self {
            Self::Radio {
                identifier,
                name,
                rssi,
                status,
            } => DeviceRecord::bluetooth(identifier, name, rssi, status, discovered_at),
            Self::Network { ip, mac, name } => DeviceRecord::lan(ip, mac, name, discovered_at),
        }
    }
}

/// Everything a scan driver can report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriverEvent {
    /// The driver's scanning-active flag changed.
    ScanningChanged(bool),
    /// A device was discovered (duplicates allowed; the aggregator dedups).
    Discovered(Discovery),
    /// Scan progress, 0.0..=1.0. Only the network driver reports this.
    Progress(f64),
    /// Driver-level failure. Does not imply the driver stopped.
    Error(String),
}

/// A driver event tagged with its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedEvent {
    pub driver: DriverKind,
    pub event: DriverEvent,
}

impl TaggedEvent {
    pub fn new(driver: DriverKind, event: DriverEvent) -> Self {
        Self { driver, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceKind;

    #[test]
    fn radio_discovery_becomes_bluetooth_record() {
        let d = Discovery::Radio {
            identifier: "periph-1".into(),
            name: Some("Keyboard".into()),
            rssi: Some(-55),
            status: None,
        };
        let record = d.clone().into_record(Utc::now());
        assert_eq!(record.kind, DeviceKind::Bluetooth);
        assert_eq!(record.identity(), Some(d.identity()));
    }

    #[test]
    fn network_identity_distinguishes_mac() {
        let with_mac = Discovery::Network {
            ip: "10.0.0.2".into(),
            mac: Some("aa:bb".into()),
            name: None,
        };
        let without_mac = Discovery::Network {
            ip: "10.0.0.2".into(),
            mac: None,
            name: None,
        };
        assert_ne!(with_mac.identity(), without_mac.identity());
    }
}
