//! History filtering: pure, deterministic session/device filtering.
//!
//! No storage access and no side effects; presentation layers hand in a
//! snapshot and get a derived view back. The same inputs (including `now`)
//! always produce the same output.

use chrono::{DateTime, Utc};
use nscan_protocol::{DeviceRecord, SessionSnapshot, SortOrder, TimeWindow};

/// Filter and sort a session list.
///
/// Applies the time window to `started_at`, then (for a non-empty query)
/// keeps only member devices whose name, IP, or MAC contains the query
/// case-insensitively and drops sessions with no matching members left,
/// and finally sorts by `started_at` per `sort`. An empty or whitespace
/// query leaves every session untouched.
pub fn filter_sessions(
    sessions: &[SessionSnapshot],
    window: TimeWindow,
    query: &str,
    sort: SortOrder,
    now: DateTime<Utc>,
) -> Vec<SessionSnapshot> {
    let query = query.trim().to_lowercase();

    let mut result: Vec<SessionSnapshot> = sessions
        .iter()
        .filter(|snapshot| window.contains(snapshot.session.started_at, now))
        .filter_map(|snapshot| {
            if query.is_empty() {
                return Some(snapshot.clone());
            }
            let devices: Vec<DeviceRecord> = snapshot
                .devices
                .iter()
                .filter(|device| device_matches(device, &query))
                .cloned()
                .collect();
            if devices.is_empty() {
                return None;
            }
            Some(SessionSnapshot {
                session: snapshot.session.clone(),
                devices,
            })
        })
        .collect();

    result.sort_by(|a, b| {
        let ord = a.session.started_at.cmp(&b.session.started_at);
        if sort.is_ascending() {
            ord
        } else {
            ord.reverse()
        }
    });
    result
}

/// Devices whose name, IP, or MAC contains the query, case-insensitively.
/// An empty query matches everything.
pub fn search_devices<'a>(devices: &'a [DeviceRecord], query: &str) -> Vec<&'a DeviceRecord> {
    let query = query.trim().to_lowercase();
    devices
        .iter()
        .filter(|device| query.is_empty() || device_matches(device, &query))
        .collect()
}

fn device_matches(device: &DeviceRecord, query_lower: &str) -> bool {
    let field_matches =
        |field: &Option<String>| field.as_deref().is_some_and(|v| v.to_lowercase().contains(query_lower));
    field_matches(&device.name)
        || field_matches(&device.ip_address)
        || field_matches(&device.mac_address)
}
