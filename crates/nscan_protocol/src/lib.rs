//! Shared data model for NScan.
//!
//! Every crate in the workspace speaks these types: device and session
//! records as the Device Store persists them, the filter/sort vocabulary
//! used by queries and the history engine, and the event contract the
//! two scan drivers push into the aggregator.

pub mod events;
pub mod ids;
pub mod types;

pub use events::{Discovery, DriverEvent, DriverKind, TaggedEvent};
pub use ids::{DeviceId, IdParseError, SessionId};
pub use types::{
    DeviceIdentity, DeviceKind, DeviceRecord, DeviceTypeFilter, SessionRecord, SessionSnapshot,
    SortOrder, TimeWindow,
};
