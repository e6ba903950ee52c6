//! NScan: discovery aggregation and session persistence engine.
//!
//! Two external scan drivers (short-range radio advertisement and
//! local-network probing) push discovery events at their own pace; this
//! crate merges them into one deduplicated live view, binds that view to a
//! scan session, persists devices and membership durably, and re-publishes
//! stored state as live collections.
//!
//! Layering, bottom up:
//! - [`driver`]: the contract the two external drivers implement.
//! - [`session`]: the Idle/Active session state machine.
//! - [`aggregator`]: one task per run merging both streams.
//! - [`live`]: store snapshots re-published on every mutation.
//! - [`history`]: pure filtering/sorting/search over snapshots.
//! - [`service`]: the facade frontends talk to.

pub mod aggregator;
pub mod driver;
pub mod error;
pub mod history;
pub mod live;
pub mod service;
pub mod session;

pub use aggregator::{DiscoveryAggregator, ScanConfig, ScanHandle};
pub use driver::{ScanDriver, ScriptedDriver};
pub use error::{EngineError, Result};
pub use history::{filter_sessions, search_devices};
pub use live::{LiveQuery, LiveQueryService};
pub use service::{ScanService, Statistics};
pub use session::SessionManager;

// Re-export the data model so frontends depend on one crate.
pub use nscan_db::{DbError, DeviceStore};
pub use nscan_protocol::{
    DeviceId, DeviceIdentity, DeviceKind, DeviceRecord, DeviceTypeFilter, Discovery, DriverEvent,
    DriverKind, SessionId, SessionRecord, SessionSnapshot, SortOrder, TaggedEvent, TimeWindow,
};
