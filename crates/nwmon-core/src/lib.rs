//! nwmon-core: Shared types for the nwmon network monitor.
//!
//! This crate provides the foundational types used across all nwmon components:
//! - `DeviceRecord`, the per-device state tracked by a monitor instance
//! - Domain events raised on online/offline transitions
//! - The read-only snapshot handed to presentation layers
//! - Device identifier parsing and MAC canonicalisation

pub mod events;
pub mod query;
pub mod types;
pub mod view;

pub use events::{DeviceEvent, MonitorEvent};
pub use query::DeviceQuery;
pub use types::DeviceRecord;
pub use view::{DeviceView, Snapshot};
