//! nwmon-monitor: Host discovery and reachability monitoring.
//!
//! Each configured instance probes its address ranges on two cadences: a
//! full scan that discovers and enriches hosts, and a cheap quick check of
//! known devices. Results flow through a per-instance device registry that
//! applies failure hysteresis, migrates IP-keyed devices to their MAC, and
//! emits online/offline events. A dispatcher routes operator commands to
//! whichever instance owns a device.

pub mod commands;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod enrich;
pub mod error;
pub mod probe;
pub mod range;
pub mod registry;
pub mod scanner;
pub mod scheduler;
