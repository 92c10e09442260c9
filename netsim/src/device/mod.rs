//! Simulated devices.
//!
//! One [`DeviceHandle`] per device drives an actor task that owns the
//! device's operational state, interfaces, ARP table, routing table,
//! hello adjacencies and counters.

mod actor;
mod config;
mod error;
mod handle;
mod snapshot;
mod state;

pub use config::DeviceConfig;
pub use error::{DeviceError, DeviceResult};
pub use handle::DeviceHandle;
pub use snapshot::{DeviceSnapshot, DeviceStatistics, NeighborEntry, NextHop};
pub use state::OperationalState;
