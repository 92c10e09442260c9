//! Simulated links between devices.
//!
//! The [`ConnectionRegistry`] owns every link and every device's inbound
//! queue. Devices only reach each other through it.

pub mod config;
mod connection;
mod registry;
mod stats;

pub use config::{
    CONGESTION_LATENCY_FACTOR, CONGESTION_LOSS_PER_LEVEL, ConnectionOptions, DEFAULT_LATENCY,
    DEFAULT_PACKET_LOSS, LinkProperties, MAX_CONGESTION_LOSS, RegistryConfig, congestion_profile,
};
pub use connection::Connection;
pub use registry::{BroadcastOutcome, ConnectionRegistry, InboxReceiver};
pub use stats::RegistryStatistics;
