//! # netsim
//!
//! Behavioral simulation of a discovered network.
//!
//! A finished device list and link list go in; a result record with the
//! event log, statistics and final device state comes out. In between, every
//! device runs as its own actor task and talks to its neighbors through a
//! simulated network with latency, loss and congestion.
//!
//! ## Core Components
//!
//! - [`ConnectionRegistry`]: the link table, per-device bounded inbound
//!   queues and the delivery dispatcher
//! - [`DeviceHandle`]: one device actor with its state machine, ARP table,
//!   routing table, hello adjacencies and counters
//! - [`Simulation`]: wires a [`Topology`](netsim_core::Topology) into actors,
//!   runs the `day1`/`day2` phase scripts and injects faults
//! - [`NetworkSimulator`]: start, run, collect and tear down in one call
//!
//! ## Quick Start
//!
//! ```ignore
//! use netsim::{NetworkSimulator, SimulationConfig};
//! use netsim_core::Topology;
//!
//! let topology = Topology::from_json_file("topology.json")?;
//! let report = NetworkSimulator::new(SimulationConfig::default())
//!     .run(&topology, "day1")
//!     .await?;
//! println!("{report}");
//! ```
//!
//! ## Determinism
//!
//! Every random choice (the link that fails, the router that changes, the
//! packets that are lost) comes from a [`SimRng`] seeded by
//! [`SimulationConfig::seed`]. Timing uses `tokio::time`, so tests run on a
//! paused clock.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// Re-export core types
pub use netsim_core::{
    DeviceDescriptor, DeviceType, InterfaceConfig, LinkDescriptor, Message, MessageKind, Payload,
    RoutingProtocolConfig, SimulationError, SimulationResult, Topology,
};

/// Device actors.
pub mod device;

/// Simulated links and delivery.
pub mod network;

/// Seeded randomness.
pub mod rng;

/// Scenario orchestration, faults and reports.
pub mod runner;

pub use device::{
    DeviceConfig, DeviceError, DeviceHandle, DeviceResult, DeviceSnapshot, DeviceStatistics,
    NeighborEntry, NextHop, OperationalState,
};
pub use network::{
    BroadcastOutcome, Connection, ConnectionOptions, ConnectionRegistry, InboxReceiver,
    LinkProperties, RegistryConfig, RegistryStatistics,
};
pub use rng::SimRng;
pub use runner::{
    DeviceState, EventKind, Fault, FaultContext, FaultInjector, LinkCongestion, NetworkSimulator,
    Phase, RandomConfigChange, RandomLinkFailure, Scenario, Simulation, SimulationConfig,
    SimulationEvent, SimulationReport, SimulationStatistics,
};
