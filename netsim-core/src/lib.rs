//! # netsim-core
//!
//! Core types shared by the netsim simulation engine.
//!
//! This crate has no runtime. It describes what the simulation consumes and
//! what simulated devices exchange:
//!
//! - **Topology descriptors**: [`DeviceDescriptor`], [`InterfaceConfig`],
//!   [`RoutingProtocolConfig`], [`LinkDescriptor`] and [`Topology`], the
//!   finished device and link lists handed over by the configuration parser
//!   and link discovery stages.
//! - **Messages**: [`Message`] and its tagged [`Payload`] union (ARP, hello,
//!   routing updates, ping, link-state updates).
//! - **Addressing helpers**: [`Ipv4Network`], [`MacAddress`] and the stable
//!   [`fnv1a`] hash used to derive simulated identities.
//! - **Errors**: [`SimulationError`] and the [`SimulationResult`] alias.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod addr;
mod error;
mod message;
mod types;

// Addressing exports
pub use addr::{Ipv4Network, MacAddress, NetworkParseError, fnv1a, gateway_for};

// Error exports
pub use error::{SimulationError, SimulationResult};

// Message exports
pub use message::{Message, MessageKind, Payload};

// Topology exports
pub use types::{
    DeviceDescriptor, DeviceType, InterfaceConfig, LinkDescriptor, RoutingProtocolConfig,
    Topology,
};
