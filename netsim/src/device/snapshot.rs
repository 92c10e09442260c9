//! Read-only views of a device's state.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use netsim_core::{DeviceType, MacAddress};
use serde::{Serialize, Serializer};

use super::state::OperationalState;

/// Per-device counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatistics {
    /// Messages handed to the registry, one per destination.
    pub sent: u64,
    /// Messages handled.
    pub received: u64,
    /// Hello messages sent.
    pub hello_sent: u64,
    /// ARP requests sent.
    pub arp_requests_sent: u64,
    /// Runs of the routing table update.
    pub routing_updates: u64,
    /// Ping replies received.
    pub ping_replies_received: u64,
    /// Link-state updates accepted into the database.
    pub link_state_updates: u64,
    /// Messages drained while unpowered or failed.
    pub discarded: u64,
    /// Seconds since the last power on, zero while down.
    pub uptime_seconds: f64,
}

/// Next hop of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextHop {
    /// The network is attached to this device.
    DirectlyConnected,
    /// Reach the network through this neighbor.
    Via(String),
}

impl NextHop {
    /// Whether the route goes through `neighbor`.
    pub fn is_via(&self, neighbor: &str) -> bool {
        matches!(self, NextHop::Via(n) if n == neighbor)
    }
}

impl fmt::Display for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextHop::DirectlyConnected => f.write_str("directly_connected"),
            NextHop::Via(neighbor) => f.write_str(neighbor),
        }
    }
}

impl Serialize for NextHop {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Adjacency learned from a hello.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborEntry {
    /// Router id announced by the neighbor.
    pub router_id: Ipv4Addr,
    /// Protocol of the hello.
    pub protocol: String,
    /// Process or AS number.
    pub process_id: Option<String>,
    /// Area of the hello.
    pub area: String,
    /// Seconds since the device was spawned when the last hello arrived.
    pub last_seen: f64,
}

/// Full state of a device at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    /// Device name.
    pub name: String,
    /// Device kind.
    pub device_type: DeviceType,
    /// Operational state.
    pub state: OperationalState,
    /// Interface name to up/down.
    pub interfaces: BTreeMap<String, bool>,
    /// Destination network to next hop.
    pub routing_table: BTreeMap<String, NextHop>,
    /// Resolved addresses.
    pub arp_table: BTreeMap<Ipv4Addr, MacAddress>,
    /// Hello adjacencies by neighbor device.
    pub neighbors: BTreeMap<String, NeighborEntry>,
    /// Highest link-state sequence accepted per originating router id.
    pub link_state: BTreeMap<Ipv4Addr, u64>,
    /// Counters.
    pub statistics: DeviceStatistics,
}

impl DeviceSnapshot {
    /// Whether the device is operational.
    pub fn is_operational(&self) -> bool {
        self.state.is_operational()
    }

    /// Number of interfaces that are up.
    pub fn interfaces_up(&self) -> usize {
        self.interfaces.values().filter(|up| **up).count()
    }
}
