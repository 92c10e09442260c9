//! The canned phase scripts.

use std::fmt;
use std::str::FromStr;

use netsim_core::SimulationError;
use serde::{Deserialize, Serialize};

/// A named phase script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Startup and discovery.
    Day1,
    /// Operations: link failure, recovery, configuration change.
    Day2,
}

/// One step of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Power devices on by type, staggered.
    DeviceStartup,
    /// Every device runs ARP discovery.
    NeighborDiscovery,
    /// Routers send hello, wait, then update their routing tables.
    RoutingConvergence,
    /// Every device is marked operational; settle.
    Stabilization,
    /// Settle.
    NormalOperation,
    /// A random link fails.
    LinkFailure,
    /// All links come back; routers reconverge.
    Recovery,
    /// A random router changes an interface.
    ConfigurationChange,
}

impl Phase {
    /// Human-readable name, used in `phase_start` events.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::DeviceStartup => "Device Startup",
            Phase::NeighborDiscovery => "ARP/Neighbor Discovery",
            Phase::RoutingConvergence => "Routing Protocol Convergence",
            Phase::Stabilization => "Network Stabilization",
            Phase::NormalOperation => "Normal Operation",
            Phase::LinkFailure => "Link Failure Simulation",
            Phase::Recovery => "Recovery and Reconvergence",
            Phase::ConfigurationChange => "Configuration Change",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Scenario {
    /// Scenario name as accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Day1 => "day1",
            Scenario::Day2 => "day2",
        }
    }

    /// Phases in execution order. Day 2 starts from a stabilized network.
    pub fn phases(&self) -> &'static [Phase] {
        match self {
            Scenario::Day1 => &[
                Phase::DeviceStartup,
                Phase::NeighborDiscovery,
                Phase::RoutingConvergence,
                Phase::Stabilization,
            ],
            Scenario::Day2 => &[
                Phase::Stabilization,
                Phase::NormalOperation,
                Phase::LinkFailure,
                Phase::Recovery,
                Phase::ConfigurationChange,
            ],
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day1" => Ok(Scenario::Day1),
            "day2" => Ok(Scenario::Day2),
            _ => Err(SimulationError::UnknownScenario(s.to_string())),
        }
    }
}
