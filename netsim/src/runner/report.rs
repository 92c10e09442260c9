//! Simulation events and the result record.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tokio::time::Instant;

use crate::device::{DeviceSnapshot, DeviceStatistics, OperationalState};
use crate::network::RegistryStatistics;

/// Kind of a [`SimulationEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Devices and links are wired.
    SimulationStarted,
    /// A scenario phase begins.
    PhaseStart,
    /// A device is powered on.
    DeviceStartup,
    /// A device runs ARP discovery.
    ArpDiscovery,
    /// A router sends hello.
    Hello,
    /// A router updates its routing table.
    RoutingTableUpdate,
    /// The network is stabilized.
    NetworkStable,
    /// A link failed.
    LinkFailure,
    /// Recovery begins.
    RecoveryStart,
    /// Recovery ended.
    RecoveryComplete,
    /// A router's interface configuration changed.
    ConfigChange,
    /// A fault was injected on request.
    FaultInjection,
    /// All devices paused.
    SimulationPaused,
    /// All devices resumed.
    SimulationResumed,
    /// The phase script ran out of time.
    SimulationTimeout,
}

impl EventKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SimulationStarted => "simulation_started",
            EventKind::PhaseStart => "phase_start",
            EventKind::DeviceStartup => "device_startup",
            EventKind::ArpDiscovery => "arp_discovery",
            EventKind::Hello => "hello",
            EventKind::RoutingTableUpdate => "routing_table_update",
            EventKind::NetworkStable => "network_stable",
            EventKind::LinkFailure => "link_failure",
            EventKind::RecoveryStart => "recovery_start",
            EventKind::RecoveryComplete => "recovery_complete",
            EventKind::ConfigChange => "config_change",
            EventKind::FaultInjection => "fault_injection",
            EventKind::SimulationPaused => "simulation_paused",
            EventKind::SimulationResumed => "simulation_resumed",
            EventKind::SimulationTimeout => "simulation_timeout",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationEvent {
    /// Seconds since the simulation started.
    pub timestamp: f64,
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Human-readable description.
    pub message: String,
    /// Device the event is about.
    pub device: Option<String>,
}

/// Append-only event log, ordered by emission.
#[derive(Debug)]
pub struct EventLog {
    started: Instant,
    events: Vec<SimulationEvent>,
}

impl EventLog {
    /// Empty log whose timestamps count from `started`.
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            events: Vec::new(),
        }
    }

    /// Append an event.
    pub fn record(&mut self, kind: EventKind, message: impl Into<String>, device: Option<&str>) {
        let event = SimulationEvent {
            timestamp: self.started.elapsed().as_secs_f64(),
            kind,
            message: message.into(),
            device: device.map(str::to_string),
        };
        tracing::debug!(kind = %event.kind, device = ?event.device, "{}", event.message);
        self.events.push(event);
    }

    /// Events so far.
    pub fn events(&self) -> &[SimulationEvent] {
        &self.events
    }

    /// Number of events of `kind`.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Move the events out, leaving the log empty.
    pub fn take(&mut self) -> Vec<SimulationEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Final state of one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    /// Operational state.
    pub state: OperationalState,
    /// Whether the device ended operational.
    pub operational: bool,
    /// Interface name to up/down.
    pub interfaces: BTreeMap<String, bool>,
    /// Routes in the routing table.
    pub routing_table_size: usize,
    /// Entries in the ARP table.
    pub arp_table_size: usize,
    /// Hello adjacencies.
    pub neighbor_count: usize,
}

impl From<&DeviceSnapshot> for DeviceState {
    fn from(snapshot: &DeviceSnapshot) -> Self {
        Self {
            state: snapshot.state,
            operational: snapshot.is_operational(),
            interfaces: snapshot.interfaces.clone(),
            routing_table_size: snapshot.routing_table.len(),
            arp_table_size: snapshot.arp_table.len(),
            neighbor_count: snapshot.neighbors.len(),
        }
    }
}

/// Aggregated statistics of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStatistics {
    /// Events logged.
    pub total_events: usize,
    /// Devices in the topology.
    pub devices_simulated: usize,
    /// Events per kind.
    pub event_counts: BTreeMap<EventKind, usize>,
    /// Counters per device.
    pub device_statistics: BTreeMap<String, DeviceStatistics>,
    /// Registry counters at the end of the run.
    pub network: RegistryStatistics,
}

/// Result record of one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    /// Scenario name.
    pub scenario: String,
    /// Seed of the run's random choices.
    pub seed: u64,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
    /// Event log in emission order.
    pub events: Vec<SimulationEvent>,
    /// Aggregated statistics.
    pub statistics: SimulationStatistics,
    /// Final state per device.
    pub device_states: BTreeMap<String, DeviceState>,
}

impl SimulationReport {
    /// Devices that ended operational.
    pub fn operational_devices(&self) -> usize {
        self.device_states.values().filter(|s| s.operational).count()
    }

    /// Events of `kind`, in order.
    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &SimulationEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(
            f,
            "Simulation Results - {}",
            self.scenario.to_ascii_uppercase()
        )?;
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "Duration: {:.2} seconds", self.duration_seconds)?;
        writeln!(f, "Total Events: {}", self.statistics.total_events)?;
        writeln!(f, "Devices Simulated: {}", self.statistics.devices_simulated)?;
        writeln!(f, "Seed: {}", self.seed)?;

        writeln!(f)?;
        writeln!(f, "Event Summary:")?;
        for (kind, count) in &self.statistics.event_counts {
            writeln!(f, "  {kind}: {count}")?;
        }

        writeln!(f)?;
        writeln!(
            f,
            "Operational Devices: {}/{}",
            self.operational_devices(),
            self.device_states.len()
        )?;

        let network = &self.statistics.network;
        writeln!(
            f,
            "Messages: {} sent, {} delivered, {} dropped",
            network.sent, network.delivered, network.dropped
        )?;

        if !self.events.is_empty() {
            writeln!(f)?;
            writeln!(f, "Recent Events:")?;
            let skip = self.events.len().saturating_sub(5);
            for event in &self.events[skip..] {
                let device = event.device.as_deref().unwrap_or("");
                writeln!(
                    f,
                    "  [{:8.2}s] {} {}",
                    event.timestamp, event.message, device
                )?;
            }
        }
        Ok(())
    }
}
