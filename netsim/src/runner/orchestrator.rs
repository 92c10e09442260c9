//! Scenario orchestration.
//!
//! [`Simulation`] turns a topology snapshot into a registry and one actor per
//! device, runs phase scripts and faults against them, and tears everything
//! down in [`Simulation::finish`]. [`NetworkSimulator`] wraps that lifecycle
//! into a single call that always ends with a teardown.

use std::collections::{BTreeMap, HashMap};

use futures::future::join_all;
use netsim_core::{SimulationError, SimulationResult, Topology};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::config::SimulationConfig;
use super::fault_injector::{
    Fault, FaultContext, FaultInjector, RandomConfigChange, RandomLinkFailure,
};
use super::report::{
    DeviceState, EventKind, EventLog, SimulationEvent, SimulationReport, SimulationStatistics,
};
use super::scenario::{Phase, Scenario};
use super::topology::{connection_options, hello_routers, routers, startup_order};
use crate::device::{DeviceError, DeviceHandle, DeviceSnapshot, OperationalState};
use crate::network::ConnectionRegistry;
use crate::rng::SimRng;

/// A live simulation: registry, device actors, event log and seeded randomness.
///
/// Dropping a `Simulation` without calling [`finish`](Self::finish) still
/// signals every actor to stop.
pub struct Simulation {
    topology: Topology,
    config: SimulationConfig,
    registry: ConnectionRegistry,
    devices: Vec<DeviceHandle>,
    events: EventLog,
    rng: SimRng,
    shutdown: CancellationToken,
    started: Instant,
}

impl Simulation {
    /// Validate `topology` and `config`, wire the links and start one actor per device.
    ///
    /// Configuration problems are reported here, before any actor runs.
    #[tracing::instrument(skip_all, fields(devices = topology.devices.len(), links = topology.links.len()))]
    pub async fn start(topology: &Topology, config: SimulationConfig) -> SimulationResult<Self> {
        config.validate()?;
        topology.validate()?;

        let started = Instant::now();
        let mut rng = SimRng::from_optional_seed(config.seed);
        let registry = ConnectionRegistry::new(config.registry_config(), rng.fork());

        for device in &topology.devices {
            registry.register_device(&device.name);
        }
        for link in &topology.links {
            if let Err(err) = registry.create_connection(
                &link.source_device,
                &link.target_device,
                &link.source_interface,
                &link.target_interface,
                connection_options(link, config.base_latency),
            ) {
                registry.shutdown().await;
                return Err(err);
            }
        }

        let shutdown = CancellationToken::new();
        let mut devices = Vec::with_capacity(topology.devices.len());
        for descriptor in &topology.devices {
            match DeviceHandle::spawn(
                descriptor.clone(),
                registry.clone(),
                config.device_config(),
                shutdown.child_token(),
            ) {
                Ok(handle) => devices.push(handle),
                Err(err) => {
                    shutdown.cancel();
                    registry.shutdown().await;
                    return Err(SimulationError::InvalidTopology(err.to_string()));
                }
            }
        }

        let mut events = EventLog::new(started);
        events.record(
            EventKind::SimulationStarted,
            format!(
                "Simulation started with {} devices and {} links",
                topology.devices.len(),
                topology.links.len()
            ),
            None,
        );
        tracing::info!(seed = rng.seed(), "simulation started");

        Ok(Self {
            topology: topology.clone(),
            config,
            registry,
            devices,
            events,
            rng,
            shutdown,
            started,
        })
    }

    /// Seed of this run's random choices.
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// The topology being simulated.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// The live registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Events logged so far.
    pub fn events(&self) -> &[SimulationEvent] {
        self.events.events()
    }

    /// Every device, in topology order.
    pub fn devices(&self) -> &[DeviceHandle] {
        &self.devices
    }

    /// Look up a device.
    pub fn device(&self, name: &str) -> Option<&DeviceHandle> {
        self.devices.iter().find(|d| d.name() == name)
    }

    fn fault_context(&mut self) -> FaultContext<'_> {
        FaultContext::new(
            &self.registry,
            &self.devices,
            &mut self.events,
            &mut self.rng,
        )
    }

    /// Run the phase script of `scenario`, bounded by the configured maximum
    /// simulation time. On expiry the remaining phases are abandoned and a
    /// `simulation_timeout` event is logged.
    #[tracing::instrument(skip_all, fields(scenario = %scenario))]
    pub async fn run_scenario(&mut self, scenario: Scenario) {
        let limit = self.config.max_simulation_time;
        if tokio::time::timeout(limit, self.run_phases(scenario))
            .await
            .is_err()
        {
            tracing::warn!(limit_ms = limit.as_millis() as u64, "scenario timed out");
            self.events.record(
                EventKind::SimulationTimeout,
                format!(
                    "Scenario {scenario} exceeded {:.1}s",
                    limit.as_secs_f64()
                ),
                None,
            );
        }
    }

    async fn run_phases(&mut self, scenario: Scenario) {
        for (index, phase) in scenario.phases().iter().enumerate() {
            self.events.record(
                EventKind::PhaseStart,
                format!("Phase {}: {}", index + 1, phase.label()),
                None,
            );
            tracing::debug!("Running phase {}: {}", index + 1, phase);
            self.run_phase(*phase).await;
        }
    }

    async fn run_phase(&mut self, phase: Phase) {
        match phase {
            Phase::DeviceStartup => self.device_startup().await,
            Phase::NeighborDiscovery => self.neighbor_discovery().await,
            Phase::RoutingConvergence => self.routing_convergence().await,
            Phase::Stabilization => self.stabilize().await,
            Phase::NormalOperation => tokio::time::sleep(self.config.normal_operation).await,
            Phase::LinkFailure => {
                self.run_builtin(&mut RandomLinkFailure).await;
                tokio::time::sleep(self.config.link_failure_wait).await;
            }
            Phase::Recovery => self.recover().await,
            Phase::ConfigurationChange => {
                self.run_builtin(&mut RandomConfigChange).await;
                tokio::time::sleep(self.config.config_change_wait).await;
            }
        }
    }

    async fn device_startup(&mut self) {
        let order: Vec<(String, String)> = startup_order(&self.topology)
            .into_iter()
            .map(|d| (d.name.clone(), d.device_type.to_string()))
            .collect();

        for (name, device_type) in order {
            self.events.record(
                EventKind::DeviceStartup,
                format!("Starting {device_type} {name}"),
                Some(&name),
            );
            if let Some(device) = self.device(&name) {
                match device.power_on().await {
                    Ok(OperationalState::Operational) => {}
                    Ok(state) => tracing::warn!(device = %name, %state, "device did not boot"),
                    Err(err) => tracing::warn!(device = %name, error = %err, "power on failed"),
                }
            }
            tokio::time::sleep(self.config.startup_stagger).await;
        }
    }

    async fn neighbor_discovery(&mut self) {
        let names: Vec<String> = self.devices.iter().map(|d| d.name().to_string()).collect();
        for name in names {
            self.events.record(
                EventKind::ArpDiscovery,
                format!("ARP discovery on {name}"),
                Some(&name),
            );
            if let Some(device) = self.device(&name) {
                log_device_error(&name, device.perform_arp_discovery().await);
            }
            tokio::time::sleep(self.config.arp_stagger).await;
        }
    }

    async fn routing_convergence(&mut self) {
        let speakers: Vec<String> = hello_routers(&self.topology)
            .into_iter()
            .map(|d| d.name.clone())
            .collect();
        let updaters: Vec<String> = routers(&self.topology)
            .into_iter()
            .map(|d| d.name.clone())
            .collect();

        for name in &speakers {
            self.events.record(
                EventKind::Hello,
                format!("{name} sending hello packets"),
                Some(name),
            );
            if let Some(device) = self.device(name) {
                log_device_error(name, device.send_hello().await);
            }
        }

        tokio::time::sleep(self.config.convergence_wait).await;

        for name in &updaters {
            self.events.record(
                EventKind::RoutingTableUpdate,
                format!("{name} updating routing table"),
                Some(name),
            );
            if let Some(device) = self.device(name) {
                log_device_error(name, device.update_routing_table().await);
            }
        }
    }

    async fn stabilize(&mut self) {
        for device in &self.devices {
            log_device_error(device.name(), device.mark_operational().await);
        }
        tokio::time::sleep(self.config.stabilization_wait).await;
        self.events
            .record(EventKind::NetworkStable, "Network stabilized", None);
    }

    async fn recover(&mut self) {
        self.events.record(
            EventKind::RecoveryStart,
            "Starting network recovery",
            None,
        );
        self.registry.enable_all();

        for device in &self.devices {
            if device.device_type() == netsim_core::DeviceType::Router {
                log_device_error(device.name(), device.reconverge().await);
            }
        }

        tokio::time::sleep(self.config.recovery_wait).await;
        self.events.record(
            EventKind::RecoveryComplete,
            "Network recovery completed",
            None,
        );
    }

    async fn run_builtin(&mut self, injector: &mut dyn FaultInjector) {
        if let Err(err) = self.run_injector(injector).await {
            tracing::warn!(injector = injector.name(), error = %err, "fault injector failed");
        }
    }

    /// Run a fault strategy against this simulation.
    pub async fn run_injector(&mut self, injector: &mut dyn FaultInjector) -> SimulationResult<()> {
        tracing::debug!("Running fault injector: {}", injector.name());
        let mut ctx = self.fault_context();
        injector.inject(&mut ctx).await
    }

    /// Inject a fault given by kind, target device and parameters.
    ///
    /// Invalid requests fail with [`SimulationError::InvalidFault`] and leave
    /// no trace in the event log.
    pub async fn inject_fault(
        &mut self,
        kind: &str,
        target: &str,
        params: &HashMap<String, String>,
    ) -> SimulationResult<()> {
        let fault = Fault::parse(kind, target, params)?;
        self.apply_fault(fault).await
    }

    /// Inject an already-built fault.
    pub async fn apply_fault(&mut self, fault: Fault) -> SimulationResult<()> {
        self.check_fault(&fault)?;

        let (message, device) = match &fault {
            Fault::LinkFailure { target, neighbor } => (
                format!("Injected link failure between {target} and {neighbor}"),
                Some(target.as_str()),
            ),
            Fault::DeviceFailure { target } => {
                (format!("Injected device failure on {target}"), Some(target.as_str()))
            }
            Fault::InterfaceDown { target, interface } => (
                format!("Injected interface down {interface} on {target}"),
                Some(target.as_str()),
            ),
            Fault::Congestion {
                target,
                neighbor,
                level,
            } => (
                format!("Injected congestion {level:.2} between {target} and {neighbor}"),
                Some(target.as_str()),
            ),
            Fault::ClearCongestion => ("Cleared congestion on all links".to_string(), None),
        };
        self.events
            .record(EventKind::FaultInjection, message, device);

        match fault {
            Fault::LinkFailure { target, neighbor } => {
                self.fault_context().fail_link(&target, &neighbor).await;
            }
            Fault::DeviceFailure { target } => {
                if let Some(device) = self.device(&target) {
                    log_device_error(&target, device.simulate_device_failure().await);
                }
            }
            Fault::InterfaceDown { target, interface } => {
                if let Some(device) = self.device(&target) {
                    log_device_error(&target, device.simulate_interface_down(&interface).await);
                }
            }
            Fault::Congestion {
                target,
                neighbor,
                level,
            } => {
                self.registry.apply_congestion(&target, &neighbor, level);
            }
            Fault::ClearCongestion => self.registry.clear_congestion(),
        }
        Ok(())
    }

    fn check_fault(&self, fault: &Fault) -> SimulationResult<()> {
        if let Some(target) = fault.target() {
            if self.device(target).is_none() {
                return Err(SimulationError::InvalidFault(format!(
                    "unknown target device '{target}'"
                )));
            }
        }
        match fault {
            Fault::LinkFailure { target, neighbor } | Fault::Congestion { target, neighbor, .. } => {
                if self.device(neighbor).is_none() {
                    return Err(SimulationError::InvalidFault(format!(
                        "unknown neighbor device '{neighbor}'"
                    )));
                }
                if self.registry.connection(target, neighbor).is_none() {
                    return Err(SimulationError::InvalidFault(format!(
                        "no link between '{target}' and '{neighbor}'"
                    )));
                }
            }
            Fault::InterfaceDown { target, interface } => {
                let declared = self
                    .topology
                    .device(target)
                    .is_some_and(|d| d.interface(interface).is_some());
                if !declared {
                    return Err(SimulationError::InvalidFault(format!(
                        "device '{target}' has no interface '{interface}'"
                    )));
                }
            }
            Fault::DeviceFailure { .. } | Fault::ClearCongestion => {}
        }
        Ok(())
    }

    /// Pause every operational device. Queued messages are kept.
    pub async fn pause(&mut self) -> usize {
        let mut paused = 0;
        for device in &self.devices {
            match device.pause().await {
                Ok(()) => paused += 1,
                Err(DeviceError::InvalidState { .. }) => {}
                Err(err) => tracing::warn!(device = device.name(), error = %err, "pause failed"),
            }
        }
        self.events.record(
            EventKind::SimulationPaused,
            format!("Simulation paused ({paused} devices)"),
            None,
        );
        paused
    }

    /// Resume every paused device.
    pub async fn resume(&mut self) -> usize {
        let mut resumed = 0;
        for device in &self.devices {
            match device.resume().await {
                Ok(()) => resumed += 1,
                Err(DeviceError::InvalidState { .. }) => {}
                Err(err) => tracing::warn!(device = device.name(), error = %err, "resume failed"),
            }
        }
        self.events.record(
            EventKind::SimulationResumed,
            format!("Simulation resumed ({resumed} devices)"),
            None,
        );
        resumed
    }

    /// Make `from` send a ping to `to`. Returns whether the registry accepted it.
    pub async fn ping(&self, from: &str, to: &str) -> SimulationResult<bool> {
        let source = self
            .device(from)
            .ok_or_else(|| SimulationError::UnknownDevice(from.to_string()))?;
        if self.device(to).is_none() {
            return Err(SimulationError::UnknownDevice(to.to_string()));
        }
        match source.ping(to).await {
            Ok(accepted) => Ok(accepted > 0),
            Err(err) => {
                tracing::debug!(from, to, error = %err, "ping not sent");
                Ok(false)
            }
        }
    }

    /// Current state of one device. `None` if the device is unknown.
    pub async fn snapshot(&self, name: &str) -> Option<DeviceSnapshot> {
        self.device(name)?.snapshot().await.ok()
    }

    /// Current state of every device, in topology order.
    pub async fn snapshots(&self) -> Vec<DeviceSnapshot> {
        let mut snapshots = Vec::with_capacity(self.devices.len());
        for device in &self.devices {
            match device.snapshot().await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => tracing::warn!(device = device.name(), error = %err, "no snapshot"),
            }
        }
        snapshots
    }

    /// Collect the result and tear everything down.
    ///
    /// Actors are stopped with a bounded join, the registry is cleared, and
    /// the event log moves into the returned report.
    pub async fn finish(mut self, scenario: Scenario) -> SimulationReport {
        let snapshots = self.snapshots().await;
        let network = self.registry.statistics();

        let join_timeout = self.config.join_timeout;
        self.shutdown.cancel();
        join_all(self.devices.iter_mut().map(|d| d.stop(join_timeout))).await;
        self.registry.shutdown().await;

        let events = self.events.take();
        let mut event_counts = BTreeMap::new();
        for event in &events {
            *event_counts.entry(event.kind).or_insert(0) += 1;
        }

        let device_statistics = snapshots
            .iter()
            .map(|s| (s.name.clone(), s.statistics))
            .collect();
        let device_states = snapshots
            .iter()
            .map(|s| (s.name.clone(), DeviceState::from(s)))
            .collect();

        let report = SimulationReport {
            scenario: scenario.to_string(),
            seed: self.rng.seed(),
            duration_seconds: self.started.elapsed().as_secs_f64(),
            statistics: SimulationStatistics {
                total_events: events.len(),
                devices_simulated: self.topology.devices.len(),
                event_counts,
                device_statistics,
                network,
            },
            events,
            device_states,
        };
        tracing::info!(
            scenario = %scenario,
            events = report.statistics.total_events,
            operational = report.operational_devices(),
            "simulation finished"
        );
        report
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn log_device_error<T>(device: &str, result: Result<T, DeviceError>) {
    if let Err(err) = result {
        tracing::warn!(device, error = %err, "device operation failed");
    }
}

/// Runs one scenario end to end: start, phase script, collection, teardown.
#[derive(Debug, Clone, Default)]
pub struct NetworkSimulator {
    config: SimulationConfig,
}

impl NetworkSimulator {
    /// Simulator using `config` for every run.
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Configuration of the runs.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run `scenario` (`day1` or `day2`) against `topology`.
    ///
    /// Returns a configuration error before anything starts, or a complete
    /// report. Teardown runs whenever the simulation started.
    pub async fn run(&self, topology: &Topology, scenario: &str) -> SimulationResult<SimulationReport> {
        let scenario: Scenario = scenario.parse()?;
        let mut simulation = Simulation::start(topology, self.config.clone()).await?;
        simulation.run_scenario(scenario).await;
        Ok(simulation.finish(scenario).await)
    }
}
