//! The device actor task.
//!
//! Each device runs as one tokio task that owns all of its state. The task
//! multiplexes three sources with a biased `select!`: the stop token, the
//! control channel fed by [`DeviceHandle`](super::DeviceHandle), and the
//! device's inbound queue from the registry. Timers (boot completion,
//! periodic hello, the delayed routing refresh of a reconvergence) are
//! checked on every wakeup; the loop never sleeps longer than one tick.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::str::FromStr;

use netsim_core::{
    DeviceDescriptor, Ipv4Network, MacAddress, Message, Payload, fnv1a, gateway_for,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::config::DeviceConfig;
use super::error::{DeviceError, DeviceResult};
use super::snapshot::{DeviceSnapshot, DeviceStatistics, NeighborEntry, NextHop};
use super::state::OperationalState;
use crate::network::{ConnectionRegistry, InboxReceiver};

/// Requests sent to a running actor.
#[derive(Debug)]
pub(crate) enum DeviceCommand {
    /// Power on; acknowledged with the state reached once booting ends.
    PowerOn {
        ack: oneshot::Sender<OperationalState>,
    },
    /// Run one operation; acknowledged with the number of messages handed
    /// to the registry.
    Control {
        op: ControlOp,
        ack: oneshot::Sender<DeviceResult<usize>>,
    },
    /// Report the current state.
    Snapshot {
        reply: oneshot::Sender<DeviceSnapshot>,
    },
}

/// Operations a handle can ask the actor to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ControlOp {
    Pause,
    Resume,
    ArpDiscovery,
    SendHello,
    UpdateRoutingTable,
    LinkFailure(String),
    Reconverge,
    InterfaceChange,
    DeviceFailure,
    InterfaceDown(String),
    MarkOperational,
    Ping(String),
}

impl ControlOp {
    fn name(&self) -> &'static str {
        match self {
            ControlOp::Pause => "pause",
            ControlOp::Resume => "resume",
            ControlOp::ArpDiscovery => "arp_discovery",
            ControlOp::SendHello => "send_hello",
            ControlOp::UpdateRoutingTable => "update_routing_table",
            ControlOp::LinkFailure(_) => "link_failure",
            ControlOp::Reconverge => "reconverge",
            ControlOp::InterfaceChange => "interface_change",
            ControlOp::DeviceFailure => "device_failure",
            ControlOp::InterfaceDown(_) => "interface_down",
            ControlOp::MarkOperational => "mark_operational",
            ControlOp::Ping(_) => "ping",
        }
    }
}

/// State owned by one device task.
pub(crate) struct DeviceActor {
    descriptor: DeviceDescriptor,
    /// Interface name to the devices linked on it.
    attachments: BTreeMap<String, Vec<String>>,
    registry: ConnectionRegistry,
    config: DeviceConfig,
    epoch: Instant,

    state: OperationalState,
    interfaces: BTreeMap<String, bool>,
    arp_table: BTreeMap<Ipv4Addr, MacAddress>,
    routing_table: BTreeMap<String, NextHop>,
    neighbors: BTreeMap<String, NeighborEntry>,
    /// Highest link-state sequence seen per originating router id.
    link_state_db: BTreeMap<Ipv4Addr, u64>,
    stats: DeviceStatistics,
    lsa_sequence: u64,
    ping_sequence: u64,

    powered_at: Option<Instant>,
    boot_deadline: Option<Instant>,
    boot_waiters: Vec<oneshot::Sender<OperationalState>>,
    next_hello: Option<Instant>,
    route_refresh_at: Option<Instant>,
}

impl DeviceActor {
    pub(crate) fn new(
        descriptor: DeviceDescriptor,
        attachments: BTreeMap<String, Vec<String>>,
        registry: ConnectionRegistry,
        config: DeviceConfig,
        epoch: Instant,
    ) -> Self {
        let interfaces = descriptor
            .interfaces
            .iter()
            .map(|iface| (iface.name.clone(), false))
            .collect();
        Self {
            descriptor,
            attachments,
            registry,
            config,
            epoch,
            state: OperationalState::Unpowered,
            interfaces,
            arp_table: BTreeMap::new(),
            routing_table: BTreeMap::new(),
            neighbors: BTreeMap::new(),
            link_state_db: BTreeMap::new(),
            stats: DeviceStatistics::default(),
            lsa_sequence: 0,
            ping_sequence: 0,
            powered_at: None,
            boot_deadline: None,
            boot_waiters: Vec::new(),
            next_hello: None,
            route_refresh_at: None,
        }
    }

    fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Actor main loop. Returns when `cancel` fires or every handle is gone.
    pub(crate) async fn run(
        mut self,
        mut inbox: InboxReceiver,
        mut commands: mpsc::UnboundedReceiver<DeviceCommand>,
        cancel: CancellationToken,
    ) {
        debug!(device = %self.name(), "device actor started");
        let mut inbox_open = true;

        loop {
            let wakeup = self.next_wakeup(Instant::now());
            let accepting = inbox_open && self.state != OperationalState::Paused;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                message = inbox.recv(), if accepting => match message {
                    Some(message) => self.handle_inbound(message),
                    None => {
                        debug!(device = %self.name(), "inbound queue closed");
                        inbox_open = false;
                    }
                },
                _ = tokio::time::sleep_until(wakeup) => self.on_timer(Instant::now()),
            }
        }

        debug!(device = %self.name(), state = %self.state, "device actor stopped");
    }

    fn next_wakeup(&self, now: Instant) -> Instant {
        let mut wakeup = now + self.config.tick_interval;
        for deadline in [self.boot_deadline, self.next_hello, self.route_refresh_at]
            .into_iter()
            .flatten()
        {
            wakeup = wakeup.min(deadline);
        }
        wakeup
    }

    /// Handle one inbound message, then any timer already due. Timers keep
    /// firing while the inbox is never empty.
    fn handle_inbound(&mut self, message: Message) {
        self.on_message(message);
        let now = Instant::now();
        if self.next_wakeup(now) <= now {
            self.on_timer(now);
        }
    }

    fn on_timer(&mut self, now: Instant) {
        if self.boot_deadline.is_some_and(|deadline| deadline <= now) {
            self.complete_boot(now);
        }
        if self.state != OperationalState::Operational {
            return;
        }
        if self.route_refresh_at.is_some_and(|at| at <= now) {
            self.route_refresh_at = None;
            self.update_routing_table();
        }
        if let Some(at) = self.next_hello {
            if at <= now {
                self.send_hello();
                self.next_hello = Some(now + self.config.hello_interval);
            }
        }
    }

    fn handle_command(&mut self, command: DeviceCommand) {
        match command {
            DeviceCommand::PowerOn { ack } => self.power_on(ack),
            DeviceCommand::Control { op, ack } => {
                let result = self.control(&op);
                if let Err(err) = &result {
                    debug!(device = %self.name(), op = op.name(), error = %err, "control rejected");
                }
                let _ = ack.send(result);
            }
            DeviceCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn control(&mut self, op: &ControlOp) -> DeviceResult<usize> {
        match op {
            ControlOp::Pause => {
                self.transition("pause", OperationalState::Paused)?;
                Ok(0)
            }
            ControlOp::Resume => {
                if self.state != OperationalState::Paused {
                    return Err(self.invalid("resume"));
                }
                self.set_state(OperationalState::Operational);
                self.schedule_hello(Instant::now());
                Ok(0)
            }
            ControlOp::ArpDiscovery => Ok(self.perform_arp_discovery()),
            ControlOp::SendHello => Ok(self.send_hello()),
            ControlOp::UpdateRoutingTable => Ok(self.update_routing_table()),
            ControlOp::LinkFailure(neighbor) => Ok(self.handle_link_failure(neighbor)),
            ControlOp::Reconverge => Ok(self.reconverge()),
            ControlOp::InterfaceChange => self.simulate_interface_change(),
            ControlOp::DeviceFailure => {
                self.simulate_device_failure();
                Ok(0)
            }
            ControlOp::InterfaceDown(interface) => self.simulate_interface_down(interface),
            ControlOp::MarkOperational => {
                self.mark_operational();
                Ok(0)
            }
            ControlOp::Ping(target) => self.ping(target),
        }
    }

    fn invalid(&self, operation: &'static str) -> DeviceError {
        DeviceError::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn transition(&mut self, operation: &'static str, next: OperationalState) -> DeviceResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(self.invalid(operation));
        }
        self.set_state(next);
        Ok(())
    }

    fn set_state(&mut self, next: OperationalState) {
        if self.state != next {
            debug!(device = %self.name(), from = %self.state, to = %next, "state change");
            self.state = next;
        }
    }

    // Lifecycle

    fn power_on(&mut self, ack: oneshot::Sender<OperationalState>) {
        match self.state {
            OperationalState::Unpowered | OperationalState::Failed => {
                let now = Instant::now();
                for iface in &self.descriptor.interfaces {
                    self.interfaces.insert(iface.name.clone(), iface.enabled);
                }
                self.set_state(OperationalState::Booting);
                self.powered_at = Some(now);
                self.boot_waiters.push(ack);
                if self.config.boot_delay.is_zero() {
                    self.complete_boot(now);
                } else {
                    self.boot_deadline = Some(now + self.config.boot_delay);
                }
            }
            OperationalState::Booting => self.boot_waiters.push(ack),
            OperationalState::Operational | OperationalState::Paused => {
                let _ = ack.send(self.state);
            }
        }
    }

    fn complete_boot(&mut self, now: Instant) {
        self.boot_deadline = None;
        if self.state == OperationalState::Booting {
            self.set_state(OperationalState::Operational);
            self.schedule_hello(now);
        }
        self.release_boot_waiters();
    }

    fn release_boot_waiters(&mut self) {
        let state = self.state;
        for waiter in self.boot_waiters.drain(..) {
            let _ = waiter.send(state);
        }
    }

    fn schedule_hello(&mut self, now: Instant) {
        self.next_hello = (self.descriptor.is_router() && self.descriptor.speaks_hello())
            .then(|| now + self.config.hello_interval);
    }

    fn mark_operational(&mut self) {
        match self.state {
            OperationalState::Unpowered => {
                let now = Instant::now();
                for iface in &self.descriptor.interfaces {
                    self.interfaces.insert(iface.name.clone(), iface.enabled);
                }
                self.powered_at = Some(now);
                self.set_state(OperationalState::Operational);
                self.schedule_hello(now);
            }
            OperationalState::Booting => self.complete_boot(Instant::now()),
            OperationalState::Operational
            | OperationalState::Paused
            | OperationalState::Failed => {}
        }
    }

    // Outbound

    fn send_to(&mut self, target: &str, payload: Payload) -> usize {
        self.stats.sent += 1;
        let message = Message::unicast(self.name(), target, payload);
        usize::from(self.registry.send(self.name(), target, message))
    }

    /// Broadcast to every enabled neighbor. Returns the number of copies attempted.
    fn broadcast(&mut self, payload: Payload) -> usize {
        let message = Message::broadcast(self.name(), payload);
        let outcome = self.registry.broadcast(self.name(), &message);
        self.stats.sent += outcome.attempted as u64;
        trace!(
            device = %self.name(),
            kind = %message.kind(),
            attempted = outcome.attempted,
            accepted = outcome.accepted,
            "broadcast"
        );
        outcome.attempted
    }

    fn router_id(&self) -> Ipv4Addr {
        self.descriptor
            .interfaces
            .iter()
            .find_map(|iface| iface.ip_address)
            .unwrap_or_else(|| {
                let host = (fnv1a(self.name().as_bytes()) % 254 + 1) as u8;
                Ipv4Addr::new(192, 168, 1, host)
            })
    }

    fn perform_arp_discovery(&mut self) -> usize {
        if self.state != OperationalState::Operational {
            return 0;
        }
        let requests: Vec<Payload> = self
            .descriptor
            .interfaces
            .iter()
            .filter(|iface| self.interfaces.get(&iface.name).copied().unwrap_or(false))
            .filter_map(|iface| {
                iface.ip_address.map(|ip| Payload::ArpRequest {
                    source_ip: ip,
                    target_ip: gateway_for(ip, iface.subnet_mask),
                    interface: iface.name.clone(),
                })
            })
            .collect();

        let mut sent = 0;
        for request in requests {
            let copies = self.broadcast(request);
            self.stats.arp_requests_sent += copies as u64;
            sent += copies;
        }
        debug!(device = %self.name(), sent, "arp discovery");
        sent
    }

    fn send_hello(&mut self) -> usize {
        if !self.descriptor.is_router() || self.state != OperationalState::Operational {
            return 0;
        }
        let router_id = self.router_id();
        let hellos: Vec<Payload> = self
            .descriptor
            .routing_protocols
            .iter()
            .filter(|rp| rp.sends_hello())
            .map(|rp| Payload::Hello {
                protocol: rp.protocol.clone(),
                process_id: rp.process_id.clone(),
                area: rp.area.clone().unwrap_or_else(|| "0".to_string()),
                router_id,
            })
            .collect();

        let mut sent = 0;
        for hello in hellos {
            let copies = self.broadcast(hello);
            self.stats.hello_sent += copies as u64;
            sent += copies;
        }
        trace!(device = %self.name(), sent, "hello sent");
        sent
    }

    fn update_routing_table(&mut self) -> usize {
        if !self.descriptor.is_router() || self.state != OperationalState::Operational {
            return 0;
        }
        let networks = self.descriptor.configured_networks();
        for network in &networks {
            self.routing_table
                .insert(network.clone(), NextHop::DirectlyConnected);
        }
        self.stats.routing_updates += 1;
        debug!(device = %self.name(), routes = self.routing_table.len(), "routing table updated");

        if networks.is_empty() {
            return 0;
        }
        self.broadcast(Payload::RoutingUpdate { networks })
    }

    fn ping(&mut self, target: &str) -> DeviceResult<usize> {
        if self.state != OperationalState::Operational {
            return Err(self.invalid("ping"));
        }
        self.ping_sequence += 1;
        let sequence = self.ping_sequence;
        Ok(self.send_to(target, Payload::Ping { sequence }))
    }

    // Faults and topology changes

    fn handle_link_failure(&mut self, neighbor: &str) -> usize {
        let before = self.routing_table.len();
        self.routing_table.retain(|_, hop| !hop.is_via(neighbor));
        self.neighbors.remove(neighbor);
        debug!(
            device = %self.name(),
            neighbor,
            purged = before - self.routing_table.len(),
            "link failure handled"
        );

        if !self.descriptor.is_router() || !self.state.processes_messages() {
            return 0;
        }
        self.lsa_sequence += 1;
        let update = Payload::LinkStateUpdate {
            router_id: self.router_id(),
            sequence: self.lsa_sequence,
        };
        self.broadcast(update)
    }

    fn reconverge(&mut self) -> usize {
        if !self.descriptor.is_router() || self.state != OperationalState::Operational {
            return 0;
        }
        let sent = self.send_hello();
        self.route_refresh_at = Some(Instant::now() + self.config.reconverge_delay);
        debug!(device = %self.name(), "reconvergence started");
        sent
    }

    fn simulate_interface_change(&mut self) -> DeviceResult<usize> {
        let Some(first) = self.descriptor.interfaces.first().map(|i| i.name.clone()) else {
            return Ok(0);
        };
        let up = !self.interfaces.get(&first).copied().unwrap_or(false);
        self.interfaces.insert(first.clone(), up);
        debug!(device = %self.name(), interface = %first, up, "interface changed");

        if up {
            Ok(self.perform_arp_discovery())
        } else {
            self.purge_interface(&first);
            Ok(0)
        }
    }

    fn simulate_interface_down(&mut self, interface: &str) -> DeviceResult<usize> {
        if !self.interfaces.contains_key(interface) {
            return Err(DeviceError::UnknownInterface(interface.to_string()));
        }
        self.interfaces.insert(interface.to_string(), false);
        self.purge_interface(interface);
        debug!(device = %self.name(), interface, "interface down");
        Ok(0)
    }

    /// Drop the routes and adjacencies that depend on `interface`.
    fn purge_interface(&mut self, interface: &str) {
        if let Some(ip) = self
            .descriptor
            .interface(interface)
            .and_then(|iface| iface.ip_address)
        {
            let mut stale = Vec::new();
            for (network, hop) in &self.routing_table {
                if *hop != NextHop::DirectlyConnected {
                    continue;
                }
                match parse_network(network) {
                    Ok(net) if net.contains(ip) => stale.push(network.clone()),
                    Ok(_) => {}
                    Err(err) => warn!(device = %self.name(), error = %err, "skipping route"),
                }
            }
            for network in stale {
                self.routing_table.remove(&network);
            }
        }

        let attached = self.attachments.get(interface).cloned().unwrap_or_default();
        for neighbor in &attached {
            self.routing_table.retain(|_, hop| !hop.is_via(neighbor));
            self.neighbors.remove(neighbor);
        }
    }

    fn simulate_device_failure(&mut self) {
        self.arp_table.clear();
        self.routing_table.clear();
        self.neighbors.clear();
        self.link_state_db.clear();
        for up in self.interfaces.values_mut() {
            *up = false;
        }
        self.powered_at = None;
        self.boot_deadline = None;
        self.next_hello = None;
        self.route_refresh_at = None;
        self.set_state(OperationalState::Failed);
        self.release_boot_waiters();
        warn!(device = %self.name(), "device failed");
    }

    // Inbound

    fn on_message(&mut self, message: Message) {
        if self.state.discards_messages() {
            self.stats.discarded += 1;
            trace!(device = %self.name(), kind = %message.kind(), state = %self.state, "message discarded");
            return;
        }
        if let Err(err) = self.handle_message(message) {
            warn!(device = %self.name(), error = %err, "message handling failed");
        }
    }

    fn handle_message(&mut self, message: Message) -> DeviceResult<()> {
        if let Some(target) = &message.target {
            if target != self.name() {
                return Err(DeviceError::Misrouted {
                    device: self.name().to_string(),
                    target: target.clone(),
                });
            }
        }
        self.stats.received += 1;
        let source = message.source;

        match message.payload {
            Payload::ArpRequest { target_ip, .. } => {
                let owner = self
                    .descriptor
                    .interfaces
                    .iter()
                    .find(|iface| {
                        iface.ip_address == Some(target_ip)
                            && self.interfaces.get(&iface.name).copied().unwrap_or(false)
                    })
                    .map(|iface| iface.name.clone());
                if let Some(interface) = owner {
                    let mac = MacAddress::simulated(self.name(), &interface);
                    self.send_to(&source, Payload::ArpReply { ip: target_ip, mac });
                }
            }
            Payload::ArpReply { ip, mac } => {
                self.arp_table.insert(ip, mac);
            }
            Payload::Hello {
                protocol,
                process_id,
                area,
                router_id,
            } => {
                if self.descriptor.is_router() {
                    let last_seen = self.epoch.elapsed().as_secs_f64();
                    self.neighbors.insert(
                        source,
                        NeighborEntry {
                            router_id,
                            protocol,
                            process_id,
                            area,
                            last_seen,
                        },
                    );
                } else {
                    trace!(device = %self.name(), from = %source, "hello ignored");
                }
            }
            Payload::RoutingUpdate { networks } => {
                for network in networks {
                    if self.routing_table.get(&network) == Some(&NextHop::DirectlyConnected) {
                        continue;
                    }
                    self.routing_table
                        .insert(network, NextHop::Via(source.clone()));
                }
            }
            Payload::Ping { sequence } => {
                self.send_to(&source, Payload::PingReply { sequence });
            }
            Payload::PingReply { .. } => {
                self.stats.ping_replies_received += 1;
            }
            Payload::LinkStateUpdate {
                router_id,
                sequence,
            } => {
                if self.descriptor.is_router() {
                    let seen = self.link_state_db.entry(router_id).or_insert(0);
                    if sequence > *seen {
                        *seen = sequence;
                        self.stats.link_state_updates += 1;
                        trace!(device = %self.descriptor.name, %router_id, sequence, "link state accepted");
                    }
                }
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> DeviceSnapshot {
        let mut statistics = self.stats;
        statistics.uptime_seconds = match (self.powered_at, self.state) {
            (Some(at), state) if !state.discards_messages() => at.elapsed().as_secs_f64(),
            _ => 0.0,
        };
        DeviceSnapshot {
            name: self.descriptor.name.clone(),
            device_type: self.descriptor.device_type,
            state: self.state,
            interfaces: self.interfaces.clone(),
            routing_table: self.routing_table.clone(),
            arp_table: self.arp_table.clone(),
            neighbors: self.neighbors.clone(),
            link_state: self.link_state_db.clone(),
            statistics,
        }
    }
}

fn parse_network(network: &str) -> DeviceResult<Ipv4Network> {
    Ipv4Network::from_str(network).map_err(|err| DeviceError::InvalidNetwork {
        network: network.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use netsim_core::{DeviceType, InterfaceConfig, RoutingProtocolConfig};

    use super::*;
    use crate::network::{ConnectionOptions, RegistryConfig};
    use crate::rng::SimRng;

    fn operational_router(registry: &ConnectionRegistry) -> DeviceActor {
        let descriptor = DeviceDescriptor::new("r1", DeviceType::Router)
            .with_interface(
                InterfaceConfig::new("Gi0/0")
                    .with_address(Ipv4Addr::new(10, 0, 12, 1), Ipv4Addr::new(255, 255, 255, 0)),
            )
            .with_protocol(RoutingProtocolConfig::new("ospf").with_network("10.0.12.0/24"));
        let mut actor = DeviceActor::new(
            descriptor,
            BTreeMap::new(),
            registry.clone(),
            DeviceConfig::fast(),
            Instant::now(),
        );
        actor.mark_operational();
        actor
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_hello_fires_between_inbound_messages() {
        let registry = ConnectionRegistry::new(RegistryConfig::default(), SimRng::new(4));
        registry
            .create_connection("r1", "r2", "Gi0/0", "Gi0/0", ConnectionOptions::default())
            .expect("link");
        let mut actor = operational_router(&registry);
        assert_eq!(actor.stats.hello_sent, 0);

        tokio::time::advance(actor.config.hello_interval).await;
        actor.handle_inbound(Message::unicast("r2", "r1", Payload::PingReply { sequence: 1 }));

        assert_eq!(actor.stats.ping_replies_received, 1);
        assert_eq!(actor.stats.hello_sent, 1);
        assert!(actor.next_hello.is_some_and(|at| at > Instant::now()));

        // Nothing due: a message leaves the timers alone.
        tokio::time::advance(Duration::from_millis(1)).await;
        actor.handle_inbound(Message::unicast("r2", "r1", Payload::PingReply { sequence: 2 }));
        assert_eq!(actor.stats.hello_sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_router_does_not_announce_link_failure() {
        let registry = ConnectionRegistry::new(RegistryConfig::default(), SimRng::new(4));
        registry
            .create_connection("r1", "r2", "Gi0/0", "Gi0/0", ConnectionOptions::default())
            .expect("link");
        let mut actor = operational_router(&registry);
        actor.routing_table.insert("10.2.0.0/24".into(), NextHop::Via("r2".into()));

        actor.control(&ControlOp::Pause).expect("pause");
        assert_eq!(actor.handle_link_failure("r2"), 0);
        assert_eq!(actor.lsa_sequence, 0);
        assert!(actor.routing_table.is_empty());

        actor.control(&ControlOp::Resume).expect("resume");
        assert_eq!(actor.handle_link_failure("r3"), 1);
        assert_eq!(actor.lsa_sequence, 1);
    }
}
