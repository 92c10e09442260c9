//! Caller-side handle to a running device actor.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use netsim_core::{DeviceDescriptor, DeviceType, MacAddress};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::actor::{ControlOp, DeviceActor, DeviceCommand};
use super::config::DeviceConfig;
use super::error::{DeviceError, DeviceResult};
use super::snapshot::{DeviceSnapshot, DeviceStatistics, NextHop};
use super::state::OperationalState;
use crate::network::ConnectionRegistry;

/// Handle to one device actor.
///
/// Every method is a request to the actor task and waits for its answer, so
/// side effects are visible to the next call. Once the actor has stopped,
/// methods return [`DeviceError::Stopped`].
#[derive(Debug)]
pub struct DeviceHandle {
    name: String,
    device_type: DeviceType,
    commands: mpsc::UnboundedSender<DeviceCommand>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DeviceHandle {
    /// Spawn the actor for `descriptor`.
    ///
    /// The device takes its inbound queue from `registry`, registering it
    /// first if needed, and learns which neighbors hang off each of its
    /// interfaces from the registry's current links. The actor stops when
    /// `cancel` fires or [`stop`](Self::stop) is called.
    pub fn spawn(
        descriptor: DeviceDescriptor,
        registry: ConnectionRegistry,
        config: DeviceConfig,
        cancel: CancellationToken,
    ) -> DeviceResult<Self> {
        let name = descriptor.name.clone();
        registry.register_device(&name);
        let inbox = registry
            .take_receiver(&name)
            .ok_or_else(|| DeviceError::InboxTaken(name.clone()))?;

        let mut attachments: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for conn in registry.connections() {
            if let (Some(interface), Some(peer)) = (conn.interface_of(&name), conn.peer_of(&name)) {
                attachments
                    .entry(interface.to_string())
                    .or_default()
                    .push(peer.to_string());
            }
        }

        let device_type = descriptor.device_type;
        let (commands, command_rx) = mpsc::unbounded_channel();
        let actor = DeviceActor::new(descriptor, attachments, registry, config, Instant::now());
        let task = tokio::spawn(actor.run(inbox, command_rx, cancel.clone()));

        Ok(Self {
            name,
            device_type,
            commands,
            cancel,
            task: Some(task),
        })
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device kind.
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Whether the actor task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    async fn control(&self, op: ControlOp) -> DeviceResult<usize> {
        let (ack, rx) = oneshot::channel();
        self.commands
            .send(DeviceCommand::Control { op, ack })
            .map_err(|_| DeviceError::Stopped)?;
        rx.await.map_err(|_| DeviceError::Stopped)?
    }

    /// Power the device on and wait for booting to end.
    ///
    /// Returns the state reached: `Operational` normally, `Failed` if the
    /// device failed while booting.
    pub async fn power_on(&self) -> DeviceResult<OperationalState> {
        let (ack, rx) = oneshot::channel();
        self.commands
            .send(DeviceCommand::PowerOn { ack })
            .map_err(|_| DeviceError::Stopped)?;
        rx.await.map_err(|_| DeviceError::Stopped)
    }

    /// Suspend an operational device. Queued messages are kept.
    pub async fn pause(&self) -> DeviceResult<()> {
        self.control(ControlOp::Pause).await.map(drop)
    }

    /// Resume a paused device.
    pub async fn resume(&self) -> DeviceResult<()> {
        self.control(ControlOp::Resume).await.map(drop)
    }

    /// Broadcast an ARP request for the gateway of every up interface with an
    /// address. Returns the number of requests sent.
    pub async fn perform_arp_discovery(&self) -> DeviceResult<usize> {
        self.control(ControlOp::ArpDiscovery).await
    }

    /// Broadcast one hello per hello-speaking protocol instance (routers only).
    pub async fn send_hello(&self) -> DeviceResult<usize> {
        self.control(ControlOp::SendHello).await
    }

    /// Install the configured networks as directly connected and announce
    /// them (routers only).
    pub async fn update_routing_table(&self) -> DeviceResult<usize> {
        self.control(ControlOp::UpdateRoutingTable).await
    }

    /// Forget every route and adjacency through `neighbor`; routers announce
    /// a link-state update.
    pub async fn handle_link_failure(&self, neighbor: &str) -> DeviceResult<usize> {
        self.control(ControlOp::LinkFailure(neighbor.to_string()))
            .await
    }

    /// Send hello now and refresh the routing table after the reconverge delay.
    pub async fn reconverge(&self) -> DeviceResult<usize> {
        self.control(ControlOp::Reconverge).await
    }

    /// Toggle the first interface.
    pub async fn simulate_interface_change(&self) -> DeviceResult<usize> {
        self.control(ControlOp::InterfaceChange).await
    }

    /// Fail the device: tables cleared, interfaces down.
    pub async fn simulate_device_failure(&self) -> DeviceResult<()> {
        self.control(ControlOp::DeviceFailure).await.map(drop)
    }

    /// Take one interface down and purge what depended on it.
    pub async fn simulate_interface_down(&self, interface: &str) -> DeviceResult<()> {
        self.control(ControlOp::InterfaceDown(interface.to_string()))
            .await
            .map(drop)
    }

    /// Force an unpowered or booting device to operational.
    pub async fn mark_operational(&self) -> DeviceResult<()> {
        self.control(ControlOp::MarkOperational).await.map(drop)
    }

    /// Send a ping to `target`. Returns 1 if the registry accepted it.
    pub async fn ping(&self, target: &str) -> DeviceResult<usize> {
        self.control(ControlOp::Ping(target.to_string())).await
    }

    /// Current state of the device.
    pub async fn snapshot(&self) -> DeviceResult<DeviceSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(DeviceCommand::Snapshot { reply })
            .map_err(|_| DeviceError::Stopped)?;
        rx.await.map_err(|_| DeviceError::Stopped)
    }

    /// Whether the device is operational.
    pub async fn is_operational(&self) -> DeviceResult<bool> {
        Ok(self.snapshot().await?.is_operational())
    }

    /// Interface name to up/down.
    pub async fn interface_states(&self) -> DeviceResult<BTreeMap<String, bool>> {
        Ok(self.snapshot().await?.interfaces)
    }

    /// Destination network to next hop.
    pub async fn routing_table(&self) -> DeviceResult<BTreeMap<String, NextHop>> {
        Ok(self.snapshot().await?.routing_table)
    }

    /// Resolved addresses.
    pub async fn arp_table(&self) -> DeviceResult<BTreeMap<Ipv4Addr, MacAddress>> {
        Ok(self.snapshot().await?.arp_table)
    }

    /// Device counters.
    pub async fn statistics(&self) -> DeviceResult<DeviceStatistics> {
        Ok(self.snapshot().await?.statistics)
    }

    /// Stop the actor, waiting at most `timeout` before aborting it.
    pub async fn stop(&mut self, timeout: Duration) {
        self.cancel.cancel();
        let Some(mut task) = self.task.take() else {
            return;
        };
        if tokio::time::timeout(timeout, &mut task).await.is_err() {
            warn!(device = %self.name, timeout_ms = timeout.as_millis() as u64, "device did not stop in time, aborting");
            task.abort();
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
