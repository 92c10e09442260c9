//! The connection registry: link table, inbound queues and the delivery dispatcher.
//!
//! Senders never deliver directly. [`ConnectionRegistry::send`] checks the
//! link and the destination queue under a short lock, snapshots the link's
//! latency and loss, and hands the message to a single background
//! dispatcher. The dispatcher sleeps the latency, draws the loss, and pushes
//! the message into the destination's bounded queue. A full queue drops the
//! newest message; nothing ever blocks a sender.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use netsim_core::{Message, SimulationError, SimulationResult};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::config::{ConnectionOptions, LinkProperties, RegistryConfig, congestion_profile};
use super::connection::{Connection, LinkKey};
use super::stats::{Counters, RegistryStatistics};
use crate::rng::SimRng;

/// Receiving half of a device's inbound queue.
/// Taken once via [`ConnectionRegistry::take_receiver`].
pub type InboxReceiver = mpsc::Receiver<Message>;

/// Why a message did not reach its destination queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DropReason {
    NoConnection,
    Disabled,
    UnknownTarget,
    QueueFull,
    ReceiverClosed,
    PacketLoss,
    ShutDown,
}

impl DropReason {
    fn as_str(&self) -> &'static str {
        match self {
            DropReason::NoConnection => "no_connection",
            DropReason::Disabled => "disabled",
            DropReason::UnknownTarget => "unknown_target",
            DropReason::QueueFull => "queue_full",
            DropReason::ReceiverClosed => "receiver_closed",
            DropReason::PacketLoss => "packet_loss",
            DropReason::ShutDown => "shut_down",
        }
    }
}

/// A message accepted by `send`, waiting in the dispatcher.
struct Envelope {
    target: String,
    message: Message,
    latency: Duration,
    packet_loss: f64,
}

struct Inbox {
    tx: mpsc::Sender<Message>,
    rx: Option<InboxReceiver>,
}

#[derive(Default)]
struct RegistryState {
    links: HashMap<LinkKey, Connection>,
    adjacency: HashMap<String, BTreeSet<String>>,
    inboxes: HashMap<String, Inbox>,
}

impl RegistryState {
    /// Link parameters for an admissible `source -> target` send.
    fn admit(&self, source: &str, target: &str) -> Result<(Duration, f64), DropReason> {
        let conn = self
            .links
            .get(&LinkKey::new(source, target))
            .ok_or(DropReason::NoConnection)?;
        if !conn.enabled {
            return Err(DropReason::Disabled);
        }
        let inbox = self.inboxes.get(target).ok_or(DropReason::UnknownTarget)?;
        if inbox.tx.is_closed() {
            return Err(DropReason::ReceiverClosed);
        }
        if inbox.tx.capacity() == 0 {
            return Err(DropReason::QueueFull);
        }
        Ok((conn.latency, conn.packet_loss))
    }

    fn ensure_inbox(&mut self, device: &str, capacity: usize) {
        if !self.inboxes.contains_key(device) {
            let (tx, rx) = mpsc::channel(capacity);
            self.inboxes
                .insert(device.to_string(), Inbox { tx, rx: Some(rx) });
        }
    }

    fn enabled_neighbors(&self, device: &str) -> Vec<String> {
        let Some(adjacent) = self.adjacency.get(device) else {
            return Vec::new();
        };
        adjacent
            .iter()
            .filter(|peer| {
                self.links
                    .get(&LinkKey::new(device, peer))
                    .is_some_and(|conn| conn.enabled)
            })
            .cloned()
            .collect()
    }
}

/// Result of a [`ConnectionRegistry::broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Neighbors a copy was sent to.
    pub attempted: usize,
    /// Copies the registry accepted.
    pub accepted: usize,
}

struct Inner {
    config: RegistryConfig,
    state: Mutex<RegistryState>,
    counters: Counters,
    dispatch_tx: mpsc::UnboundedSender<Envelope>,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().expect("registry state lock poisoned")
    }

    fn drop_message(&self, source: &str, target: &str, reason: DropReason) {
        self.counters.record_dropped();
        trace!(source, target, reason = reason.as_str(), "message dropped");
    }

    fn deliver(&self, envelope: Envelope) {
        let tx = self
            .lock_state()
            .inboxes
            .get(&envelope.target)
            .map(|inbox| inbox.tx.clone());
        let source = envelope.message.source.clone();
        let Some(tx) = tx else {
            self.drop_message(&source, &envelope.target, DropReason::UnknownTarget);
            return;
        };
        match tx.try_send(envelope.message) {
            Ok(()) => {
                self.counters.record_delivered();
                trace!(source = %source, target = %envelope.target, "message delivered");
            }
            Err(TrySendError::Full(_)) => {
                self.drop_message(&source, &envelope.target, DropReason::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.drop_message(&source, &envelope.target, DropReason::ReceiverClosed)
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Shared handle to the simulated network.
///
/// Cloning is cheap; every clone talks to the same link table, queues and
/// dispatcher. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("config", &self.inner.config)
            .field("statistics", &self.statistics())
            .finish()
    }
}

impl ConnectionRegistry {
    /// Create a registry and start its dispatcher. Loss draws use `rng`.
    pub fn new(config: RegistryConfig, rng: SimRng) -> Self {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            config,
            state: Mutex::new(RegistryState::default()),
            counters: Counters::default(),
            dispatch_tx,
            shutdown: CancellationToken::new(),
            dispatcher: Mutex::new(None),
        });

        let handle = tokio::spawn(dispatch_loop(
            Arc::downgrade(&inner),
            dispatch_rx,
            rng,
            inner.shutdown.clone(),
        ));
        *inner.dispatcher.lock().expect("dispatcher lock poisoned") = Some(handle);

        debug!(
            queue_capacity = inner.config.queue_capacity,
            base_latency_ms = inner.config.base_latency.as_millis() as u64,
            "connection registry started"
        );
        Self { inner }
    }

    /// Registry-wide configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Ensure `device` has an inbound queue. Idempotent.
    pub fn register_device(&self, device: &str) {
        self.inner
            .lock_state()
            .ensure_inbox(device, self.inner.config.queue_capacity);
    }

    /// Take ownership of `device`'s inbound queue. Returns `None` if the
    /// device is unknown or the receiver was already taken.
    pub fn take_receiver(&self, device: &str) -> Option<InboxReceiver> {
        self.inner
            .lock_state()
            .inboxes
            .get_mut(device)
            .and_then(|inbox| inbox.rx.take())
    }

    /// Devices owning an inbound queue, sorted.
    pub fn registered_devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self.inner.lock_state().inboxes.keys().cloned().collect();
        devices.sort();
        devices
    }

    /// Create the link between `a` and `b`, or replace its parameters if the
    /// unordered pair is already linked. Both endpoints get an inbound queue.
    pub fn create_connection(
        &self,
        a: &str,
        b: &str,
        interface_a: &str,
        interface_b: &str,
        options: ConnectionOptions,
    ) -> SimulationResult<()> {
        if a == b {
            return Err(SimulationError::InvalidTopology(format!(
                "device '{a}' cannot be linked to itself"
            )));
        }

        let mut state = self.inner.lock_state();
        let capacity = self.inner.config.queue_capacity;
        state.ensure_inbox(a, capacity);
        state.ensure_inbox(b, capacity);

        let conn = Connection {
            device_a: a.to_string(),
            interface_a: interface_a.to_string(),
            device_b: b.to_string(),
            interface_b: interface_b.to_string(),
            enabled: true,
            latency: options.latency,
            packet_loss: options.packet_loss.clamp(0.0, 1.0),
            bandwidth: options.bandwidth,
        };
        let replaced = state.links.insert(LinkKey::new(a, b), conn).is_some();
        state
            .adjacency
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        state
            .adjacency
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());

        debug!(a, b, interface_a, interface_b, replaced, "connection created");
        Ok(())
    }

    /// Hand `message` to the dispatcher for delivery from `source` to
    /// `target`. Returns `false`, counting a drop, if there is no enabled
    /// link between them or the target's queue is full.
    pub fn send(&self, source: &str, target: &str, message: Message) -> bool {
        self.inner.counters.record_sent();

        if self.inner.shutdown.is_cancelled() {
            self.inner.drop_message(source, target, DropReason::ShutDown);
            return false;
        }

        let admitted = self.inner.lock_state().admit(source, target);
        let (latency, packet_loss) = match admitted {
            Ok(params) => params,
            Err(reason) => {
                self.inner.drop_message(source, target, reason);
                return false;
            }
        };

        let envelope = Envelope {
            target: target.to_string(),
            message,
            latency,
            packet_loss,
        };
        if self.inner.dispatch_tx.send(envelope).is_err() {
            self.inner.drop_message(source, target, DropReason::ShutDown);
            return false;
        }
        true
    }

    /// Send a copy of `message` to every enabled neighbor of `source`.
    /// A rejected copy does not stop the others.
    pub fn broadcast(&self, source: &str, message: &Message) -> BroadcastOutcome {
        let neighbors = self.neighbors(source);
        let attempted = neighbors.len();
        let accepted = neighbors
            .into_iter()
            .filter(|target| self.send(source, target, message.clone()))
            .count();
        BroadcastOutcome {
            attempted,
            accepted,
        }
    }

    /// Devices currently reachable from `device` over an enabled link, sorted.
    pub fn neighbors(&self, device: &str) -> Vec<String> {
        self.inner.lock_state().enabled_neighbors(device)
    }

    /// Disable the link between `a` and `b`. Messages already accepted stay in flight.
    /// Returns `false` if the pair is not linked.
    pub fn disable(&self, a: &str, b: &str) -> bool {
        self.set_enabled(a, b, false)
    }

    /// Re-enable the link between `a` and `b`.
    pub fn enable(&self, a: &str, b: &str) -> bool {
        self.set_enabled(a, b, true)
    }

    fn set_enabled(&self, a: &str, b: &str, enabled: bool) -> bool {
        let mut state = self.inner.lock_state();
        match state.links.get_mut(&LinkKey::new(a, b)) {
            Some(conn) => {
                conn.enabled = enabled;
                debug!(a, b, enabled, "connection toggled");
                true
            }
            None => false,
        }
    }

    /// Re-enable every link.
    pub fn enable_all(&self) {
        let mut state = self.inner.lock_state();
        for conn in state.links.values_mut() {
            conn.enabled = true;
        }
        debug!(connections = state.links.len(), "all connections enabled");
    }

    /// Update selected parameters of the link between `a` and `b`.
    pub fn set_properties(&self, a: &str, b: &str, properties: LinkProperties) -> bool {
        let mut state = self.inner.lock_state();
        let Some(conn) = state.links.get_mut(&LinkKey::new(a, b)) else {
            return false;
        };
        if let Some(latency) = properties.latency {
            conn.latency = latency;
        }
        if let Some(loss) = properties.packet_loss {
            conn.packet_loss = if loss.is_nan() { 0.0 } else { loss.clamp(0.0, 1.0) };
        }
        if properties.bandwidth.is_some() {
            conn.bandwidth = properties.bandwidth;
        }
        true
    }

    /// Shape the link between `a` and `b` for congestion `level` in `0..=1`.
    pub fn apply_congestion(&self, a: &str, b: &str, level: f64) -> bool {
        let (latency, packet_loss) = congestion_profile(self.inner.config.base_latency, level);
        let applied = self.set_properties(
            a,
            b,
            LinkProperties {
                latency: Some(latency),
                packet_loss: Some(packet_loss),
                bandwidth: None,
            },
        );
        if applied {
            debug!(
                a,
                b,
                level,
                latency_ms = latency.as_secs_f64() * 1000.0,
                packet_loss,
                "congestion applied"
            );
        }
        applied
    }

    /// Reset every link to the base latency and zero loss.
    pub fn clear_congestion(&self) {
        let base = self.inner.config.base_latency;
        let mut state = self.inner.lock_state();
        for conn in state.links.values_mut() {
            conn.latency = base;
            conn.packet_loss = 0.0;
        }
        debug!(connections = state.links.len(), "congestion cleared");
    }

    /// Snapshot of the link between `a` and `b`.
    pub fn connection(&self, a: &str, b: &str) -> Option<Connection> {
        self.inner.lock_state().links.get(&LinkKey::new(a, b)).cloned()
    }

    /// Snapshot of every link, ordered by endpoint names.
    pub fn connections(&self) -> Vec<Connection> {
        let state = self.inner.lock_state();
        let mut keys: Vec<&LinkKey> = state.links.keys().collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|key| state.links.get(key).cloned())
            .collect()
    }

    /// Current delivery counters and table sizes.
    pub fn statistics(&self) -> RegistryStatistics {
        let (sent, delivered, dropped, in_flight) = self.inner.counters.load();
        let state = self.inner.lock_state();
        let queued_messages = state
            .inboxes
            .values()
            .map(|inbox| (inbox.tx.max_capacity() - inbox.tx.capacity()) as u64)
            .sum();
        RegistryStatistics {
            sent,
            delivered,
            dropped,
            in_flight,
            queued_messages,
            active_connections: state.links.len(),
            enabled_connections: state.links.values().filter(|c| c.enabled).count(),
            registered_devices: state.inboxes.len(),
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop the dispatcher and clear every link and queue.
    ///
    /// The dispatcher join is bounded by the configured shutdown timeout; a
    /// dispatcher that does not exit in time is aborted. Messages still in
    /// flight are counted as dropped.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let handle = self
            .inner
            .dispatcher
            .lock()
            .expect("dispatcher lock poisoned")
            .take();
        if let Some(mut handle) = handle {
            let timeout = self.inner.config.shutdown_timeout;
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "dispatcher did not stop in time, aborting"
                );
                handle.abort();
            }
        }

        let mut state = self.inner.lock_state();
        let links = state.links.len();
        let devices = state.inboxes.len();
        state.links.clear();
        state.adjacency.clear();
        state.inboxes.clear();
        debug!(links, devices, "connection registry shut down");
    }
}

async fn dispatch_loop(
    inner: Weak<Inner>,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    mut rng: SimRng,
    shutdown: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };

        if !envelope.latency.is_zero() {
            let cancelled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => true,
                _ = tokio::time::sleep(envelope.latency) => false,
            };
            if cancelled {
                discard(&inner, &envelope, DropReason::ShutDown);
                break;
            }
        }

        let Some(registry) = inner.upgrade() else {
            break;
        };
        if rng.random_bool(envelope.packet_loss) {
            registry.drop_message(&envelope.message.source, &envelope.target, DropReason::PacketLoss);
            continue;
        }
        registry.deliver(envelope);
    }

    rx.close();
    while let Ok(envelope) = rx.try_recv() {
        discard(&inner, &envelope, DropReason::ShutDown);
    }
    trace!("dispatcher stopped");
}

fn discard(inner: &Weak<Inner>, envelope: &Envelope, reason: DropReason) {
    if let Some(registry) = inner.upgrade() {
        registry.drop_message(&envelope.message.source, &envelope.target, reason);
    }
}
