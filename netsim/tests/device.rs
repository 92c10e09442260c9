//! Device actor behavior over a live registry.

mod common;

use std::net::Ipv4Addr;
use std::time::Duration;

use common::{iface, ospf};
use netsim::{
    ConnectionOptions, ConnectionRegistry, DeviceConfig, DeviceDescriptor, DeviceError,
    DeviceHandle, DeviceType, InterfaceConfig, Message, NextHop, OperationalState, Payload,
    RegistryConfig, SimRng,
};
use netsim_core::MacAddress;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const SETTLE: Duration = Duration::from_millis(100);

struct Bench {
    registry: ConnectionRegistry,
    cancel: CancellationToken,
}

impl Bench {
    fn new() -> Self {
        Self {
            registry: ConnectionRegistry::new(RegistryConfig::default(), SimRng::new(21)),
            cancel: CancellationToken::new(),
        }
    }

    fn link(&self, a: &str, ia: &str, b: &str, ib: &str) {
        self.registry
            .create_connection(a, b, ia, ib, ConnectionOptions::default())
            .expect("link");
    }

    fn spawn(&self, descriptor: DeviceDescriptor) -> DeviceHandle {
        self.spawn_with(descriptor, DeviceConfig::fast())
    }

    fn spawn_with(&self, descriptor: DeviceDescriptor, config: DeviceConfig) -> DeviceHandle {
        DeviceHandle::spawn(
            descriptor,
            self.registry.clone(),
            config,
            self.cancel.child_token(),
        )
        .expect("spawn")
    }
}

impl Drop for Bench {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn router(name: &str, ip: [u8; 4], networks: &[&str]) -> DeviceDescriptor {
    DeviceDescriptor::new(name, DeviceType::Router)
        .with_interface(iface("Gi0/0", ip))
        .with_protocol(ospf(networks))
}

/// Two routers on 10.0.12.0/24, each announcing one network of its own.
async fn router_pair(bench: &Bench) -> (DeviceHandle, DeviceHandle) {
    bench.link("r1", "Gi0/0", "r2", "Gi0/0");
    let r1 = bench.spawn(router("r1", [10, 0, 12, 1], &["10.0.12.0/24", "10.1.0.0/24"]));
    let r2 = bench.spawn(router("r2", [10, 0, 12, 2], &["10.0.12.0/24", "10.2.0.0/24"]));
    assert_eq!(r1.power_on().await, Ok(OperationalState::Operational));
    assert_eq!(r2.power_on().await, Ok(OperationalState::Operational));
    (r1, r2)
}

#[tokio::test(start_paused = true)]
async fn test_power_on_boots_and_raises_enabled_interfaces() {
    let bench = Bench::new();
    let r1 = bench.spawn(
        DeviceDescriptor::new("r1", DeviceType::Router)
            .with_interface(iface("Gi0/0", [10, 0, 0, 1]))
            .with_interface(InterfaceConfig::new("Gi0/1").with_enabled(false)),
    );

    let before = r1.snapshot().await.expect("snapshot");
    assert_eq!(before.state, OperationalState::Unpowered);
    assert!(before.interfaces.values().all(|up| !up));

    assert_eq!(r1.power_on().await, Ok(OperationalState::Operational));
    assert!(r1.is_operational().await.expect("state"));

    let interfaces = r1.interface_states().await.expect("interfaces");
    assert_eq!(interfaces.get("Gi0/0"), Some(&true));
    assert_eq!(interfaces.get("Gi0/1"), Some(&false));

    // Powering on a running device is a no-op.
    assert_eq!(r1.power_on().await, Ok(OperationalState::Operational));
}

#[tokio::test(start_paused = true)]
async fn test_pause_requires_an_operational_device() {
    let bench = Bench::new();
    let sw1 = bench.spawn(DeviceDescriptor::new("sw1", DeviceType::Switch));

    let err = sw1.pause().await.expect_err("unpowered device cannot pause");
    assert!(matches!(
        err,
        DeviceError::InvalidState {
            state: OperationalState::Unpowered,
            ..
        }
    ));
    assert!(sw1.resume().await.is_err());

    sw1.power_on().await.expect("power on");
    sw1.pause().await.expect("pause");
    assert_eq!(
        sw1.snapshot().await.expect("snapshot").state,
        OperationalState::Paused
    );
    sw1.resume().await.expect("resume");
    assert!(sw1.is_operational().await.expect("state"));
}

#[tokio::test(start_paused = true)]
async fn test_arp_discovery_learns_the_gateway() {
    let bench = Bench::new();
    bench.link("r1", "Gi0/0", "pc1", "eth0");
    let r1 = bench.spawn(router("r1", [10, 0, 1, 1], &["10.0.1.0/24"]));
    let pc1 = bench.spawn(
        DeviceDescriptor::new("pc1", DeviceType::Pc).with_interface(iface("eth0", [10, 0, 1, 10])),
    );
    r1.power_on().await.expect("r1 up");
    pc1.power_on().await.expect("pc1 up");

    assert_eq!(pc1.perform_arp_discovery().await, Ok(1));
    sleep(SETTLE).await;

    let arp = pc1.arp_table().await.expect("arp table");
    assert_eq!(
        arp.get(&Ipv4Addr::new(10, 0, 1, 1)),
        Some(&MacAddress::simulated("r1", "Gi0/0"))
    );
    let stats = pc1.statistics().await.expect("stats");
    assert_eq!(stats.arp_requests_sent, 1);
    assert_eq!(stats.received, 1);
}

#[tokio::test(start_paused = true)]
async fn test_arp_discovery_needs_an_operational_device() {
    let bench = Bench::new();
    bench.link("r1", "Gi0/0", "pc1", "eth0");
    let pc1 = bench.spawn(
        DeviceDescriptor::new("pc1", DeviceType::Pc).with_interface(iface("eth0", [10, 0, 1, 10])),
    );
    assert_eq!(pc1.perform_arp_discovery().await, Ok(0));
}

#[tokio::test(start_paused = true)]
async fn test_hello_builds_the_neighbor_table() {
    let bench = Bench::new();
    let (r1, r2) = router_pair(&bench).await;

    assert_eq!(r1.send_hello().await, Ok(1));
    sleep(SETTLE).await;

    let snapshot = r2.snapshot().await.expect("snapshot");
    let neighbor = snapshot.neighbors.get("r1").expect("r1 adjacency");
    assert_eq!(neighbor.router_id, Ipv4Addr::new(10, 0, 12, 1));
    assert_eq!(neighbor.protocol, "ospf");
    assert_eq!(neighbor.process_id.as_deref(), Some("1"));
    assert_eq!(neighbor.area, "0");
}

#[tokio::test(start_paused = true)]
async fn test_switch_ignores_hellos() {
    let bench = Bench::new();
    bench.link("r1", "Gi0/0", "sw1", "Fa0/1");
    let r1 = bench.spawn(router("r1", [10, 0, 1, 1], &["10.0.1.0/24"]));
    let sw1 = bench.spawn(
        DeviceDescriptor::new("sw1", DeviceType::Switch).with_interface(InterfaceConfig::new("Fa0/1")),
    );
    r1.power_on().await.expect("r1 up");
    sw1.power_on().await.expect("sw1 up");

    r1.send_hello().await.expect("hello");
    sleep(SETTLE).await;

    let snapshot = sw1.snapshot().await.expect("snapshot");
    assert!(snapshot.neighbors.is_empty());
    assert_eq!(snapshot.statistics.received, 1);
    // Switches never originate hellos.
    assert_eq!(sw1.send_hello().await, Ok(0));
}

#[tokio::test(start_paused = true)]
async fn test_periodic_hello_runs_without_prompting() {
    let bench = Bench::new();
    let (r1, r2) = router_pair(&bench).await;

    sleep(Duration::from_millis(2_500)).await;

    assert!(r1.statistics().await.expect("stats").hello_sent >= 2);
    assert!(r2
        .snapshot()
        .await
        .expect("snapshot")
        .neighbors
        .contains_key("r1"));
}

#[tokio::test(start_paused = true)]
async fn test_routing_update_installs_learned_routes() {
    let bench = Bench::new();
    let (r1, r2) = router_pair(&bench).await;

    r2.update_routing_table().await.expect("r2 routes");
    r1.update_routing_table().await.expect("r1 routes");
    sleep(SETTLE).await;

    let table = r2.routing_table().await.expect("table");
    assert_eq!(table.get("10.2.0.0/24"), Some(&NextHop::DirectlyConnected));
    assert_eq!(table.get("10.1.0.0/24"), Some(&NextHop::Via("r1".into())));
    // A directly connected network is never overwritten by an announcement.
    assert_eq!(table.get("10.0.12.0/24"), Some(&NextHop::DirectlyConnected));
    assert_eq!(r2.statistics().await.expect("stats").routing_updates, 1);
}

#[tokio::test(start_paused = true)]
async fn test_link_failure_purges_routes_through_the_neighbor() {
    let bench = Bench::new();
    bench.link("r1", "Gi0/0", "r2", "Gi0/0");
    bench.link("r3", "Gi0/0", "r2", "Gi0/1");
    let r1 = bench.spawn(router("r1", [10, 0, 12, 1], &["10.1.0.0/24"]));
    let r2 = bench.spawn(
        router("r2", [10, 0, 12, 2], &["10.2.0.0/24"])
            .with_interface(iface("Gi0/1", [10, 0, 23, 2])),
    );
    let r3 = bench.spawn(router("r3", [10, 0, 23, 3], &["10.3.0.0/24"]));
    for device in [&r1, &r2, &r3] {
        device.power_on().await.expect("power on");
    }
    r1.send_hello().await.expect("hello");
    r1.update_routing_table().await.expect("r1 routes");
    r3.update_routing_table().await.expect("r3 routes");
    sleep(SETTLE).await;
    assert_eq!(r2.routing_table().await.expect("table").len(), 2);

    bench.registry.disable("r1", "r2");
    assert_eq!(r2.handle_link_failure("r1").await, Ok(1));

    let snapshot = r2.snapshot().await.expect("snapshot");
    assert!(!snapshot.routing_table.values().any(|hop| hop.is_via("r1")));
    assert_eq!(
        snapshot.routing_table.get("10.3.0.0/24"),
        Some(&NextHop::Via("r3".into()))
    );
    assert!(!snapshot.neighbors.contains_key("r1"));
}

fn link_state(source: &str, target: &str, router_id: Ipv4Addr, sequence: u64) -> Message {
    Message::unicast(source, target, Payload::LinkStateUpdate { router_id, sequence })
}

#[tokio::test(start_paused = true)]
async fn test_link_failures_announce_increasing_sequences() {
    let bench = Bench::new();
    bench.link("r1", "Gi0/0", "r2", "Gi0/0");
    let mut r2_inbox = bench.registry.take_receiver("r2").expect("receiver");
    let r1 = bench.spawn(router("r1", [10, 0, 12, 1], &["10.1.0.0/24"]));
    r1.power_on().await.expect("power on");

    assert_eq!(r1.handle_link_failure("r3").await, Ok(1));
    assert_eq!(r1.handle_link_failure("r4").await, Ok(1));
    sleep(SETTLE).await;

    let mut sequences = Vec::new();
    while let Ok(message) = r2_inbox.try_recv() {
        if let Payload::LinkStateUpdate { router_id, sequence } = message.payload {
            assert_eq!(router_id, Ipv4Addr::new(10, 0, 12, 1));
            assert_eq!(message.source, "r1");
            sequences.push(sequence);
        }
    }
    assert_eq!(sequences, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_link_state_keeps_only_newer_sequences() {
    let bench = Bench::new();
    bench.link("r1", "Gi0/0", "r2", "Gi0/0");
    let r1 = bench.spawn(router("r1", [10, 0, 12, 1], &["10.1.0.0/24"]));
    r1.power_on().await.expect("power on");
    let origin = Ipv4Addr::new(10, 0, 12, 2);

    for sequence in [5, 3, 5] {
        assert!(bench
            .registry
            .send("r2", "r1", link_state("r2", "r1", origin, sequence)));
    }
    sleep(SETTLE).await;

    // The older and the repeated update are both ignored.
    let snapshot = r1.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.link_state.get(&origin), Some(&5));
    assert_eq!(snapshot.statistics.link_state_updates, 1);
    assert_eq!(snapshot.statistics.received, 3);

    assert!(bench
        .registry
        .send("r2", "r1", link_state("r2", "r1", origin, 6)));
    sleep(SETTLE).await;

    let snapshot = r1.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.link_state.get(&origin), Some(&6));
    assert_eq!(snapshot.statistics.link_state_updates, 2);
}

#[tokio::test(start_paused = true)]
async fn test_device_failure_clears_everything_and_discards_traffic() {
    let bench = Bench::new();
    let (r1, r2) = router_pair(&bench).await;
    r1.update_routing_table().await.expect("routes");
    r1.send_hello().await.expect("hello");
    r2.send_hello().await.expect("hello");
    sleep(SETTLE).await;

    r2.simulate_device_failure().await.expect("fail");
    let snapshot = r2.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.state, OperationalState::Failed);
    assert!(snapshot.routing_table.is_empty());
    assert!(snapshot.arp_table.is_empty());
    assert!(snapshot.neighbors.is_empty());
    assert_eq!(snapshot.interfaces_up(), 0);
    assert_eq!(snapshot.statistics.uptime_seconds, 0.0);

    let received = snapshot.statistics.received;
    r1.send_hello().await.expect("hello");
    sleep(SETTLE).await;
    let stats = r2.statistics().await.expect("stats");
    assert_eq!(stats.received, received);
    assert_eq!(stats.discarded, 1);

    // Stabilization leaves a failed device alone; only a power cycle restarts it.
    r2.mark_operational().await.expect("mark");
    assert!(!r2.is_operational().await.expect("state"));
    assert_eq!(r2.power_on().await, Ok(OperationalState::Operational));
}

#[tokio::test(start_paused = true)]
async fn test_interface_down_purges_dependent_routes() {
    let bench = Bench::new();
    bench.link("r1", "Gi0/0", "r2", "Gi0/0");
    let r1 = bench.spawn(
        router("r1", [10, 0, 12, 1], &["10.0.12.0/24", "10.1.0.0/24"])
            .with_interface(iface("Gi0/1", [10, 1, 0, 1])),
    );
    let r2 = bench.spawn(router("r2", [10, 0, 12, 2], &["10.2.0.0/24"]));
    r1.power_on().await.expect("r1 up");
    r2.power_on().await.expect("r2 up");
    r2.update_routing_table().await.expect("r2 routes");
    r2.send_hello().await.expect("hello");
    r1.update_routing_table().await.expect("r1 routes");
    sleep(SETTLE).await;
    assert_eq!(r1.routing_table().await.expect("table").len(), 3);

    r1.simulate_interface_down("Gi0/0").await.expect("down");

    let snapshot = r1.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.interfaces.get("Gi0/0"), Some(&false));
    assert_eq!(snapshot.interfaces.get("Gi0/1"), Some(&true));
    assert!(!snapshot.routing_table.contains_key("10.0.12.0/24"));
    assert!(!snapshot.routing_table.contains_key("10.2.0.0/24"));
    assert_eq!(
        snapshot.routing_table.get("10.1.0.0/24"),
        Some(&NextHop::DirectlyConnected)
    );
    assert!(snapshot.neighbors.is_empty());

    assert_eq!(
        r1.simulate_interface_down("Gi9/9").await,
        Err(DeviceError::UnknownInterface("Gi9/9".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_interface_change_toggles_the_first_interface() {
    let bench = Bench::new();
    bench.link("r1", "Gi0/0", "pc1", "eth0");
    let r1 = bench.spawn(router("r1", [10, 0, 1, 1], &["10.0.1.0/24"]));
    let pc1 = bench.spawn(
        DeviceDescriptor::new("pc1", DeviceType::Pc).with_interface(iface("eth0", [10, 0, 1, 10])),
    );
    r1.power_on().await.expect("r1 up");
    pc1.power_on().await.expect("pc1 up");
    r1.update_routing_table().await.expect("routes");

    assert_eq!(r1.simulate_interface_change().await, Ok(0));
    let down = r1.snapshot().await.expect("snapshot");
    assert_eq!(down.interfaces.get("Gi0/0"), Some(&false));
    assert!(down.routing_table.is_empty());

    // Coming back up triggers ARP discovery on the interface.
    assert_eq!(r1.simulate_interface_change().await, Ok(1));
    assert_eq!(
        r1.interface_states().await.expect("interfaces").get("Gi0/0"),
        Some(&true)
    );
}

#[tokio::test(start_paused = true)]
async fn test_paused_device_keeps_queued_messages() {
    let bench = Bench::new();
    let (r1, r2) = router_pair(&bench).await;
    r2.pause().await.expect("pause");

    assert_eq!(r1.ping("r2").await, Ok(1));
    sleep(SETTLE).await;
    assert_eq!(r2.statistics().await.expect("stats").received, 0);
    assert_eq!(bench.registry.statistics().queued_messages, 1);

    r2.resume().await.expect("resume");
    sleep(SETTLE).await;
    assert_eq!(r2.statistics().await.expect("stats").received, 1);
    assert_eq!(r1.statistics().await.expect("stats").ping_replies_received, 1);
}

#[tokio::test(start_paused = true)]
async fn test_ping_requires_an_operational_sender() {
    let bench = Bench::new();
    bench.link("r1", "Gi0/0", "r2", "Gi0/0");
    let r1 = bench.spawn(router("r1", [10, 0, 12, 1], &[]));
    let err = r1.ping("r2").await.expect_err("unpowered");
    assert!(matches!(err, DeviceError::InvalidState { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_reconverge_refreshes_routes_after_a_delay() {
    let bench = Bench::new();
    let (r1, _r2) = router_pair(&bench).await;

    assert_eq!(r1.reconverge().await, Ok(1));
    assert_eq!(r1.statistics().await.expect("stats").routing_updates, 0);

    sleep(SETTLE).await;
    let snapshot = r1.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.statistics.routing_updates, 1);
    assert_eq!(
        snapshot.routing_table.get("10.1.0.0/24"),
        Some(&NextHop::DirectlyConnected)
    );
}

#[tokio::test(start_paused = true)]
async fn test_mark_operational_skips_booting() {
    let bench = Bench::new();
    let pc1 = bench.spawn(
        DeviceDescriptor::new("pc1", DeviceType::Pc).with_interface(iface("eth0", [10, 0, 1, 10])),
    );
    pc1.mark_operational().await.expect("mark");
    let snapshot = pc1.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.state, OperationalState::Operational);
    assert_eq!(snapshot.interfaces_up(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_misrouted_message_is_not_counted() {
    let bench = Bench::new();
    bench.link("r1", "Gi0/0", "r2", "Gi0/0");
    let r2 = bench.spawn(router("r2", [10, 0, 12, 2], &[]));
    r2.power_on().await.expect("power on");

    let stray = Message::unicast("r1", "r9", Payload::Ping { sequence: 1 });
    assert!(bench.registry.send("r1", "r2", stray));
    sleep(SETTLE).await;

    assert_eq!(r2.statistics().await.expect("stats").received, 0);
    assert_eq!(bench.registry.statistics().delivered, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_joins_the_actor() {
    let bench = Bench::new();
    let mut sw1 = bench.spawn_with(
        DeviceDescriptor::new("sw1", DeviceType::Switch),
        DeviceConfig::fast().with_boot_delay(Duration::ZERO),
    );
    assert_eq!(sw1.power_on().await, Ok(OperationalState::Operational));
    assert!(sw1.is_running());

    sw1.stop(Duration::from_millis(100)).await;
    assert!(!sw1.is_running());
    assert_eq!(sw1.snapshot().await.expect_err("stopped"), DeviceError::Stopped);
}
