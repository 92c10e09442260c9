//! Topologies and helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::Ipv4Addr;

use netsim::{
    DeviceDescriptor, DeviceType, InterfaceConfig, LinkDescriptor, RoutingProtocolConfig,
    SimulationConfig, Topology,
};

pub const MASK_24: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

pub fn iface(name: &str, ip: [u8; 4]) -> InterfaceConfig {
    InterfaceConfig::new(name).with_address(Ipv4Addr::from(ip), MASK_24)
}

pub fn ospf(networks: &[&str]) -> RoutingProtocolConfig {
    networks.iter().fold(
        RoutingProtocolConfig::new("ospf").with_process_id("1"),
        |rp, net| rp.with_network(*net),
    )
}

/// Router `r1`, switch `sw1` and host `pc1`, linked in a triangle.
pub fn campus() -> Topology {
    let r1 = DeviceDescriptor::new("r1", DeviceType::Router)
        .with_interface(iface("Gi0/0", [10, 0, 1, 1]))
        .with_interface(iface("Gi0/1", [10, 0, 2, 1]))
        .with_protocol(ospf(&["10.0.1.0/24", "10.0.2.0/24"]));
    let sw1 = DeviceDescriptor::new("sw1", DeviceType::Switch)
        .with_interface(InterfaceConfig::new("Fa0/1"))
        .with_interface(InterfaceConfig::new("Fa0/2"));
    let pc1 = DeviceDescriptor::new("pc1", DeviceType::Pc)
        .with_interface(iface("eth0", [10, 0, 1, 10]))
        .with_interface(iface("eth1", [10, 0, 2, 10]));

    Topology::new(
        vec![pc1, sw1, r1],
        vec![
            LinkDescriptor::new("r1", "Gi0/0", "sw1", "Fa0/1"),
            LinkDescriptor::new("sw1", "Fa0/2", "pc1", "eth0"),
            LinkDescriptor::new("r1", "Gi0/1", "pc1", "eth1"),
        ],
    )
}

/// Three routers in a triangle, each announcing one network of its own.
///
/// `rN` owns `10.N.0.0/24` on `Gi0/0`; the links use `Gi0/1` and `Gi0/2`.
pub fn router_triangle() -> Topology {
    let router = |n: u8| {
        DeviceDescriptor::new(format!("r{n}"), DeviceType::Router)
            .with_interface(iface("Gi0/0", [10, n, 0, 1]))
            .with_interface(iface("Gi0/1", [172, 16, n, 1]))
            .with_interface(iface("Gi0/2", [172, 17, n, 1]))
            .with_protocol(ospf(&[format!("10.{n}.0.0/24").as_str()]))
    };

    Topology::new(
        vec![router(1), router(2), router(3)],
        vec![
            LinkDescriptor::new("r1", "Gi0/1", "r2", "Gi0/1"),
            LinkDescriptor::new("r2", "Gi0/2", "r3", "Gi0/1"),
            LinkDescriptor::new("r3", "Gi0/2", "r1", "Gi0/2"),
        ],
    )
}

pub fn config(seed: u64) -> SimulationConfig {
    SimulationConfig::fast().with_seed(seed)
}

pub fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
