//! Ordering and wiring derived from a topology snapshot.

use std::time::Duration;

use netsim_core::{DeviceDescriptor, DeviceType, LinkDescriptor, Topology};

use crate::network::ConnectionOptions;

/// Device types powered on during startup, in order. Other types come up
/// when the network is stabilized.
pub const POWER_ON_ORDER: [DeviceType; 3] =
    [DeviceType::Router, DeviceType::Switch, DeviceType::Firewall];

/// Devices to power on, grouped by [`POWER_ON_ORDER`], topology order within a group.
pub fn startup_order(topology: &Topology) -> Vec<&DeviceDescriptor> {
    POWER_ON_ORDER
        .iter()
        .flat_map(|device_type| {
            topology
                .devices
                .iter()
                .filter(move |d| d.device_type == *device_type)
        })
        .collect()
}

/// Every router, in topology order.
pub fn routers(topology: &Topology) -> Vec<&DeviceDescriptor> {
    topology.devices.iter().filter(|d| d.is_router()).collect()
}

/// Routers with a hello-speaking protocol instance.
pub fn hello_routers(topology: &Topology) -> Vec<&DeviceDescriptor> {
    topology
        .devices
        .iter()
        .filter(|d| d.is_router() && d.speaks_hello())
        .collect()
}

/// Connection parameters for a topology link.
pub fn connection_options(link: &LinkDescriptor, base_latency: Duration) -> ConnectionOptions {
    ConnectionOptions::default()
        .with_latency(base_latency)
        .with_bandwidth(link.bandwidth.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsim_core::RoutingProtocolConfig;

    #[test]
    fn test_startup_order_groups_by_type() {
        let topology = Topology::new(
            vec![
                DeviceDescriptor::new("pc1", DeviceType::Pc),
                DeviceDescriptor::new("fw1", DeviceType::Firewall),
                DeviceDescriptor::new("sw1", DeviceType::Switch),
                DeviceDescriptor::new("r1", DeviceType::Router),
                DeviceDescriptor::new("r2", DeviceType::Router),
            ],
            Vec::new(),
        );

        let names: Vec<&str> = startup_order(&topology)
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, ["r1", "r2", "sw1", "fw1"]);
    }

    #[test]
    fn test_hello_routers_skip_static() {
        let topology = Topology::new(
            vec![
                DeviceDescriptor::new("r1", DeviceType::Router)
                    .with_protocol(RoutingProtocolConfig::new("ospf")),
                DeviceDescriptor::new("r2", DeviceType::Router)
                    .with_protocol(RoutingProtocolConfig::new("static")),
                DeviceDescriptor::new("sw1", DeviceType::Switch)
                    .with_protocol(RoutingProtocolConfig::new("ospf")),
            ],
            Vec::new(),
        );

        let names: Vec<&str> = hello_routers(&topology)
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, ["r1"]);

        let names: Vec<&str> = routers(&topology)
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, ["r1", "r2"]);
    }
}
