//! Topology descriptors handed over by the upstream parsing and discovery stages.
//!
//! Field names follow the upstream JSON hand-off (`deviceType`, `ipAddress`,
//! `routingProtocols`, `sourceDevice`, ...).

use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{SimulationError, SimulationResult};

/// Kind of simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Layer-3 device; the only type that runs routing protocols.
    Router,
    /// Layer-2 device.
    Switch,
    /// End host.
    Pc,
    /// Security appliance.
    Firewall,
}

impl DeviceType {
    /// Lowercase name used in events and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Router => "router",
            DeviceType::Switch => "switch",
            DeviceType::Pc => "pc",
            DeviceType::Firewall => "firewall",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "router" => Ok(DeviceType::Router),
            "switch" => Ok(DeviceType::Switch),
            "pc" => Ok(DeviceType::Pc),
            "firewall" => Ok(DeviceType::Firewall),
            other => Err(SimulationError::InvalidTopology(format!(
                "unknown device type '{other}'"
            ))),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// One interface of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceConfig {
    /// Interface name, unique within the device.
    pub name: String,
    /// Configured address, if any.
    #[serde(default)]
    pub ip_address: Option<Ipv4Addr>,
    /// Configured netmask, if any.
    #[serde(default)]
    pub subnet_mask: Option<Ipv4Addr>,
    /// Administrative state at power-on.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl InterfaceConfig {
    /// An enabled interface without an address.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip_address: None,
            subnet_mask: None,
            enabled: true,
        }
    }

    /// Set the address and mask.
    pub fn with_address(mut self, ip: Ipv4Addr, mask: Ipv4Addr) -> Self {
        self.ip_address = Some(ip);
        self.subnet_mask = Some(mask);
        self
    }

    /// Set the administrative state.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// One routing protocol instance configured on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingProtocolConfig {
    /// Protocol name (`ospf`, `eigrp`, `bgp`, `static`, ...).
    pub protocol: String,
    /// Process or AS number.
    #[serde(default)]
    pub process_id: Option<String>,
    /// Networks announced by this instance.
    #[serde(default)]
    pub networks: Vec<String>,
    /// Area, for link-state protocols.
    #[serde(default)]
    pub area: Option<String>,
}

impl RoutingProtocolConfig {
    /// A protocol instance with no networks.
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            process_id: None,
            networks: Vec::new(),
            area: None,
        }
    }

    /// Set the process id.
    pub fn with_process_id(mut self, process_id: impl Into<String>) -> Self {
        self.process_id = Some(process_id.into());
        self
    }

    /// Set the area.
    pub fn with_area(mut self, area: impl Into<String>) -> Self {
        self.area = Some(area.into());
        self
    }

    /// Add an announced network.
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.networks.push(network.into());
        self
    }

    /// Whether this instance exchanges hello packets with neighbors.
    ///
    /// Static routing is the only configured kind that stays silent.
    pub fn sends_hello(&self) -> bool {
        !self.protocol.eq_ignore_ascii_case("static")
    }
}

/// One device of the discovered network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Unique device name.
    pub name: String,
    /// Device kind.
    pub device_type: DeviceType,
    /// Interfaces, in configuration order.
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
    /// Routing protocol instances.
    #[serde(default)]
    pub routing_protocols: Vec<RoutingProtocolConfig>,
}

impl DeviceDescriptor {
    /// A device with no interfaces and no routing.
    pub fn new(name: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            name: name.into(),
            device_type,
            interfaces: Vec::new(),
            routing_protocols: Vec::new(),
        }
    }

    /// Add an interface.
    pub fn with_interface(mut self, interface: InterfaceConfig) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Add a routing protocol instance.
    pub fn with_protocol(mut self, protocol: RoutingProtocolConfig) -> Self {
        self.routing_protocols.push(protocol);
        self
    }

    /// Look up an interface by name.
    pub fn interface(&self, name: &str) -> Option<&InterfaceConfig> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// Whether the device is a router.
    pub fn is_router(&self) -> bool {
        self.device_type == DeviceType::Router
    }

    /// Whether any configured protocol instance sends hellos.
    pub fn speaks_hello(&self) -> bool {
        self.routing_protocols.iter().any(RoutingProtocolConfig::sends_hello)
    }

    /// Every network configured across all protocol instances, deduplicated,
    /// in configuration order.
    pub fn configured_networks(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.routing_protocols
            .iter()
            .flat_map(|rp| rp.networks.iter())
            .filter(|n| seen.insert(n.as_str()))
            .cloned()
            .collect()
    }
}

/// A physical link between two device interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDescriptor {
    /// One endpoint.
    pub source_device: String,
    /// The other endpoint.
    pub target_device: String,
    /// Interface used on `source_device`.
    pub source_interface: String,
    /// Interface used on `target_device`.
    pub target_interface: String,
    /// Bandwidth label as discovered (for example `1000Mbps`).
    #[serde(default)]
    pub bandwidth: Option<String>,
}

impl LinkDescriptor {
    /// A link without a bandwidth label.
    pub fn new(
        source_device: impl Into<String>,
        source_interface: impl Into<String>,
        target_device: impl Into<String>,
        target_interface: impl Into<String>,
    ) -> Self {
        Self {
            source_device: source_device.into(),
            target_device: target_device.into(),
            source_interface: source_interface.into(),
            target_interface: target_interface.into(),
            bandwidth: None,
        }
    }

    /// Set the bandwidth label.
    pub fn with_bandwidth(mut self, bandwidth: impl Into<String>) -> Self {
        self.bandwidth = Some(bandwidth.into());
        self
    }
}

/// The finished device and link lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Devices, in discovery order.
    #[serde(default)]
    pub devices: Vec<DeviceDescriptor>,
    /// Links between them.
    #[serde(default)]
    pub links: Vec<LinkDescriptor>,
}

impl Topology {
    /// Build a topology from its parts.
    pub fn new(devices: Vec<DeviceDescriptor>, links: Vec<LinkDescriptor>) -> Self {
        Self { devices, links }
    }

    /// Parse a topology from its JSON form.
    pub fn from_json_str(json: &str) -> SimulationResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a topology JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> SimulationResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Look up a device by name.
    pub fn device(&self, name: &str) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Check that every reference in the snapshot resolves.
    ///
    /// Rejects empty or duplicate device names, links to unknown devices,
    /// self-links and links naming undeclared interfaces.
    pub fn validate(&self) -> SimulationResult<()> {
        let mut names = HashSet::new();
        for device in &self.devices {
            if device.name.trim().is_empty() {
                return Err(SimulationError::InvalidTopology(
                    "device with an empty name".to_string(),
                ));
            }
            if !names.insert(device.name.as_str()) {
                return Err(SimulationError::InvalidTopology(format!(
                    "duplicate device '{}'",
                    device.name
                )));
            }
        }

        for link in &self.links {
            if link.source_device == link.target_device {
                return Err(SimulationError::InvalidTopology(format!(
                    "link from '{}' to itself",
                    link.source_device
                )));
            }
            for (device, interface) in [
                (&link.source_device, &link.source_interface),
                (&link.target_device, &link.target_interface),
            ] {
                let descriptor = self.device(device).ok_or_else(|| {
                    SimulationError::InvalidTopology(format!(
                        "link references unknown device '{device}'"
                    ))
                })?;
                if descriptor.interface(interface).is_none() {
                    return Err(SimulationError::InvalidTopology(format!(
                        "link references unknown interface '{interface}' on '{device}'"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "devices": [
            {
                "name": "r1",
                "deviceType": "router",
                "interfaces": [
                    {"name": "Gi0/0", "ipAddress": "10.0.0.1", "subnetMask": "255.255.255.0", "enabled": true},
                    {"name": "Gi0/1"}
                ],
                "routingProtocols": [
                    {"protocol": "ospf", "processId": "1", "networks": ["10.0.0.0 0.0.0.255"], "area": "0"}
                ]
            },
            {"name": "sw1", "deviceType": "switch", "interfaces": [{"name": "Fa0/1", "enabled": false}]}
        ],
        "links": [
            {"sourceDevice": "r1", "targetDevice": "sw1", "sourceInterface": "Gi0/0", "targetInterface": "Fa0/1", "bandwidth": "1000Mbps"}
        ]
    }"#;

    #[test]
    fn test_parse_upstream_json() {
        let topology = Topology::from_json_str(SAMPLE).expect("sample parses");

        assert_eq!(topology.devices.len(), 2);
        let r1 = topology.device("r1").expect("r1 present");
        assert_eq!(r1.device_type, DeviceType::Router);
        assert_eq!(
            r1.interfaces[0].ip_address,
            Some("10.0.0.1".parse().expect("ip"))
        );
        // Missing `enabled` defaults to true
        assert!(r1.interfaces[1].enabled);
        assert!(!topology.device("sw1").expect("sw1").interfaces[0].enabled);
        assert_eq!(topology.links[0].bandwidth.as_deref(), Some("1000Mbps"));
        assert!(topology.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_device() {
        let topology = Topology::new(
            vec![DeviceDescriptor::new("r1", DeviceType::Router)
                .with_interface(InterfaceConfig::new("Gi0/0"))],
            vec![LinkDescriptor::new("r1", "Gi0/0", "ghost", "eth0")],
        );

        let err = topology.validate().expect_err("unknown device rejected");
        assert!(matches!(err, SimulationError::InvalidTopology(_)));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_self_links() {
        let dup = Topology::new(
            vec![
                DeviceDescriptor::new("r1", DeviceType::Router),
                DeviceDescriptor::new("r1", DeviceType::Switch),
            ],
            vec![],
        );
        assert!(dup.validate().is_err());

        let self_link = Topology::new(
            vec![DeviceDescriptor::new("r1", DeviceType::Router)
                .with_interface(InterfaceConfig::new("a"))
                .with_interface(InterfaceConfig::new("b"))],
            vec![LinkDescriptor::new("r1", "a", "r1", "b")],
        );
        assert!(self_link.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_interface() {
        let topology = Topology::new(
            vec![
                DeviceDescriptor::new("r1", DeviceType::Router)
                    .with_interface(InterfaceConfig::new("Gi0/0")),
                DeviceDescriptor::new("pc1", DeviceType::Pc)
                    .with_interface(InterfaceConfig::new("eth0")),
            ],
            vec![LinkDescriptor::new("r1", "Gi0/9", "pc1", "eth0")],
        );
        assert!(topology.validate().is_err());
    }

    #[test]
    fn test_configured_networks_dedup() {
        let device = DeviceDescriptor::new("r1", DeviceType::Router)
            .with_protocol(
                RoutingProtocolConfig::new("ospf")
                    .with_network("10.0.0.0/24")
                    .with_network("10.0.1.0/24"),
            )
            .with_protocol(RoutingProtocolConfig::new("static").with_network("10.0.0.0/24"));

        assert_eq!(device.configured_networks(), vec!["10.0.0.0/24", "10.0.1.0/24"]);
        assert!(device.speaks_hello());
    }

    #[test]
    fn test_device_type_from_str() {
        assert_eq!("Router".parse::<DeviceType>().expect("router"), DeviceType::Router);
        assert!("mainframe".parse::<DeviceType>().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("topology.json");
        std::fs::write(&path, SAMPLE).expect("write sample");

        let topology = Topology::from_json_file(&path).expect("file parses");
        assert_eq!(topology.links.len(), 1);

        let missing = Topology::from_json_file(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(SimulationError::Io(_))));
    }
}
