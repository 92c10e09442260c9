//! The undirected link table entry.

use std::time::Duration;

/// Unordered pair of device names, normalized so `(a, b)` and `(b, a)` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct LinkKey {
    low: String,
    high: String,
}

impl LinkKey {
    pub(crate) fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                low: a.to_string(),
                high: b.to_string(),
            }
        } else {
            Self {
                low: b.to_string(),
                high: a.to_string(),
            }
        }
    }
}

/// One physical link between two device interfaces.
///
/// The registry stores a single entry per unordered device pair, so both
/// directions always see the same `enabled`, latency and loss values.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    /// First endpoint, as given at creation.
    pub device_a: String,
    /// Interface used on `device_a`.
    pub interface_a: String,
    /// Second endpoint.
    pub device_b: String,
    /// Interface used on `device_b`.
    pub interface_b: String,
    /// Whether sends are currently accepted.
    pub enabled: bool,
    /// Simulated propagation delay.
    pub latency: Duration,
    /// Probability that a message is lost in transit.
    pub packet_loss: f64,
    /// Bandwidth label.
    pub bandwidth: Option<String>,
}

impl Connection {
    /// Latency in seconds.
    pub fn latency_seconds(&self) -> f64 {
        self.latency.as_secs_f64()
    }

    /// Whether `device` is one of the endpoints.
    pub fn touches(&self, device: &str) -> bool {
        self.device_a == device || self.device_b == device
    }

    /// The endpoint opposite `device`.
    pub fn peer_of(&self, device: &str) -> Option<&str> {
        if self.device_a == device {
            Some(&self.device_b)
        } else if self.device_b == device {
            Some(&self.device_a)
        } else {
            None
        }
    }

    /// Interface the link uses on `device`.
    pub fn interface_of(&self, device: &str) -> Option<&str> {
        if self.device_a == device {
            Some(&self.interface_a)
        } else if self.device_b == device {
            Some(&self.interface_b)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_key_is_unordered() {
        assert_eq!(LinkKey::new("r1", "sw1"), LinkKey::new("sw1", "r1"));
        assert_ne!(LinkKey::new("r1", "sw1"), LinkKey::new("r1", "sw2"));
    }

    #[test]
    fn test_endpoint_lookup() {
        let conn = Connection {
            device_a: "r1".into(),
            interface_a: "Gi0/0".into(),
            device_b: "sw1".into(),
            interface_b: "Fa0/1".into(),
            enabled: true,
            latency: Duration::from_millis(1),
            packet_loss: 0.0,
            bandwidth: None,
        };

        assert_eq!(conn.peer_of("r1"), Some("sw1"));
        assert_eq!(conn.interface_of("sw1"), Some("Fa0/1"));
        assert_eq!(conn.peer_of("pc1"), None);
        assert!(conn.touches("sw1"));
        assert_eq!(conn.latency_seconds(), 0.001);
    }
}
