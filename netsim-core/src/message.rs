//! Messages exchanged between simulated devices.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::MacAddress;

/// Type-specific content of a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Who owns `target_ip`?
    ArpRequest {
        /// Address of the asking interface.
        source_ip: Ipv4Addr,
        /// Address being resolved.
        target_ip: Ipv4Addr,
        /// Interface the request left from.
        interface: String,
    },
    /// Answer to an [`Payload::ArpRequest`].
    ArpReply {
        /// Resolved address.
        ip: Ipv4Addr,
        /// Hardware address owning it.
        mac: MacAddress,
    },
    /// Periodic adjacency announcement from a router.
    Hello {
        /// Protocol instance sending the hello.
        protocol: String,
        /// Process or AS number.
        process_id: Option<String>,
        /// Area of the instance (`0` when unset).
        area: String,
        /// Router id of the sender.
        router_id: Ipv4Addr,
    },
    /// Networks reachable through the sender.
    RoutingUpdate {
        /// Announced networks.
        networks: Vec<String>,
    },
    /// Echo request.
    Ping {
        /// Correlates the reply.
        sequence: u64,
    },
    /// Echo reply.
    PingReply {
        /// Sequence of the answered ping.
        sequence: u64,
    },
    /// Reconvergence announcement after a topology change.
    LinkStateUpdate {
        /// Router id of the originator.
        router_id: Ipv4Addr,
        /// Monotonically increasing per originator.
        sequence: u64,
    },
}

/// Discriminant of a [`Payload`], for counting and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// [`Payload::ArpRequest`]
    ArpRequest,
    /// [`Payload::ArpReply`]
    ArpReply,
    /// [`Payload::Hello`]
    Hello,
    /// [`Payload::RoutingUpdate`]
    RoutingUpdate,
    /// [`Payload::Ping`]
    Ping,
    /// [`Payload::PingReply`]
    PingReply,
    /// [`Payload::LinkStateUpdate`]
    LinkStateUpdate,
}

impl MessageKind {
    /// Wire tag of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::ArpRequest => "arp_request",
            MessageKind::ArpReply => "arp_reply",
            MessageKind::Hello => "hello",
            MessageKind::RoutingUpdate => "routing_update",
            MessageKind::Ping => "ping",
            MessageKind::PingReply => "ping_reply",
            MessageKind::LinkStateUpdate => "link_state_update",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Payload {
    /// Discriminant of this payload.
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::ArpRequest { .. } => MessageKind::ArpRequest,
            Payload::ArpReply { .. } => MessageKind::ArpReply,
            Payload::Hello { .. } => MessageKind::Hello,
            Payload::RoutingUpdate { .. } => MessageKind::RoutingUpdate,
            Payload::Ping { .. } => MessageKind::Ping,
            Payload::PingReply { .. } => MessageKind::PingReply,
            Payload::LinkStateUpdate { .. } => MessageKind::LinkStateUpdate,
        }
    }
}

/// A message between two devices.
///
/// `target == None` marks a broadcast: the sender hands one copy to every
/// enabled neighbor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Sending device.
    pub source: String,
    /// Receiving device, `None` for broadcasts.
    pub target: Option<String>,
    /// Content.
    #[serde(flatten)]
    pub payload: Payload,
}

impl Message {
    /// A message for every enabled neighbor of `source`.
    pub fn broadcast(source: impl Into<String>, payload: Payload) -> Self {
        Self {
            source: source.into(),
            target: None,
            payload,
        }
    }

    /// A message for one device.
    pub fn unicast(source: impl Into<String>, target: impl Into<String>, payload: Payload) -> Self {
        Self {
            source: source.into(),
            target: Some(target.into()),
            payload,
        }
    }

    /// Discriminant of the payload.
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// Whether the message was sent as a broadcast.
    pub fn is_broadcast(&self) -> bool {
        self.target.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_json_is_tagged() {
        let msg = Message::unicast("r1", "r2", Payload::Ping { sequence: 7 });
        let json = serde_json::to_value(&msg).expect("serialize");

        assert_eq!(json["type"], "ping");
        assert_eq!(json["source"], "r1");
        assert_eq!(json["target"], "r2");
        assert_eq!(json["sequence"], 7);
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        let msg = Message::broadcast(
            "r1",
            Payload::LinkStateUpdate {
                router_id: Ipv4Addr::new(10, 0, 0, 1),
                sequence: 1,
            },
        );
        let json = serde_json::to_value(&msg).expect("serialize");

        assert!(msg.is_broadcast());
        assert_eq!(json["type"], msg.kind().as_str());
    }
}
