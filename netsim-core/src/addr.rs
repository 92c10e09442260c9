//! IPv4 network and MAC helpers.
//!
//! Routing tables carry network strings exactly as the configuration parser
//! produced them (`10.0.0.0/24`, `10.0.0.0 255.255.255.0` or the OSPF
//! wildcard form `10.0.0.0 0.0.0.255`). [`Ipv4Network`] parses all three so
//! routes can be matched against interface addresses.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Vendor prefix used for every simulated MAC address.
const SIMULATED_OUI: [u8; 3] = [0x00, 0x50, 0x56];

/// Prefix length assumed when an interface has an address but no mask.
const DEFAULT_PREFIX_LEN: u8 = 24;

/// 64-bit FNV-1a hash.
///
/// Simulated identities (MAC addresses, fallback router ids) must not change
/// between builds, which rules out `std`'s randomized hasher.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes.iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

/// Conventional gateway of the subnet `ip` lives in: same network, host part `1`.
///
/// A missing mask is treated as a /24.
pub fn gateway_for(ip: Ipv4Addr, mask: Option<Ipv4Addr>) -> Ipv4Addr {
    let mask = mask.map(u32::from).unwrap_or_else(|| prefix_to_mask(DEFAULT_PREFIX_LEN));
    Ipv4Addr::from((u32::from(ip) & mask) | 1)
}

fn prefix_to_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len.min(32)))
    }
}

fn mask_to_prefix(mask: u32) -> Option<u8> {
    if mask.leading_ones() + mask.trailing_zeros() == 32 {
        Some(mask.leading_ones() as u8)
    } else {
        None
    }
}

/// Errors produced while parsing a network string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkParseError {
    /// The address part is not a dotted IPv4 address.
    #[error("invalid address in '{0}'")]
    InvalidAddress(String),
    /// The prefix length or mask is not usable.
    #[error("invalid mask in '{0}'")]
    InvalidMask(String),
}

/// An IPv4 network: base address plus prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv4Network {
    base: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Network {
    /// Build a network from an address and prefix length, clearing host bits.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, NetworkParseError> {
        if prefix_len > 32 {
            return Err(NetworkParseError::InvalidMask(format!("{addr}/{prefix_len}")));
        }
        let base = Ipv4Addr::from(u32::from(addr) & prefix_to_mask(prefix_len));
        Ok(Self { base, prefix_len })
    }

    /// Build a network from an address and a dotted mask.
    ///
    /// Accepts both netmasks (`255.255.255.0`) and wildcard masks
    /// (`0.0.0.255`). A mask is read as a netmask first, so `0.0.0.0` is
    /// the default route.
    pub fn with_mask(addr: Ipv4Addr, mask: Ipv4Addr) -> Result<Self, NetworkParseError> {
        let raw = u32::from(mask);
        let prefix = mask_to_prefix(raw)
            .or_else(|| mask_to_prefix(!raw))
            .ok_or_else(|| NetworkParseError::InvalidMask(format!("{addr} {mask}")))?;
        Self::new(addr, prefix)
    }

    /// Network base address.
    pub fn base(&self) -> Ipv4Addr {
        self.base
    }

    /// Prefix length in bits.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Whether `ip` falls inside this network.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let mask = prefix_to_mask(self.prefix_len);
        u32::from(ip) & mask == u32::from(self.base)
    }
}

impl FromStr for Ipv4Network {
    type Err = NetworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut parts = trimmed.split_whitespace();
        let first = parts
            .next()
            .ok_or_else(|| NetworkParseError::InvalidAddress(s.to_string()))?;

        if let Some((addr, len)) = first.split_once('/') {
            let addr: Ipv4Addr = addr
                .parse()
                .map_err(|_| NetworkParseError::InvalidAddress(s.to_string()))?;
            let len: u8 = len
                .parse()
                .map_err(|_| NetworkParseError::InvalidMask(s.to_string()))?;
            return Self::new(addr, len);
        }

        let addr: Ipv4Addr = first
            .parse()
            .map_err(|_| NetworkParseError::InvalidAddress(s.to_string()))?;
        match parts.next().map(str::parse::<Ipv4Addr>) {
            Some(Ok(mask)) => Self::with_mask(addr, mask),
            Some(Err(_)) => Err(NetworkParseError::InvalidMask(s.to_string())),
            None => Self::new(addr, 32),
        }
    }
}

impl fmt::Display for Ipv4Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix_len)
    }
}

/// A 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Wrap raw octets.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Deterministic simulated address for one interface of one device.
    pub fn simulated(device: &str, interface: &str) -> Self {
        let hash = fnv1a(format!("{device}:{interface}").as_bytes());
        let suffix = (hash & 0x00FF_FFFF) as u32;
        let [_, b3, b4, b5] = suffix.to_be_bytes();
        Self([
            SIMULATED_OUI[0],
            SIMULATED_OUI[1],
            SIMULATED_OUI[2],
            b3,
            b4,
            b5,
        ])
    }

    /// Raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = NetworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut count = 0;
        for (i, part) in s.split(':').enumerate() {
            if i >= 6 {
                return Err(NetworkParseError::InvalidAddress(s.to_string()));
            }
            octets[i] = u8::from_str_radix(part, 16)
                .map_err(|_| NetworkParseError::InvalidAddress(s.to_string()))?;
            count += 1;
        }
        if count != 6 {
            return Err(NetworkParseError::InvalidAddress(s.to_string()));
        }
        Ok(Self(octets))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
