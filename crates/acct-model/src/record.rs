use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Adjunct side-tables that may or may not be present on a given record.
///
/// The wire layout keeps these as optional pointer-offset views; here they are
/// plain `Option`s, resolved to zero-filled sentinels by composers that need an
/// unconditional value (see [`Adjuncts::or_sentinel`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjuncts {
    pub vlan: Option<u16>,
    pub mpls_label: Option<u32>,
    pub nat_event: Option<u8>,
}

impl Adjuncts {
    /// Returns `self` if any adjunct is present, otherwise the zero-filled sentinel.
    /// Composers call this so they can read every field unconditionally.
    pub fn or_sentinel(self) -> Self {
        self
    }
}

/// TCP flag union accumulated across every packet that contributed to a record.
pub type TcpFlags = u8;

/// One aggregated traffic record as read off the ingest ring, before decoration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveRecord {
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub src_as: u32,
    pub dst_as: u32,
    pub adjuncts: Adjuncts,
    pub bytes: u64,
    pub packets: u64,
    pub flows: u64,
    pub tcp_flags: TcpFlags,
    pub first_seen: u64,
    pub last_seen: u64,
    /// Source MAC address, when the upstream collector captured layer 2
    /// (§4.3, §4.4 sum-by-MAC). `None` when unavailable.
    pub src_mac: Option<[u8; 6]>,
    /// Arbitrary custom fields carried in the variable-length trailer.
    pub trailer: Vec<(String, String)>,
}

impl PrimitiveRecord {
    /// Bucket index this record's packet-length distribution falls into, once
    /// C3's length-distribution decorator has run. `None` until decorated.
    pub fn stitch_interval(&self) -> u64 {
        self.last_seen.saturating_sub(self.first_seen)
    }
}

/// Which fields contribute to a record's [`Fingerprint`] — the `what_to_count` mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WhatToCount {
    pub src_host: bool,
    pub dst_host: bool,
    pub src_port: bool,
    pub dst_port: bool,
    pub protocol: bool,
    pub src_as: bool,
    pub dst_as: bool,
    /// Reduce `src_addr` to its network address under `net_prefix_len` rather
    /// than counting the full host address (sum-by-net).
    pub src_net: bool,
    /// Prefix length `src_net` masks `src_addr` down to, e.g. `24` for a /24.
    pub net_prefix_len: u8,
    /// Count by `src_mac` instead of the IP layer (sum-by-MAC).
    pub src_mac: bool,
}

impl WhatToCount {
    /// The full per-5-tuple fingerprint (every field counted individually).
    pub const fn per_flow() -> Self {
        Self {
            src_host: true,
            dst_host: true,
            src_port: true,
            dst_port: true,
            protocol: true,
            src_as: false,
            dst_as: false,
            src_net: false,
            net_prefix_len: 0,
            src_mac: false,
        }
    }
}

/// Canonical concatenation of the primitive fields selected by [`WhatToCount`].
/// Equality of fingerprints is cache-key equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    pub fn compute(record: &PrimitiveRecord, mask: WhatToCount) -> Self {
        let mut bytes = Vec::new();
        if mask.src_host {
            bytes.extend(ip_bytes(record.src_addr));
        }
        if mask.dst_host {
            bytes.extend(ip_bytes(record.dst_addr));
        }
        if mask.src_port {
            bytes.extend(record.src_port.to_be_bytes());
        }
        if mask.dst_port {
            bytes.extend(record.dst_port.to_be_bytes());
        }
        if mask.protocol {
            bytes.push(record.protocol);
        }
        if mask.src_as {
            bytes.extend(record.src_as.to_be_bytes());
        }
        if mask.dst_as {
            bytes.extend(record.dst_as.to_be_bytes());
        }
        if mask.src_net {
            bytes.extend(network_bytes(record.src_addr, mask.net_prefix_len));
        }
        if mask.src_mac {
            bytes.extend(record.src_mac.unwrap_or([0; 6]));
        }
        Self(bytes)
    }

    /// Resolves a `$`-placeholder name against the fields that make up this
    /// fingerprint's source record, for dynamic topic templating (§3 Topic Template).
    pub fn field(record: &PrimitiveRecord, name: &str) -> Option<String> {
        match name {
            "peer_src_ip" | "src_host" => Some(record.src_addr.to_string()),
            "peer_dst_ip" | "dst_host" => Some(record.dst_addr.to_string()),
            "src_port" => Some(record.src_port.to_string()),
            "dst_port" => Some(record.dst_port.to_string()),
            "proto" | "protocol" => Some(record.protocol.to_string()),
            "src_as" => Some(record.src_as.to_string()),
            "dst_as" => Some(record.dst_as.to_string()),
            _ => None,
        }
    }
}

fn ip_bytes(addr: IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// `addr` masked down to its network address under `prefix_len`, so two hosts
/// in the same subnet fingerprint identically (sum-by-net).
fn network_bytes(addr: IpAddr, prefix_len: u8) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => {
            let mask = if prefix_len == 0 { 0 } else { u32::MAX << (32 - prefix_len.min(32)) };
            (u32::from(v4) & mask).to_be_bytes().to_vec()
        }
        IpAddr::V6(v6) => {
            let mask = if prefix_len == 0 { 0 } else { u128::MAX << (128 - prefix_len.min(128)) };
            (u128::from(v6) & mask).to_be_bytes().to_vec()
        }
    }
}
