//! Record decorator pipeline (C3, §4.3): pure, in-place enrichers applied to
//! every primitive record in a batch before it reaches the aggregation cache.
//! Order is significant: extractors populate adjuncts, then network
//! classification, then port remapping, then length-distribution bucketing.

use acct_model::PrimitiveRecord;
use std::collections::HashSet;
use std::net::IpAddr;

/// A single pure transform over a record, applied in place. Decorators never
/// fail (§4.3): there is no error return here.
pub trait Decorator: Send + Sync {
    fn decorate(&self, record: &mut PrimitiveRecord);
}

/// Zeroes `src_port`/`dst_port` when neither appears in the loaded allow-set
/// (§4.3 (c), §6 `ports_file`). An empty allow-set behaves as "allow all" —
/// representing the unconfigured / table-not-loaded case.
pub struct PortRemapper {
    allowed: HashSet<u16>,
}

impl PortRemapper {
    pub fn new(allowed: HashSet<u16>) -> Self {
        Self { allowed }
    }

    pub fn allow_all() -> Self {
        Self {
            allowed: HashSet::new(),
        }
    }
}

impl Decorator for PortRemapper {
    fn decorate(&self, record: &mut PrimitiveRecord) {
        if self.allowed.is_empty() {
            return;
        }
        if !self.allowed.contains(&record.src_port) {
            record.src_port = 0;
        }
        if !self.allowed.contains(&record.dst_port) {
            record.dst_port = 0;
        }
    }
}

/// One loaded network prefix, classified by a label (e.g. `"local"`, `"peer"`).
#[derive(Debug, Clone)]
pub struct NetworkPrefix {
    pub network: IpAddr,
    pub prefix_len: u8,
    pub label: String,
}

impl NetworkPrefix {
    fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(a)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix_len.min(32))
                };
                (u32::from(net) & mask) == (u32::from(a) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(a)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u128::MAX << (128 - self.prefix_len.min(128))
                };
                (u128::from(net) & mask) == (u128::from(a) & mask)
            }
            _ => false,
        }
    }
}

/// Classifies `src_addr`/`dst_addr` against a loaded prefix list (§4.3 (b),
/// §6 `networks_file`), recording the matching label in the record's
/// trailer. Re-running over an already-classified record replaces the same
/// trailer entries with the same values, so this is idempotent (§8).
pub struct NetworkClassifier {
    prefixes: Vec<NetworkPrefix>,
}

impl NetworkClassifier {
    pub fn new(prefixes: Vec<NetworkPrefix>) -> Self {
        Self { prefixes }
    }

    fn classify(&self, addr: IpAddr) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|p| p.contains(addr))
            .map(|p| p.label.as_str())
    }
}

impl Decorator for NetworkClassifier {
    fn decorate(&self, record: &mut PrimitiveRecord) {
        set_trailer_field(record, "src_net", self.classify(record.src_addr));
        set_trailer_field(record, "dst_net", self.classify(record.dst_addr));
    }
}

/// Buckets a record's average packet length (`bytes` / `packets`) into one of
/// the configured bin edges (§4.3 (d), §6 `pkt_len_distrib_bins_str`),
/// recording the bucket index in the trailer.
pub struct LengthDistributionBucketer {
    bin_edges: Vec<u64>,
}

impl LengthDistributionBucketer {
    pub fn new(bin_edges: Vec<u64>) -> Self {
        Self { bin_edges }
    }

    fn bucket_for(&self, value: u64) -> usize {
        self.bin_edges.iter().filter(|&&edge| value >= edge).count()
    }
}

impl Decorator for LengthDistributionBucketer {
    fn decorate(&self, record: &mut PrimitiveRecord) {
        if self.bin_edges.is_empty() {
            return;
        }
        let avg_len = record.bytes.checked_div(record.packets).unwrap_or(0);
        let bucket = self.bucket_for(avg_len);
        set_trailer_field(record, "len_bucket", Some(&bucket.to_string()));
    }
}

fn set_trailer_field(record: &mut PrimitiveRecord, key: &str, value: Option<&str>) {
    record.trailer.retain(|(k, _)| k != key);
    if let Some(value) = value {
        record.trailer.push((key.to_string(), value.to_string()));
    }
}

/// The ordered C3 pipeline: extractors (handled by adjuncts already being
/// present-or-absent on the wire record), then network classification, then
/// port remapping, then length-distribution bucketing.
pub struct DecoratorPipeline {
    decorators: Vec<Box<dyn Decorator>>,
}

impl DecoratorPipeline {
    pub fn new(decorators: Vec<Box<dyn Decorator>>) -> Self {
        Self { decorators }
    }

    pub fn decorate_batch(&self, records: &mut [PrimitiveRecord]) {
        for record in records {
            for decorator in &self.decorators {
                decorator.decorate(record);
            }
        }
    }
}
