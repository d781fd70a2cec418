use acct_model::{Fingerprint, PrimitiveRecord, WhatToCount};

/// Aggregation-mode dispatch resolved once from the counting mask at startup
/// (§9 "Polymorphic insert function"): the five named strategies plus the
/// default per-fingerprint policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPolicy {
    SumByHost,
    /// Aggregates by `src_addr` masked to `prefix_len` bits, so hosts sharing
    /// a subnet collapse into one entry.
    SumByNet { prefix_len: u8 },
    SumByPort,
    SumByAs,
    SumByMac,
    PerFingerprint,
}

impl InsertPolicy {
    /// The reduced key this policy aggregates on, collapsing the full
    /// fingerprint down to only the dimension the policy names.
    pub fn reduce(self, record: &PrimitiveRecord) -> Fingerprint {
        let mask = match self {
            Self::SumByHost => WhatToCount {
                src_host: true,
                ..WhatToCount::default()
            },
            Self::SumByNet { prefix_len } => WhatToCount {
                src_net: true,
                net_prefix_len: prefix_len,
                ..WhatToCount::default()
            },
            Self::SumByPort => WhatToCount {
                src_port: true,
                dst_port: true,
                ..WhatToCount::default()
            },
            Self::SumByAs => WhatToCount {
                src_as: true,
                ..WhatToCount::default()
            },
            Self::SumByMac => WhatToCount {
                src_mac: true,
                ..WhatToCount::default()
            },
            Self::PerFingerprint => WhatToCount::per_flow(),
        };
        Fingerprint::compute(record, mask)
    }
}
