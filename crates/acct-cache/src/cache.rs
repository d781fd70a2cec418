use crate::insert_policy::InsertPolicy;
use acct_model::{generation_for, CacheEntry, Fingerprint, PrimitiveRecord};
use std::collections::HashMap;

/// Configuration for the aggregation cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub policy: InsertPolicy,
    /// Width in seconds of the current accounting window.
    pub timeslot_secs: u64,
    /// Whether out-of-window records route to a historical generation
    /// instead of being dropped (§4.4, §9 historical mode).
    pub historical: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: InsertPolicy::PerFingerprint,
            timeslot_secs: 60,
            historical: false,
        }
    }
}

/// Plain, non-atomic counters — cache insertion runs on the single ingest
/// actor, so there is no concurrency to pay for here (mirrors the
/// `BatchMetrics` vs `ExportMetrics` split: plain counters where nothing is shared).
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheMetrics {
    pub inserts: u64,
    pub flushes: u64,
    pub entries_flushed: u64,
}

/// Keyed accumulator over traffic primitives (§4.4).
///
/// Entries are keyed by `(fingerprint, basetime)`; multiple generations can
/// coexist briefly at window boundaries when `historical` is enabled.
pub struct AggregationCache {
    config: CacheConfig,
    current_basetime: u64,
    generations: HashMap<u64, HashMap<Fingerprint, CacheEntry>>,
    metrics: CacheMetrics,
}

impl AggregationCache {
    pub fn new(config: CacheConfig, current_basetime: u64) -> Self {
        Self {
            config,
            current_basetime,
            generations: HashMap::new(),
            metrics: CacheMetrics::default(),
        }
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics
    }

    /// Routes `record` through the configured insert policy (§4.4).
    ///
    /// Invariant: a COMMITTED entry is immutable — this never mutates an entry
    /// already committed to a prior flush; a new entry is created instead.
    pub fn insert(&mut self, record: &PrimitiveRecord, now: u64) {
        let basetime = if self.config.historical {
            generation_for(record_basetime(record, self.config.timeslot_secs), self.current_basetime)
        } else {
            self.current_basetime
        };

        let fingerprint = self.config.policy.reduce(record);
        let generation = self.generations.entry(basetime).or_default();

        let entry = generation
            .entry(fingerprint.clone())
            .or_insert_with(|| CacheEntry::new(fingerprint, record.clone(), basetime));

        if !entry.is_committed() {
            entry.counters.add(
                record.bytes,
                record.packets,
                record.flows.max(1),
                record.tcp_flags,
                now,
            );
        }

        self.metrics.inserts += 1;
    }

    /// Flush event (§4.4): commits every `InUse` entry of the current
    /// generation plus any still-lagging historical generation (§9 historical
    /// mode — a generation older than `current_basetime` is always due), and
    /// snapshots the committed portion into a contiguous array before
    /// resetting the cache for the next window. The snapshot is handed to
    /// the caller (the publication engine); this cache never mutates it
    /// afterwards because the entries have already been removed here.
    pub fn handle_flush_event(&mut self, next_basetime: u64) -> Vec<CacheEntry> {
        let due_basetimes: Vec<u64> = self
            .generations
            .keys()
            .copied()
            .filter(|&basetime| basetime <= self.current_basetime)
            .collect();

        let mut snapshot = Vec::new();
        for basetime in due_basetimes {
            if let Some(generation) = self.generations.remove(&basetime) {
                snapshot.extend(generation.into_values());
            }
        }
        for entry in &mut snapshot {
            entry.commit();
        }

        self.metrics.flushes += 1;
        self.metrics.entries_flushed += snapshot.len() as u64;
        self.current_basetime = next_basetime;

        snapshot
    }

    /// Runs the (no-op by default) preprocessing hooks over a flush snapshot.
    /// A caller wanting to filter or reorder entries before publication
    /// installs a hook here; base configuration passes the snapshot through.
    pub fn preprocess(snapshot: Vec<CacheEntry>, hooks: &[fn(&mut Vec<CacheEntry>)]) -> Vec<CacheEntry> {
        let mut snapshot = snapshot;
        for hook in hooks {
            hook(&mut snapshot);
        }
        snapshot
    }
}

fn record_basetime(record: &PrimitiveRecord, timeslot_secs: u64) -> u64 {
    record.first_seen - (record.first_seen % timeslot_secs.max(1))
}
