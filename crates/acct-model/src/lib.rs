//! Shared data model for the accounting-record shipping core: primitive
//! records, fingerprints, cache entries, basetime arithmetic, ring slot wire
//! layout, the refresh-deadline scheduler, and topic resolution.

mod basetime;
mod cache_entry;
mod record;
mod ring_slot;
mod scheduler;
mod topic;

pub use basetime::{advance_basetime, generation_for, Roundoff, TimeslotPeriod};
pub use cache_entry::{CacheEntry, Counters, EntryState};
pub use record::{Adjuncts, Fingerprint, PrimitiveRecord, TcpFlags, WhatToCount};
pub use ring_slot::{next_sequence, RingSlot, MAX_SEQNUM};
pub use scheduler::{min_timeout_ms, RefreshDeadline};
pub use topic::{TopicResolution, TopicResolver};
