//! Aggregation cache and flush snapshot engine (C4): keyed accumulation of
//! traffic primitives by fingerprint, with pluggable insert policies and a
//! committed-entry flush path the publication engine consumes.

mod cache;
mod insert_policy;

pub use cache::{AggregationCache, CacheConfig, CacheMetrics};
pub use insert_policy::InsertPolicy;
