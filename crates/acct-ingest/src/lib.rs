//! Refresh-deadline scheduling, ring consumption, and record decoration
//! (C1-C3): the ingest side of the accounting-record shipping core.

mod consumer;
mod decorator;
mod error;
mod reconnect;
mod resync;

pub use consumer::{ConsumeOutcome, RingConsumer};
#[cfg(unix)]
pub use consumer::ParentLiveness;
pub use decorator::{Decorator, DecoratorPipeline, LengthDistributionBucketer, NetworkClassifier, NetworkPrefix, PortRemapper};
pub use error::IngestError;
pub use reconnect::{ReconnectBackoff, ReconnectConfig};
pub use resync::{ResyncOutcome, ResyncTracker, MAX_RG_COUNT_ERR};
