//! Ingest-path error taxonomy (§7): fatal-to-process vs. recoverable.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The upstream collector process is no longer our parent (§4.2 step 3).
    /// Fatal-to-process.
    #[error("upstream collector is no longer our parent process")]
    UpstreamGone,

    /// The secondary transport's read failed. Recoverable with reconnect
    /// backoff (§7).
    #[error("secondary transport read failed: {0}")]
    SecondaryTransport(String),
}
