//! Ring consumer (C2, §4.2): reads slots from the SPSC channel standing in
//! for the shared-memory ring (§9 "ownership-friendly equivalent"),
//! validates sequence numbers via [`crate::resync::ResyncTracker`], and
//! optionally falls back to a secondary broker transport on read failure.

use crate::error::IngestError;
use crate::resync::{ResyncOutcome, ResyncTracker};
use acct_model::{PrimitiveRecord, RingSlot};
use acct_stream::{RingReceiver, StreamExt};
use std::time::Duration;

#[derive(Debug, PartialEq)]
pub enum ConsumeOutcome {
    /// A validated batch of records from one ring slot.
    Batch {
        records: Vec<PrimitiveRecord>,
        producer_pid: u32,
    },
    /// No slot was ready within the timeout, or a resync repoll is in
    /// flight — the caller's own deadline bookkeeping decides what to do
    /// next (§4.2 step 2).
    Timeout,
    /// The upstream closed its side of the channel (zero-length read):
    /// orderly shutdown, not an error (§7 Silent).
    Closed,
}

/// Wraps one producer's `RingReceiver<RingSlot>` with the resync protocol.
///
/// A slot that fails validation on its first mismatch is held in
/// `pending_slot` rather than dropped: the shared-memory original leaves the
/// ring pointer unadvanced on a repoll, and this is the channel-based
/// equivalent of "the same slot is there to inspect again".
pub struct RingConsumer {
    receiver: RingReceiver<RingSlot>,
    resync: ResyncTracker,
    pending_slot: Option<RingSlot>,
}

impl RingConsumer {
    pub fn new(receiver: RingReceiver<RingSlot>) -> Self {
        Self {
            receiver,
            resync: ResyncTracker::new(),
            pending_slot: None,
        }
    }

    pub fn expected_sequence(&self) -> u32 {
        self.resync.expected()
    }

    /// Blocks up to `timeout_ms` for the next slot (§4.2 public contract).
    /// `last_written_seq` is the producer's recorded last-written sequence,
    /// consulted only if a resync is needed.
    pub async fn next_batch(
        &mut self,
        timeout_ms: u64,
        last_written_seq: u32,
    ) -> Result<ConsumeOutcome, IngestError> {
        let slot = match self.pending_slot.take() {
            Some(slot) => slot,
            None => {
                let wait =
                    tokio::time::timeout(Duration::from_millis(timeout_ms), self.receiver.next()).await;
                match wait {
                    Err(_elapsed) => return Ok(ConsumeOutcome::Timeout),
                    Ok(None) => return Ok(ConsumeOutcome::Closed),
                    Ok(Some(slot)) => slot,
                }
            }
        };

        match self.resync.observe(slot.sequence, last_written_seq) {
            ResyncOutcome::PollAgain => {
                self.pending_slot = Some(slot);
                Ok(ConsumeOutcome::Timeout)
            }
            ResyncOutcome::InOrder | ResyncOutcome::Resynced { .. } => Ok(ConsumeOutcome::Batch {
                records: slot.records,
                producer_pid: slot.core_pid,
            }),
        }
    }
}

/// Parent-liveness check (§4.2 step 3): the upstream collector is assumed to
/// be our parent process; if our parent has changed (typically to pid 1 on
/// Linux, after the real parent exits), the ingest loop must exit.
#[cfg(unix)]
pub struct ParentLiveness {
    original_parent: u32,
}

#[cfg(unix)]
impl ParentLiveness {
    pub fn capture() -> Self {
        Self {
            original_parent: unsafe { libc::getppid() as u32 },
        }
    }

    pub fn check(&self) -> Result<(), IngestError> {
        let current_parent = unsafe { libc::getppid() as u32 };
        if current_parent != self.original_parent {
            return Err(IngestError::UpstreamGone);
        }
        Ok(())
    }
}
