//! Sequence-number resynchronization protocol for the ring consumer (C2, §4.2
//! steps 6-9): the sole consistency mechanism between the external producer
//! and this consumer, since there is no mutex between them.

use acct_model::next_sequence;
#[cfg(test)]
use acct_model::MAX_SEQNUM;
use tracing::warn;

/// Sustained mismatches before a warning is logged, even outside debug builds
/// (§4.2 step 7: "if debug or `rg_err_count > MAX_RG_COUNT_ERR` log").
pub const MAX_RG_COUNT_ERR: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncOutcome {
    /// The slot's sequence matched the expected counter; the consumer advanced.
    InOrder,
    /// First mismatch on a fresh wake-up: caller should repoll without
    /// resyncing yet, in case another writer signal is in flight.
    PollAgain,
    /// A sustained mismatch: the consumer adopted the producer's recorded
    /// last-written sequence.
    Resynced { adopted: u32 },
}

/// Per-consumer resync state (§4.2): the expected sequence counter plus the
/// two-step repoll-then-resync protocol's own flags.
#[derive(Debug)]
pub struct ResyncTracker {
    expected: u32,
    pollagain: bool,
    rg_err_count: u32,
}

impl ResyncTracker {
    /// Sequence numbering starts at 1; 0 means "uninitialized slot" and is
    /// never a valid `expected` value (§3 Ring Buffer Slot, §8 wrap boundary).
    pub fn new() -> Self {
        Self {
            expected: 1,
            pollagain: false,
            rg_err_count: 0,
        }
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    pub fn rg_err_count(&self) -> u32 {
        self.rg_err_count
    }

    /// Observes one slot's sequence number, advancing or resyncing the
    /// tracker's expectation per §4.2 steps 6-9.
    ///
    /// `last_written_seq` is the producer's recorded "last written" sequence,
    /// consulted only when a resync is needed.
    pub fn observe(&mut self, slot_seq: u32, last_written_seq: u32) -> ResyncOutcome {
        if slot_seq == self.expected {
            self.pollagain = false;
            self.expected = next_sequence(self.expected);
            return ResyncOutcome::InOrder;
        }

        if !self.pollagain {
            self.pollagain = true;
            return ResyncOutcome::PollAgain;
        }

        self.rg_err_count += 1;
        if cfg!(debug_assertions) || self.rg_err_count > MAX_RG_COUNT_ERR {
            warn!(
                expected = self.expected,
                got = slot_seq,
                rg_err_count = self.rg_err_count,
                "ring sequence mismatch persisted; resynchronizing"
            );
        }

        self.pollagain = false;
        self.expected = last_written_seq;
        ResyncOutcome::Resynced {
            adopted: last_written_seq,
        }
    }
}

impl Default for ResyncTracker {
    fn default() -> Self {
        Self::new()
    }
}
