//! Per-stage generation counters.
//!
//! Every issued request carries a [`Ticket`]. A completed request is applied
//! only while its ticket is still the live one for its stage; anything older
//! is discarded as [`Error::Stale`]. In-flight I/O is never cancelled.

use scope_core::error::{Error, Result};
use scope_core::types::StageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub stage: StageKind,
    pub generation: u64,
}

#[derive(Debug, Default, Clone)]
pub struct Generations {
    live: [u64; 3],
    pending: [bool; 3],
}

impl Generations {
    pub fn new() -> Self { Self::default() }

    /// Start a new request for `stage`, superseding any earlier one.
    pub fn issue(&mut self, stage: StageKind) -> Ticket {
        let slot = stage.slot();
        self.live[slot] += 1;
        self.pending[slot] = true;
        Ticket { stage, generation: self.live[slot] }
    }

    /// Supersede whatever is in flight for `stage` without issuing a new request.
    pub fn invalidate(&mut self, stage: StageKind) {
        let slot = stage.slot();
        self.live[slot] += 1;
        self.pending[slot] = false;
    }

    pub fn live(&self, stage: StageKind) -> u64 { self.live[stage.slot()] }

    pub fn is_live(&self, ticket: Ticket) -> bool { ticket.generation == self.live(ticket.stage) }

    /// True while the live request of `stage` has not resolved.
    pub fn is_pending(&self, stage: StageKind) -> bool { self.pending[stage.slot()] }

    /// Accept a completed ticket. Fails with `Stale` if it was superseded.
    pub fn resolve(&mut self, ticket: Ticket) -> Result<()> {
        let current = self.live(ticket.stage);
        if ticket.generation != current || !self.pending[ticket.stage.slot()] {
            return Err(Error::Stale { stage: ticket.stage, generation: ticket.generation, current });
        }
        self.pending[ticket.stage.slot()] = false;
        Ok(())
    }
}
