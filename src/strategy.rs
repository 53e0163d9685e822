//! Acceptance strategy resolver.
//!
//! Encapsulates the two admission disciplines: `first_match` (exclusive, one
//! live proposal at a time) and `auction` (competitive, many live proposals
//! until the deadline). Pure predicates over the data handed to them.

use crate::error::TargetingError;
use crate::swap::{AcceptanceStrategy, TimeStamp};
use chrono::Utc;

impl AcceptanceStrategy {
    /// Can a new incoming edge be admitted right now, given the number of
    /// other active incoming edges the target already holds?
    pub fn is_admissible(
        &self,
        active_incoming: usize,
        now: &TimeStamp<Utc>,
    ) -> Result<(), TargetingError> {
        match self {
            Self::FirstMatch => {
                if active_incoming > 0 {
                    return Err(TargetingError::ProposalPending);
                }
                Ok(())
            }
            Self::Auction { end_date } => {
                if now >= end_date {
                    return Err(TargetingError::AuctionEnded);
                }
                Ok(())
            }
        }
    }

    /// Should existing edges be finalized now? Only meaningful for auctions:
    /// true once the deadline has passed and no winner has been chosen.
    /// Consulted opportunistically on read paths; no scheduler is required
    /// for correctness because `is_admissible` already refuses late bids.
    pub fn should_finalize(&self, now: &TimeStamp<Utc>, winner_chosen: bool) -> bool {
        match self {
            Self::FirstMatch => false,
            Self::Auction { end_date } => !winner_chosen && now >= end_date,
        }
    }
}
