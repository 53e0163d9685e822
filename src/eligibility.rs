//! Eligibility checker: may this edge be created right now?
//!
//! A pure decision function over the snapshot it is handed. It performs reads
//! only, never touches the store, and short-circuits on the first failed
//! check, so each deny reason is the one the caller can actually act on. The
//! coordinator runs it inside the same transaction that inserts the edge.

use crate::error::TargetingError;
use crate::graph::ActiveGraph;
use crate::swap::{AcceptanceStrategy, Swap, SwapState, TimeStamp};
use chrono::Utc;

pub struct EligibilityInput<'a> {
    pub source: &'a Swap,
    pub target: &'a Swap,
    pub graph: &'a ActiveGraph,
    pub now: &'a TimeStamp<Utc>,
}

/// Checks, in order, short-circuiting on the first failure:
/// 1. source and target are distinct swaps with distinct owners
/// 2. the target is open for proposals (lifecycle state / auction window)
/// 3. the new edge would not close a circular targeting chain
/// 4. the target's strategy admits another incoming edge
pub fn check_eligibility(input: &EligibilityInput<'_>) -> Result<(), TargetingError> {
    let EligibilityInput {
        source,
        target,
        graph,
        now,
    } = input;

    if source.id == target.id || source.owner_id == target.owner_id {
        return Err(TargetingError::CannotTargetOwnSwap);
    }

    check_target_open(target, now)?;

    // would the target reach back to the source through active edges?
    if graph.has_path(&target.id, &source.id) {
        return Err(TargetingError::CircularTargeting);
    }

    target
        .strategy
        .is_admissible(graph.incoming_count(&target.id), now)
}

/// The target admits proposals while `available`, or while `pending` under an
/// auction that has not yet ended (competing bids keep arriving until the
/// deadline).
fn check_target_open(target: &Swap, now: &TimeStamp<Utc>) -> Result<(), TargetingError> {
    match (&target.state, &target.strategy) {
        (SwapState::Available, _) => Ok(()),
        (SwapState::Pending, AcceptanceStrategy::Auction { end_date }) => {
            if now >= end_date {
                return Err(TargetingError::AuctionEnded);
            }
            Ok(())
        }
        (state, _) => Err(TargetingError::SwapUnavailable {
            state: state.as_str().into(),
        }),
    }
}
