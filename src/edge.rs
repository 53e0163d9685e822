//! Targeting edges and their attached proposals
use crate::error::TargetingError;
use crate::swap::TimeStamp;
use chrono::Utc;

#[derive(Debug, PartialEq, Eq, Clone, Copy, minicbor::Encode, minicbor::Decode)]
pub enum EdgeStatus {
    #[n(0)]
    Active,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
    #[n(3)]
    Cancelled,
    #[n(4)]
    Replaced,
}

impl EdgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Replaced => "replaced",
        }
    }

    /// Accepted and rejected edges are immutable once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }
}

/// A directed proposal relationship from a source swap to a target swap.
/// Invariant: `source_swap_id != target_swap_id`, enforced at creation by the
/// eligibility checker.
#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct TargetingEdge {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded with the "edge" hrp
    #[n(1)]
    pub source_swap_id: String,
    #[n(2)]
    pub target_swap_id: String,
    #[n(3)]
    pub proposal_id: String,
    #[n(4)]
    pub status: EdgeStatus,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
    #[n(6)]
    pub updated_at: TimeStamp<Utc>,
}

impl TargetingEdge {
    pub fn new(
        id: String,
        source_swap_id: String,
        target_swap_id: String,
        proposal_id: String,
        now: TimeStamp<Utc>,
    ) -> Self {
        Self {
            id,
            source_swap_id,
            target_swap_id,
            proposal_id,
            status: EdgeStatus::Active,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Move the edge to a new status. Only `Active` edges may transition;
    /// terminal edges and already-retired edges stay as they are.
    pub fn transition(
        &mut self,
        to: EdgeStatus,
        now: TimeStamp<Utc>,
    ) -> Result<(), TargetingError> {
        if self.status != EdgeStatus::Active {
            return Err(TargetingError::InvalidTransition {
                edge_id: self.id.clone(),
                from: self.status.as_str().into(),
                to: to.as_str().into(),
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}

/// Negotiable payload tied 1:1 to a targeting edge.
#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct Proposal {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded with the "prop" hrp
    #[n(1)]
    pub edge_id: String,
    #[n(2)]
    pub message: Option<String>,
    #[n(3)]
    pub conditions: Option<String>,
    #[n(4)]
    pub created_at: TimeStamp<Utc>,
}

impl Proposal {
    pub fn new(
        id: String,
        edge_id: String,
        message: Option<String>,
        conditions: Option<String>,
        now: TimeStamp<Utc>,
    ) -> Self {
        Self {
            id,
            edge_id,
            message,
            conditions,
            created_at: now,
        }
    }

    /// Content address of the proposal payload, pinned into the history
    /// metadata of the `targeted` entry.
    pub fn content_hash(&self) -> Result<String, TargetingError> {
        let cbor = minicbor::to_vec(self)?;
        Ok(sha256::digest(&cbor))
    }
}
