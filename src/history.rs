//! Append-only audit trail of lifecycle transitions.
//!
//! Every coordinator operation appends one entry per affected edge in the
//! same transaction as the edge write. Entries are never mutated or deleted;
//! they are the authoritative record of who did what to which edge and when.

use crate::swap::TimeStamp;
use chrono::Utc;

#[derive(Debug, PartialEq, Eq, Clone, Copy, minicbor::Encode, minicbor::Decode)]
pub enum HistoryAction {
    #[n(0)]
    Targeted,
    #[n(1)]
    Retargeted,
    #[n(2)]
    Removed,
    #[n(3)]
    Accepted,
    #[n(4)]
    Rejected,
    #[n(5)]
    Cancelled,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Targeted => "targeted",
            Self::Retargeted => "retargeted",
            Self::Removed => "removed",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct HistoryEntry {
    #[n(0)]
    pub edge_id: String,
    #[n(1)]
    pub source_swap_id: String,
    #[n(2)]
    pub target_swap_id: String,
    #[n(3)]
    pub actor_id: String,
    #[n(4)]
    pub action: HistoryAction,
    #[n(5)]
    pub timestamp: TimeStamp<Utc>,
    #[n(6)]
    pub metadata: Option<String>,
}

impl HistoryEntry {
    pub fn new(
        edge_id: String,
        source_swap_id: String,
        target_swap_id: String,
        actor_id: String,
        action: HistoryAction,
        timestamp: TimeStamp<Utc>,
        metadata: Option<String>,
    ) -> Self {
        Self {
            edge_id,
            source_swap_id,
            target_swap_id,
            actor_id,
            action,
            timestamp,
            metadata,
        }
    }

    /// True when this entry concerns the given swap on either end.
    pub fn touches_swap(&self, swap_id: &str) -> bool {
        self.source_swap_id == swap_id || self.target_swap_id == swap_id
    }
}
