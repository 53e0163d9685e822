//! Aggregation/query service: read-only views over the targeting store.
//!
//! Builds the "who targets me / whom do I target" views by joining active
//! edges with swap presentation metadata. Missing foreign rows degrade to
//! placeholder fields instead of dropping the whole record; a single missing
//! join must never zero out someone's entire targeting view.

use crate::edge::{EdgeStatus, TargetingEdge};
use crate::eligibility::{EligibilityInput, check_eligibility};
use crate::error::TargetingError;
use crate::history::HistoryEntry;
use crate::store::TargetingStore;
use crate::swap::{SwapState, TimeStamp};
use chrono::Utc;
use std::collections::HashSet;

const PLACEHOLDER_OWNER: &str = "unknown";
const PLACEHOLDER_SUMMARY: &str = "unavailable";

/// One edge denormalized with the counterpart swap's presentation metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeView {
    pub edge_id: String,
    pub proposal_id: String,
    pub status: EdgeStatus,
    pub source_swap_id: String,
    pub target_swap_id: String,
    pub counterpart_swap_id: String,
    pub counterpart_owner: String,
    pub counterpart_summary: String,
    pub message: Option<String>,
    pub created_at: TimeStamp<Utc>,
}

#[derive(Debug, Clone)]
pub struct TargetingStatus {
    pub swap_id: String,
    pub outgoing: Option<EdgeView>,
    pub incoming: Vec<EdgeView>,
    pub has_active_targeting: bool,
    /// Surfaced opportunistically: the auction deadline has passed and no
    /// winner was chosen yet.
    pub auction_ended: bool,
}

#[derive(Debug, Clone)]
pub struct CanTarget {
    pub can_target: bool,
    pub code: Option<&'static str>,
    pub reason: Option<String>,
}

pub struct TargetingQuery {
    store: TargetingStore,
}

impl TargetingQuery {
    pub fn new(store: TargetingStore) -> Self {
        Self { store }
    }

    /// Current edge view for a swap: its single outgoing edge plus all active
    /// incoming edges.
    pub fn targeting_status(&self, swap_id: &str) -> Result<TargetingStatus, TargetingError> {
        let swap = self
            .store
            .swap(swap_id)?
            .ok_or_else(|| TargetingError::NotFound(format!("swap {swap_id}")))?;

        let graph = self.store.active_graph()?;

        let outgoing = match graph.outgoing(swap_id) {
            Some(r) => self.edge_view_by_id(&r.edge_id, swap_id)?,
            None => None,
        };
        let mut incoming = Vec::new();
        for r in graph.incoming(swap_id) {
            if let Some(view) = self.edge_view_by_id(&r.edge_id, swap_id)? {
                incoming.push(view);
            }
        }

        let has_active_targeting = outgoing.is_some() || !incoming.is_empty();
        let now = TimeStamp::new();
        let auction_ended = swap
            .strategy
            .should_finalize(&now, swap.state == SwapState::Accepted);

        Ok(TargetingStatus {
            swap_id: swap_id.into(),
            outgoing,
            incoming,
            has_active_targeting,
            auction_ended,
        })
    }

    /// Read-only wrap of the eligibility checker: would `target()` succeed
    /// right now? Never mutates anything.
    pub fn can_target(
        &self,
        source_swap_id: &str,
        target_swap_id: &str,
    ) -> Result<CanTarget, TargetingError> {
        let source = self
            .store
            .swap(source_swap_id)?
            .ok_or_else(|| TargetingError::NotFound(format!("swap {source_swap_id}")))?;
        let target = self
            .store
            .swap(target_swap_id)?
            .ok_or_else(|| TargetingError::NotFound(format!("swap {target_swap_id}")))?;

        let graph = self.store.active_graph()?;
        let now = TimeStamp::new();

        let verdict = if graph.outgoing(source_swap_id).is_some() {
            Err(TargetingError::Validation(
                "source swap already has an active target; retarget instead".into(),
            ))
        } else {
            check_eligibility(&EligibilityInput {
                source: &source,
                target: &target,
                graph: &graph,
                now: &now,
            })
        };

        Ok(match verdict {
            Ok(()) => CanTarget {
                can_target: true,
                code: None,
                reason: None,
            },
            Err(e) => CanTarget {
                can_target: false,
                code: Some(e.code()),
                reason: Some(e.to_string()),
            },
        })
    }

    /// History entries touching a swap on either end, in append order.
    pub fn swap_history(
        &self,
        swap_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryEntry>, TargetingError> {
        let entries = self.store.history_entries()?;
        Ok(paginate(
            entries.into_iter().filter(|e| e.touches_swap(swap_id)),
            limit,
            offset,
        ))
    }

    /// History entries the user either performed or that touch a swap the
    /// user owns, in append order.
    pub fn user_activity(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryEntry>, TargetingError> {
        let owned: HashSet<String> = self
            .store
            .swaps_owned_by(user_id)?
            .into_iter()
            .map(|s| s.id)
            .collect();

        let entries = self.store.history_entries()?;
        Ok(paginate(
            entries.into_iter().filter(|e| {
                e.actor_id == user_id
                    || owned.contains(&e.source_swap_id)
                    || owned.contains(&e.target_swap_id)
            }),
            limit,
            offset,
        ))
    }

    /// Every edge ever pointed at a swap, any status, newest first.
    pub fn targeted_by(
        &self,
        swap_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<EdgeView>, TargetingError> {
        let mut edges: Vec<TargetingEdge> = self
            .store
            .all_edges()?
            .into_iter()
            .filter(|e| e.target_swap_id == swap_id)
            .collect();
        edges.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut views = Vec::new();
        for edge in edges.into_iter().skip(offset).take(limit) {
            views.push(self.edge_view(&edge, swap_id)?);
        }
        Ok(views)
    }

    /// Targeting status across every swap the user owns.
    pub fn user_portfolio(&self, user_id: &str) -> Result<Vec<TargetingStatus>, TargetingError> {
        let mut out = Vec::new();
        for swap in self.store.swaps_owned_by(user_id)? {
            out.push(self.targeting_status(&swap.id)?);
        }
        Ok(out)
    }

    fn edge_view_by_id(
        &self,
        edge_id: &str,
        perspective_swap_id: &str,
    ) -> Result<Option<EdgeView>, TargetingError> {
        match self.store.edge(edge_id)? {
            Some(edge) => Ok(Some(self.edge_view(&edge, perspective_swap_id)?)),
            None => Ok(None),
        }
    }

    /// Denormalize one edge from the perspective of a swap: the counterpart
    /// is the other end. Missing counterpart metadata degrades field by
    /// field, the edge itself is always returned.
    fn edge_view(
        &self,
        edge: &TargetingEdge,
        perspective_swap_id: &str,
    ) -> Result<EdgeView, TargetingError> {
        let counterpart_swap_id = if edge.source_swap_id == perspective_swap_id {
            edge.target_swap_id.clone()
        } else {
            edge.source_swap_id.clone()
        };

        let (counterpart_owner, counterpart_summary) =
            match self.store.swap(&counterpart_swap_id)? {
                Some(swap) => (swap.owner_name, swap.summary),
                None => (PLACEHOLDER_OWNER.into(), PLACEHOLDER_SUMMARY.into()),
            };

        let message = self
            .store
            .proposal(&edge.proposal_id)?
            .and_then(|p| p.message);

        Ok(EdgeView {
            edge_id: edge.id.clone(),
            proposal_id: edge.proposal_id.clone(),
            status: edge.status,
            source_swap_id: edge.source_swap_id.clone(),
            target_swap_id: edge.target_swap_id.clone(),
            counterpart_swap_id,
            counterpart_owner,
            counterpart_summary,
            message,
            created_at: edge.created_at.clone(),
        })
    }
}

fn paginate<T>(iter: impl Iterator<Item = T>, limit: usize, offset: usize) -> Vec<T> {
    iter.skip(offset).take(limit).collect()
}
