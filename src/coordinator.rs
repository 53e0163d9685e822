//! Proposal lifecycle coordinator.
//!
//! The only component that writes to the targeting store. Every public
//! operation runs inside one serializable sled transaction spanning the
//! swaps, edges, meta, and history trees: the eligibility check, the edge
//! writes, the graph snapshot replacement, and the history appends all commit
//! or abort together. Two racing calls against the same swap conflict on the
//! graph record; sled re-runs the loser against the committed state, where
//! the re-run eligibility check hands back the specific deny reason.
//!
//! Collaborator hooks (swap lifecycle advancement, notification dispatch) run
//! after commit and never roll the transaction back.

use crate::edge::{EdgeStatus, Proposal, TargetingEdge};
use crate::eligibility::{EligibilityInput, check_eligibility};
use crate::error::TargetingError;
use crate::graph::ActiveEdgeRef;
use crate::history::{HistoryAction, HistoryEntry};
use crate::store::{
    TargetingStore, abort, commit, txn_append_history, txn_get, txn_graph, txn_put, txn_put_graph,
};
use crate::swap::{Swap, SwapState, TimeStamp};
use crate::utils;
use sled::Transactional;
use sled::transaction::ConflictableTransactionError;
use std::sync::Arc;
use tracing::{info, warn};

/// Event handed to the swap lifecycle collaborator when a proposal resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapEvent {
    ProposalAccepted,
}

/// Out-of-core swap lifecycle mutation hook, called after an acceptance
/// commits. Failures are logged, never rolled back; the store commit is the
/// source of truth.
pub trait SwapLifecycle: Send + Sync {
    fn advance(&self, swap_id: &str, event: SwapEvent) -> anyhow::Result<()>;
}

/// Fire-and-forget notification dispatch, one call per history entry.
pub trait NotificationSink: Send + Sync {
    fn dispatch(&self, entry: &HistoryEntry) -> anyhow::Result<()>;
}

pub struct NoopNotifier;

impl NotificationSink for NoopNotifier {
    fn dispatch(&self, _entry: &HistoryEntry) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Default lifecycle hook: marks the swap `accepted` in the store.
pub struct StoreLifecycle {
    store: TargetingStore,
}

impl StoreLifecycle {
    pub fn new(store: TargetingStore) -> Self {
        Self { store }
    }
}

impl SwapLifecycle for StoreLifecycle {
    fn advance(&self, swap_id: &str, event: SwapEvent) -> anyhow::Result<()> {
        match event {
            SwapEvent::ProposalAccepted => {
                self.store.update_swap_state(swap_id, SwapState::Accepted)?;
            }
        }
        Ok(())
    }
}

pub struct TargetingService {
    store: TargetingStore,
    lifecycle: Arc<dyn SwapLifecycle>,
    notifier: Arc<dyn NotificationSink>,
}

impl TargetingService {
    pub fn new(store: TargetingStore) -> Self {
        let lifecycle = Arc::new(StoreLifecycle::new(store.clone()));
        Self {
            store,
            lifecycle,
            notifier: Arc::new(NoopNotifier),
        }
    }

    pub fn with_hooks(
        store: TargetingStore,
        lifecycle: Arc<dyn SwapLifecycle>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            lifecycle,
            notifier,
        }
    }

    pub fn store(&self) -> &TargetingStore {
        &self.store
    }

    /// Create a new active targeting edge from `source_swap_id` to
    /// `target_swap_id`, with the proposal payload attached.
    pub fn target(
        &self,
        source_swap_id: &str,
        target_swap_id: &str,
        user_id: &str,
        message: Option<String>,
        conditions: Option<String>,
    ) -> Result<TargetingEdge, TargetingError> {
        validate_id("sourceSwapId", source_swap_id)?;
        validate_id("targetSwapId", target_swap_id)?;
        validate_id("userId", user_id)?;

        let edge_id = utils::new_edge_id();
        let proposal_id = utils::new_proposal_id();
        let now = TimeStamp::new();

        let st = &self.store;
        let (edge, entry) = commit((&st.swaps, &st.edges, &st.meta, &st.history).transaction(
            |(swaps, edges, meta, history)| {
                let source: Swap = match txn_get(swaps, source_swap_id)? {
                    Some(s) => s,
                    None => {
                        return abort(TargetingError::NotFound(format!(
                            "swap {source_swap_id}"
                        )));
                    }
                };
                let target: Swap = match txn_get(swaps, target_swap_id)? {
                    Some(s) => s,
                    None => {
                        return abort(TargetingError::NotFound(format!(
                            "swap {target_swap_id}"
                        )));
                    }
                };
                if source.owner_id != user_id {
                    return abort(TargetingError::NotAuthorized {
                        user_id: user_id.into(),
                        swap_id: source_swap_id.into(),
                    });
                }

                let mut graph = txn_graph(meta)?;
                if graph.outgoing(source_swap_id).is_some() {
                    return abort(TargetingError::Validation(
                        "source swap already has an active target; retarget instead".into(),
                    ));
                }

                check_eligibility(&EligibilityInput {
                    source: &source,
                    target: &target,
                    graph: &graph,
                    now: &now,
                })
                .map_err(ConflictableTransactionError::Abort)?;

                let edge = TargetingEdge::new(
                    edge_id.clone(),
                    source_swap_id.into(),
                    target_swap_id.into(),
                    proposal_id.clone(),
                    now.clone(),
                );
                let proposal = Proposal::new(
                    proposal_id.clone(),
                    edge_id.clone(),
                    message.clone(),
                    conditions.clone(),
                    now.clone(),
                );
                let content_hash = proposal
                    .content_hash()
                    .map_err(ConflictableTransactionError::Abort)?;

                txn_put(edges, &edge.id, &edge)?;
                txn_put(edges, &proposal.id, &proposal)?;

                graph.insert(ActiveEdgeRef {
                    edge_id: edge.id.clone(),
                    source_swap_id: edge.source_swap_id.clone(),
                    target_swap_id: edge.target_swap_id.clone(),
                });
                txn_put_graph(meta, &graph)?;

                let entry = HistoryEntry::new(
                    edge.id.clone(),
                    edge.source_swap_id.clone(),
                    edge.target_swap_id.clone(),
                    user_id.into(),
                    HistoryAction::Targeted,
                    now.clone(),
                    Some(format!("proposal:{content_hash}")),
                );
                txn_append_history(meta, history, &entry)?;

                Ok((edge, entry))
            },
        ))?;

        info!(
            edge_id = %edge.id,
            source = %edge.source_swap_id,
            target = %edge.target_swap_id,
            "targeting edge created"
        );
        self.notify(&entry);
        Ok(edge)
    }

    /// Replace the source swap's active outgoing edge with one pointing at
    /// `new_target_swap_id`. The old edge becomes `replaced` and the proposal
    /// payload carries over; both writes land in the same transaction, so the
    /// source never holds two active outgoing edges.
    pub fn retarget(
        &self,
        source_swap_id: &str,
        new_target_swap_id: &str,
        user_id: &str,
    ) -> Result<TargetingEdge, TargetingError> {
        validate_id("sourceSwapId", source_swap_id)?;
        validate_id("targetSwapId", new_target_swap_id)?;
        validate_id("userId", user_id)?;

        let edge_id = utils::new_edge_id();
        let proposal_id = utils::new_proposal_id();
        let now = TimeStamp::new();

        let st = &self.store;
        let (edge, entry) = commit((&st.swaps, &st.edges, &st.meta, &st.history).transaction(
            |(swaps, edges, meta, history)| {
                let source: Swap = match txn_get(swaps, source_swap_id)? {
                    Some(s) => s,
                    None => {
                        return abort(TargetingError::NotFound(format!(
                            "swap {source_swap_id}"
                        )));
                    }
                };
                if source.owner_id != user_id {
                    return abort(TargetingError::NotAuthorized {
                        user_id: user_id.into(),
                        swap_id: source_swap_id.into(),
                    });
                }

                let mut graph = txn_graph(meta)?;
                let old_ref = match graph.outgoing(source_swap_id) {
                    Some(r) => r.clone(),
                    None => {
                        return abort(TargetingError::NotFound(format!(
                            "active targeting edge for swap {source_swap_id}"
                        )));
                    }
                };

                let target: Swap = match txn_get(swaps, new_target_swap_id)? {
                    Some(s) => s,
                    None => {
                        return abort(TargetingError::NotFound(format!(
                            "swap {new_target_swap_id}"
                        )));
                    }
                };

                // eligibility runs against the graph without the edge being
                // replaced, otherwise the source's own outgoing edge could
                // mask or fake a cycle
                graph.remove(&old_ref.edge_id);
                check_eligibility(&EligibilityInput {
                    source: &source,
                    target: &target,
                    graph: &graph,
                    now: &now,
                })
                .map_err(ConflictableTransactionError::Abort)?;

                let mut old_edge: TargetingEdge = match txn_get(edges, &old_ref.edge_id)? {
                    Some(e) => e,
                    None => {
                        return abort(TargetingError::NotFound(format!(
                            "edge {}",
                            old_ref.edge_id
                        )));
                    }
                };
                old_edge
                    .transition(EdgeStatus::Replaced, now.clone())
                    .map_err(ConflictableTransactionError::Abort)?;
                txn_put(edges, &old_edge.id, &old_edge)?;

                let old_proposal: Option<Proposal> = txn_get(edges, &old_edge.proposal_id)?;
                let (message, conditions) = old_proposal
                    .map(|p| (p.message, p.conditions))
                    .unwrap_or((None, None));

                let edge = TargetingEdge::new(
                    edge_id.clone(),
                    source_swap_id.into(),
                    new_target_swap_id.into(),
                    proposal_id.clone(),
                    now.clone(),
                );
                let proposal = Proposal::new(
                    proposal_id.clone(),
                    edge_id.clone(),
                    message,
                    conditions,
                    now.clone(),
                );
                txn_put(edges, &edge.id, &edge)?;
                txn_put(edges, &proposal.id, &proposal)?;

                graph.insert(ActiveEdgeRef {
                    edge_id: edge.id.clone(),
                    source_swap_id: edge.source_swap_id.clone(),
                    target_swap_id: edge.target_swap_id.clone(),
                });
                txn_put_graph(meta, &graph)?;

                let entry = HistoryEntry::new(
                    edge.id.clone(),
                    edge.source_swap_id.clone(),
                    edge.target_swap_id.clone(),
                    user_id.into(),
                    HistoryAction::Retargeted,
                    now.clone(),
                    Some(format!("replaces:{}", old_edge.id)),
                );
                txn_append_history(meta, history, &entry)?;

                Ok((edge, entry))
            },
        ))?;

        info!(
            edge_id = %edge.id,
            source = %edge.source_swap_id,
            target = %edge.target_swap_id,
            "targeting edge retargeted"
        );
        self.notify(&entry);
        Ok(edge)
    }

    /// Cancel the source swap's active outgoing edge. Idempotent: with no
    /// active edge this is a no-op success returning `None`.
    pub fn remove_target(
        &self,
        source_swap_id: &str,
        user_id: &str,
    ) -> Result<Option<TargetingEdge>, TargetingError> {
        validate_id("sourceSwapId", source_swap_id)?;
        validate_id("userId", user_id)?;

        let now = TimeStamp::new();

        let st = &self.store;
        let outcome = commit((&st.swaps, &st.edges, &st.meta, &st.history).transaction(
            |(swaps, edges, meta, history)| {
                let source: Swap = match txn_get(swaps, source_swap_id)? {
                    Some(s) => s,
                    None => {
                        return abort(TargetingError::NotFound(format!(
                            "swap {source_swap_id}"
                        )));
                    }
                };
                if source.owner_id != user_id {
                    return abort(TargetingError::NotAuthorized {
                        user_id: user_id.into(),
                        swap_id: source_swap_id.into(),
                    });
                }

                let mut graph = txn_graph(meta)?;
                let old_ref = match graph.outgoing(source_swap_id) {
                    Some(r) => r.clone(),
                    None => return Ok(None),
                };

                let mut edge: TargetingEdge = match txn_get(edges, &old_ref.edge_id)? {
                    Some(e) => e,
                    None => {
                        return abort(TargetingError::NotFound(format!(
                            "edge {}",
                            old_ref.edge_id
                        )));
                    }
                };
                edge.transition(EdgeStatus::Cancelled, now.clone())
                    .map_err(ConflictableTransactionError::Abort)?;
                txn_put(edges, &edge.id, &edge)?;

                graph.remove(&edge.id);
                txn_put_graph(meta, &graph)?;

                let entry = HistoryEntry::new(
                    edge.id.clone(),
                    edge.source_swap_id.clone(),
                    edge.target_swap_id.clone(),
                    user_id.into(),
                    HistoryAction::Removed,
                    now.clone(),
                    None,
                );
                txn_append_history(meta, history, &entry)?;

                Ok(Some((edge, entry)))
            },
        ))?;

        match outcome {
            Some((edge, entry)) => {
                info!(edge_id = %edge.id, source = %source_swap_id, "targeting edge removed");
                self.notify(&entry);
                Ok(Some(edge))
            }
            None => Ok(None),
        }
    }

    /// Accept an active edge. Only the target swap's owner may call. Every
    /// other active edge into the same target is rejected in the same
    /// transaction; the swap lifecycle hook runs after commit.
    pub fn accept(&self, edge_id: &str, user_id: &str) -> Result<TargetingEdge, TargetingError> {
        validate_id("edgeId", edge_id)?;
        validate_id("userId", user_id)?;

        let now = TimeStamp::new();

        let st = &self.store;
        let (edge, entries) = commit((&st.swaps, &st.edges, &st.meta, &st.history).transaction(
            |(swaps, edges, meta, history)| {
                let mut edge: TargetingEdge = match txn_get(edges, edge_id)? {
                    Some(e) => e,
                    None => return abort(TargetingError::NotFound(format!("edge {edge_id}"))),
                };
                let target: Swap = match txn_get(swaps, &edge.target_swap_id)? {
                    Some(s) => s,
                    None => {
                        return abort(TargetingError::NotFound(format!(
                            "swap {}",
                            edge.target_swap_id
                        )));
                    }
                };
                if target.owner_id != user_id {
                    return abort(TargetingError::NotAuthorized {
                        user_id: user_id.into(),
                        swap_id: target.id.clone(),
                    });
                }

                edge.transition(EdgeStatus::Accepted, now.clone())
                    .map_err(ConflictableTransactionError::Abort)?;

                let mut graph = txn_graph(meta)?;
                graph.remove(&edge.id);

                // losers: the remaining active edges into the same target.
                // structurally absent under first_match; this is where the
                // competing auction bids are resolved.
                let loser_refs: Vec<ActiveEdgeRef> =
                    graph.incoming(&edge.target_swap_id).cloned().collect();

                let mut entries = Vec::with_capacity(loser_refs.len() + 1);
                for loser_ref in loser_refs {
                    graph.remove(&loser_ref.edge_id);
                    let mut loser: TargetingEdge = match txn_get(edges, &loser_ref.edge_id)? {
                        Some(e) => e,
                        None => {
                            return abort(TargetingError::NotFound(format!(
                                "edge {}",
                                loser_ref.edge_id
                            )));
                        }
                    };
                    loser
                        .transition(EdgeStatus::Rejected, now.clone())
                        .map_err(ConflictableTransactionError::Abort)?;
                    txn_put(edges, &loser.id, &loser)?;
                    entries.push(HistoryEntry::new(
                        loser.id.clone(),
                        loser.source_swap_id.clone(),
                        loser.target_swap_id.clone(),
                        user_id.into(),
                        HistoryAction::Rejected,
                        now.clone(),
                        Some(format!("lost to edge {}", edge.id)),
                    ));
                }

                txn_put(edges, &edge.id, &edge)?;
                txn_put_graph(meta, &graph)?;

                entries.push(HistoryEntry::new(
                    edge.id.clone(),
                    edge.source_swap_id.clone(),
                    edge.target_swap_id.clone(),
                    user_id.into(),
                    HistoryAction::Accepted,
                    now.clone(),
                    None,
                ));
                for entry in &entries {
                    txn_append_history(meta, history, entry)?;
                }

                Ok((edge, entries))
            },
        ))?;

        info!(
            edge_id = %edge.id,
            target = %edge.target_swap_id,
            resolved = entries.len() - 1,
            "targeting edge accepted"
        );

        // external collaborator: advance both swaps' lifecycles. failures
        // are logged, the commit above stands.
        for swap_id in [&edge.target_swap_id, &edge.source_swap_id] {
            if let Err(e) = self.lifecycle.advance(swap_id, SwapEvent::ProposalAccepted) {
                warn!(swap_id = %swap_id, error = %e, "swap lifecycle hook failed");
            }
        }
        for entry in &entries {
            self.notify(entry);
        }
        Ok(edge)
    }

    /// Reject an active edge. Only the target swap's owner may call.
    pub fn reject(&self, edge_id: &str, user_id: &str) -> Result<TargetingEdge, TargetingError> {
        validate_id("edgeId", edge_id)?;
        validate_id("userId", user_id)?;

        let now = TimeStamp::new();

        let st = &self.store;
        let (edge, entry) = commit((&st.swaps, &st.edges, &st.meta, &st.history).transaction(
            |(swaps, edges, meta, history)| {
                let mut edge: TargetingEdge = match txn_get(edges, edge_id)? {
                    Some(e) => e,
                    None => return abort(TargetingError::NotFound(format!("edge {edge_id}"))),
                };
                let target: Swap = match txn_get(swaps, &edge.target_swap_id)? {
                    Some(s) => s,
                    None => {
                        return abort(TargetingError::NotFound(format!(
                            "swap {}",
                            edge.target_swap_id
                        )));
                    }
                };
                if target.owner_id != user_id {
                    return abort(TargetingError::NotAuthorized {
                        user_id: user_id.into(),
                        swap_id: target.id.clone(),
                    });
                }

                edge.transition(EdgeStatus::Rejected, now.clone())
                    .map_err(ConflictableTransactionError::Abort)?;
                txn_put(edges, &edge.id, &edge)?;

                let mut graph = txn_graph(meta)?;
                graph.remove(&edge.id);
                txn_put_graph(meta, &graph)?;

                let entry = HistoryEntry::new(
                    edge.id.clone(),
                    edge.source_swap_id.clone(),
                    edge.target_swap_id.clone(),
                    user_id.into(),
                    HistoryAction::Rejected,
                    now.clone(),
                    None,
                );
                txn_append_history(meta, history, &entry)?;

                Ok((edge, entry))
            },
        ))?;

        info!(edge_id = %edge.id, target = %edge.target_swap_id, "targeting edge rejected");
        self.notify(&entry);
        Ok(edge)
    }

    fn notify(&self, entry: &HistoryEntry) {
        if let Err(e) = self.notifier.dispatch(entry) {
            warn!(
                edge_id = %entry.edge_id,
                action = entry.action.as_str(),
                error = %e,
                "notification dispatch failed"
            );
        }
    }
}

fn validate_id(field: &str, value: &str) -> Result<(), TargetingError> {
    if value.is_empty() || value.len() > 128 {
        return Err(TargetingError::Validation(format!(
            "{field} must be a non-empty id of at most 128 characters"
        )));
    }
    Ok(())
}
