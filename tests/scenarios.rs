//! End-to-end lifecycle scenarios against a real (temporary) store.

use anyhow::Context;
use std::sync::Arc;
use swap_targeting::{
    coordinator::TargetingService,
    edge::EdgeStatus,
    history::HistoryAction,
    query::TargetingQuery,
    store::TargetingStore,
    swap::{AcceptanceStrategy, Swap, SwapState, TimeStamp},
    utils,
};
use tempfile::tempdir; // Use for test db cleanup.

// Sled uses file-based locking to prevent concurrent access, so each test
// opens its own database under a tempdir for simplified cleanup.
fn open_store(dir: &tempfile::TempDir, name: &str) -> anyhow::Result<TargetingStore> {
    let db = sled::open(dir.path().join(name))?;
    Ok(TargetingStore::open(Arc::new(db))?)
}

fn seed_swap(
    store: &TargetingStore,
    owner_id: &str,
    owner_name: &str,
    strategy: AcceptanceStrategy,
) -> anyhow::Result<Swap> {
    let swap = Swap::new(
        utils::new_swap_id(),
        owner_id.into(),
        owner_name.into(),
        format!("booking held by {owner_name}"),
        strategy,
    );
    store.insert_swap(&swap)?;
    Ok(swap)
}

fn auction_until(year: i32) -> AcceptanceStrategy {
    AcceptanceStrategy::Auction {
        end_date: TimeStamp::new_with(year, 1, 1, 0, 0, 0),
    }
}

#[test]
fn first_match_pending_then_reject_then_retry() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = open_store(&temp_dir, "first_match_cycle.db")?;
    let service = TargetingService::new(store.clone());

    let a = seed_swap(&store, "user_a", "Alice", AcceptanceStrategy::FirstMatch)?;
    let b = seed_swap(&store, "user_b", "Bob", AcceptanceStrategy::FirstMatch)?;
    let c = seed_swap(&store, "user_c", "Carol", AcceptanceStrategy::FirstMatch)?;

    // B targets A; the edge goes active
    let b_edge = service
        .target(&b.id, &a.id, "user_b", Some("week 32 for week 35?".into()), None)
        .context("B targeting A: ")?;
    assert_eq!(b_edge.status, EdgeStatus::Active);

    // C attempts to target A while B's proposal is live
    let err = service
        .target(&c.id, &a.id, "user_c", None, None)
        .unwrap_err();
    assert_eq!(err.code(), "PROPOSAL_PENDING");

    // A's owner rejects B's edge
    let rejected = service.reject(&b_edge.id, "user_a")?;
    assert_eq!(rejected.status, EdgeStatus::Rejected);

    // C retries and now succeeds
    let c_edge = service.target(&c.id, &a.id, "user_c", None, None)?;
    assert_eq!(c_edge.status, EdgeStatus::Active);

    Ok(())
}

#[test]
fn auction_accept_resolves_competitors() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = open_store(&temp_dir, "auction_accept.db")?;
    let service = TargetingService::new(store.clone());

    let x = seed_swap(&store, "user_x", "Xenia", auction_until(2035))?;
    let y = seed_swap(&store, "user_y", "Yusuf", AcceptanceStrategy::FirstMatch)?;
    let z = seed_swap(&store, "user_z", "Zara", AcceptanceStrategy::FirstMatch)?;

    // both suitors hold active edges into the auction simultaneously
    let y_edge = service.target(&y.id, &x.id, "user_y", None, None)?;
    let z_edge = service.target(&z.id, &x.id, "user_z", None, None)?;
    assert_eq!(y_edge.status, EdgeStatus::Active);
    assert_eq!(z_edge.status, EdgeStatus::Active);

    // owner accepts Y's bid
    let accepted = service.accept(&y_edge.id, "user_x")?;
    assert_eq!(accepted.status, EdgeStatus::Accepted);

    // Z's bid was auto-rejected in the same transaction
    let z_after = store.edge(&z_edge.id)?.unwrap();
    assert_eq!(z_after.status, EdgeStatus::Rejected);

    // both exchanged swaps advanced through the lifecycle hook
    assert_eq!(store.swap(&x.id)?.unwrap().state, SwapState::Accepted);
    assert_eq!(store.swap(&y.id)?.unwrap().state, SwapState::Accepted);

    // the audit trail holds the loss and the win
    let actions: Vec<HistoryAction> = store
        .history_entries()?
        .iter()
        .map(|e| e.action)
        .collect();
    assert!(actions.contains(&HistoryAction::Accepted));
    assert!(actions.contains(&HistoryAction::Rejected));

    Ok(())
}

#[test]
fn circular_chain_is_refused() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = open_store(&temp_dir, "circular_chain.db")?;
    let service = TargetingService::new(store.clone());

    let a = seed_swap(&store, "user_a", "Alice", AcceptanceStrategy::FirstMatch)?;
    let b = seed_swap(&store, "user_b", "Bob", AcceptanceStrategy::FirstMatch)?;
    let c = seed_swap(&store, "user_c", "Carol", AcceptanceStrategy::FirstMatch)?;

    service.target(&a.id, &b.id, "user_a", None, None)?;
    service.target(&b.id, &c.id, "user_b", None, None)?;

    // C -> A would route the chain back to its own origin
    let err = service
        .target(&c.id, &a.id, "user_c", None, None)
        .unwrap_err();
    assert_eq!(err.code(), "CIRCULAR_TARGETING");

    Ok(())
}

#[test]
fn retarget_replaces_atomically() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = open_store(&temp_dir, "retarget.db")?;
    let service = TargetingService::new(store.clone());

    let a = seed_swap(&store, "user_a", "Alice", AcceptanceStrategy::FirstMatch)?;
    let b = seed_swap(&store, "user_b", "Bob", AcceptanceStrategy::FirstMatch)?;
    let c = seed_swap(&store, "user_c", "Carol", AcceptanceStrategy::FirstMatch)?;

    let first = service
        .target(&b.id, &a.id, "user_b", Some("original offer".into()), None)
        .context("B targeting A: ")?;

    let second = service.retarget(&b.id, &c.id, "user_b")?;
    assert_eq!(second.target_swap_id, c.id);
    assert_eq!(second.status, EdgeStatus::Active);

    // old edge retired, exactly one active outgoing edge remains
    let old = store.edge(&first.id)?.unwrap();
    assert_eq!(old.status, EdgeStatus::Replaced);
    let graph = store.active_graph()?;
    assert_eq!(graph.outgoing(&b.id).unwrap().edge_id, second.id);
    assert_eq!(graph.len(), 1);

    // the proposal payload carried over to the new edge
    let prop = store.proposal(&second.proposal_id)?.unwrap();
    assert_eq!(prop.message.as_deref(), Some("original offer"));

    // a denied retarget leaves the current edge untouched: B -> B's owner
    let err = service.retarget(&b.id, &b.id, "user_b").unwrap_err();
    assert_eq!(err.code(), "CANNOT_TARGET_OWN_SWAP");
    let graph = store.active_graph()?;
    assert_eq!(graph.outgoing(&b.id).unwrap().edge_id, second.id);

    Ok(())
}

#[test]
fn remove_target_is_idempotent() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = open_store(&temp_dir, "remove_target.db")?;
    let service = TargetingService::new(store.clone());

    let a = seed_swap(&store, "user_a", "Alice", AcceptanceStrategy::FirstMatch)?;
    let b = seed_swap(&store, "user_b", "Bob", AcceptanceStrategy::FirstMatch)?;

    let edge = service.target(&b.id, &a.id, "user_b", None, None)?;

    let removed = service.remove_target(&b.id, "user_b")?;
    assert_eq!(removed.unwrap().id, edge.id);
    assert_eq!(store.edge(&edge.id)?.unwrap().status, EdgeStatus::Cancelled);

    // calling again with no active edge is a no-op success
    assert!(service.remove_target(&b.id, "user_b")?.is_none());

    Ok(())
}

#[test]
fn view_targeting_history() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = open_store(&temp_dir, "history_view.db")?;
    let service = TargetingService::new(store.clone());
    let query = TargetingQuery::new(store.clone());

    let a = seed_swap(&store, "user_a", "Alice", AcceptanceStrategy::FirstMatch)?;
    let b = seed_swap(&store, "user_b", "Bob", AcceptanceStrategy::FirstMatch)?;
    let c = seed_swap(&store, "user_c", "Carol", AcceptanceStrategy::FirstMatch)?;

    let edge = service.target(&b.id, &a.id, "user_b", None, None)?;
    service.retarget(&b.id, &c.id, "user_b")?;
    service.remove_target(&b.id, "user_b")?;

    let history = query.swap_history(&b.id, 50, 0)?;
    let actions: Vec<HistoryAction> = history.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            HistoryAction::Targeted,
            HistoryAction::Retargeted,
            HistoryAction::Removed,
        ]
    );
    assert_eq!(history[0].edge_id, edge.id);

    // B's owner sees the same activity through the per-user view
    let activity = query.user_activity("user_b", 50, 0)?;
    assert_eq!(activity.len(), 3);

    Ok(())
}
