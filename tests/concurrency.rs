//! Racing callers against one store: the serialization guarantees.

use std::sync::Arc;
use swap_targeting::{
    coordinator::TargetingService,
    error::TargetingError,
    store::TargetingStore,
    swap::{AcceptanceStrategy, Swap, TimeStamp},
    utils,
};
use tempfile::tempdir;

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

/// Two or more concurrent target() calls against the same first_match swap:
/// exactly one succeeds, never zero, never two; the losers receive
/// PROPOSAL_PENDING specifically.
#[test]
fn first_match_race_has_exactly_one_winner() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = open_store(&temp_dir, "race_first_match.db")?;
    let service = Arc::new(TargetingService::new(store.clone()));

    let target = seed_swap(&store, "owner_t", "Tara", AcceptanceStrategy::FirstMatch)?;

    let contenders = 8;
    let sources: Vec<Swap> = (0..contenders)
        .map(|i| {
            seed_swap(
                &store,
                &format!("user_{i}"),
                &format!("User {i}"),
                AcceptanceStrategy::FirstMatch,
            )
        })
        .collect::<anyhow::Result<_>>()?;

    let mut outcomes = Vec::with_capacity(contenders);
    std::thread::scope(|scope| {
        let handles: Vec<_> = sources
            .iter()
            .map(|source| {
                let service = Arc::clone(&service);
                let target_id = target.id.clone();
                scope.spawn(move || {
                    service.target(&source.id, &target_id, &source.owner_id, None, None)
                })
            })
            .collect();
        for handle in handles {
            outcomes.push(handle.join().expect("targeting thread panicked"));
        }
    });

    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one racing call must win");

    for outcome in &outcomes {
        if let Err(e) = outcome {
            assert!(
                matches!(e, TargetingError::ProposalPending),
                "loser must see PROPOSAL_PENDING, got {e}"
            );
        }
    }

    // the store agrees: one active incoming edge
    let graph = store.active_graph()?;
    assert_eq!(graph.incoming_count(&target.id), 1);
    assert!(graph.is_acyclic());

    Ok(())
}

/// Under auction, N distinct sources all hold active edges simultaneously.
#[test]
fn auction_admits_concurrent_bidders() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = open_store(&temp_dir, "race_auction.db")?;
    let service = Arc::new(TargetingService::new(store.clone()));

    let end_date = TimeStamp::new_with(2040, 1, 1, 0, 0, 0);
    let target = seed_swap(
        &store,
        "owner_t",
        "Tara",
        AcceptanceStrategy::Auction { end_date },
    )?;

    let bidders = 5;
    let sources: Vec<Swap> = (0..bidders)
        .map(|i| {
            seed_swap(
                &store,
                &format!("user_{i}"),
                &format!("User {i}"),
                AcceptanceStrategy::FirstMatch,
            )
        })
        .collect::<anyhow::Result<_>>()?;

    std::thread::scope(|scope| {
        let handles: Vec<_> = sources
            .iter()
            .map(|source| {
                let service = Arc::clone(&service);
                let target_id = target.id.clone();
                scope.spawn(move || {
                    service.target(&source.id, &target_id, &source.owner_id, None, None)
                })
            })
            .collect();
        for handle in handles {
            handle
                .join()
                .expect("bidding thread panicked")
                .expect("every auction bid must be admitted");
        }
    });

    let graph = store.active_graph()?;
    assert_eq!(graph.incoming_count(&target.id), bidders);

    Ok(())
}

/// Concurrent retargets must never jointly close a cycle: with A -> B live,
/// racing B -> C and C -> A can both land only if the result stays acyclic.
#[test]
fn concurrent_targets_never_close_a_cycle() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = open_store(&temp_dir, "race_cycle.db")?;
    let service = Arc::new(TargetingService::new(store.clone()));

    let a = seed_swap(&store, "user_a", "Alice", AcceptanceStrategy::FirstMatch)?;
    let b = seed_swap(&store, "user_b", "Bob", AcceptanceStrategy::FirstMatch)?;
    let c = seed_swap(&store, "user_c", "Carol", AcceptanceStrategy::FirstMatch)?;

    service.target(&a.id, &b.id, "user_a", None, None)?;

    // race: B -> C and C -> A; serialized transactions mean at most one of
    // the two orderings admits both, and never a cycle
    std::thread::scope(|scope| {
        let h1 = {
            let service = Arc::clone(&service);
            let (src, tgt) = (b.id.clone(), c.id.clone());
            scope.spawn(move || service.target(&src, &tgt, "user_b", None, None))
        };
        let h2 = {
            let service = Arc::clone(&service);
            let (src, tgt) = (c.id.clone(), a.id.clone());
            scope.spawn(move || service.target(&src, &tgt, "user_c", None, None))
        };
        let _ = h1.join().expect("thread panicked");
        let _ = h2.join().expect("thread panicked");
    });

    let graph = store.active_graph()?;
    assert!(graph.is_acyclic(), "racing targets formed a cycle");

    Ok(())
}
