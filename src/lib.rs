//! Swap targeting and proposal lifecycle engine.
//!
//! Holders of exchangeable reservations ("swaps") propose directed exchanges
//! with other swaps. The engine creates, mutates, and retires the directed
//! targeting edges between them, enforces the structural invariants (no
//! self-targeting, no circular chains), and resolves the two acceptance
//! disciplines: `first_match` (one live proposal at a time) and `auction`
//! (many live proposals until a deadline).
//!
//! [`coordinator::TargetingService`] is the only writer; every mutating
//! operation is one serializable sled transaction. [`query::TargetingQuery`]
//! builds the read-only views. [`history`] is the append-only audit trail.

pub mod coordinator;
pub mod edge;
pub mod eligibility;
pub mod error;
pub mod graph;
pub mod history;
pub mod query;
pub mod response;
pub mod store;
pub mod strategy;
pub mod swap;
pub mod utils;
