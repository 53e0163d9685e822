//! Active-edge graph snapshot.
//!
//! The set of `active` edges forms a directed graph over swaps. It is stored
//! as a single record and re-read inside every mutating transaction, so cycle
//! checks always run against the same snapshot the insert commits into. A
//! source swap holds at most one outgoing edge, so the adjacency is a map
//! from source to target.

use std::collections::{HashMap, HashSet};

#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct ActiveEdgeRef {
    #[n(0)]
    pub edge_id: String,
    #[n(1)]
    pub source_swap_id: String,
    #[n(2)]
    pub target_swap_id: String,
}

#[derive(Debug, Default, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct ActiveGraph {
    #[n(0)]
    edges: Vec<ActiveEdgeRef>,
}

impl ActiveGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edges(&self) -> &[ActiveEdgeRef] {
        &self.edges
    }

    /// The single active outgoing edge of a source swap, if any.
    pub fn outgoing(&self, source_swap_id: &str) -> Option<&ActiveEdgeRef> {
        self.edges
            .iter()
            .find(|e| e.source_swap_id == source_swap_id)
    }

    pub fn incoming<'a>(
        &'a self,
        target_swap_id: &'a str,
    ) -> impl Iterator<Item = &'a ActiveEdgeRef> {
        self.edges
            .iter()
            .filter(move |e| e.target_swap_id == target_swap_id)
    }

    pub fn incoming_count(&self, target_swap_id: &str) -> usize {
        self.incoming(target_swap_id).count()
    }

    pub fn insert(&mut self, edge: ActiveEdgeRef) {
        self.edges.push(edge);
    }

    pub fn remove(&mut self, edge_id: &str) -> Option<ActiveEdgeRef> {
        let idx = self.edges.iter().position(|e| e.edge_id == edge_id)?;
        Some(self.edges.swap_remove(idx))
    }

    /// True when `to` is reachable from `from` by walking active edges.
    /// Iterative depth-first with a visited set; work is bounded by the
    /// number of active edges.
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }

        let adjacency: HashMap<&str, &str> = self
            .edges
            .iter()
            .map(|e| (e.source_swap_id.as_str(), e.target_swap_id.as_str()))
            .collect();

        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack = vec![from];

        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            if let Some(&next) = adjacency.get(node) {
                if next == to {
                    return true;
                }
                stack.push(next);
            }
        }

        false
    }

    /// True when every node in the graph fails to reach itself through a
    /// non-empty walk. Used by the invariant tests; the coordinator never
    /// lets a cycle form in the first place.
    pub fn is_acyclic(&self) -> bool {
        self.edges.iter().all(|e| {
            // a cycle through e exists iff its target reaches back to its source
            !self.has_path(&e.target_swap_id, &e.source_swap_id)
        })
    }
}
