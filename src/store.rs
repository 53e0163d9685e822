//! Targeting store: the single durable source of truth.
//!
//! Four sled trees share one database:
//! - `swaps`   — swap id → CBOR [`Swap`]
//! - `edges`   — edge id → CBOR [`TargetingEdge`], proposal id → CBOR
//!   [`Proposal`] (the `edge`/`prop` id prefixes keep the keyspaces apart)
//! - `meta`    — the active-edge graph snapshot and the history sequence
//!   counter
//! - `history` — big-endian sequence number → CBOR [`HistoryEntry`]
//!
//! Only the coordinator writes through the transactional helpers below; the
//! query service and tests use the plain read methods.

use crate::edge::{Proposal, TargetingEdge};
use crate::error::TargetingError;
use crate::graph::ActiveGraph;
use crate::history::HistoryEntry;
use crate::swap::{Swap, SwapState};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionResult, TransactionalTree,
};
use sled::{Db, Tree};
use std::sync::Arc;

const GRAPH_KEY: &[u8] = b"graph";
const SEQ_KEY: &[u8] = b"seq";

#[derive(Clone)]
pub struct TargetingStore {
    db: Arc<Db>,
    pub(crate) swaps: Tree,
    pub(crate) edges: Tree,
    pub(crate) meta: Tree,
    pub(crate) history: Tree,
}

impl TargetingStore {
    pub fn open(db: Arc<Db>) -> Result<Self, TargetingError> {
        Ok(Self {
            swaps: db.open_tree("swaps")?,
            edges: db.open_tree("edges")?,
            meta: db.open_tree("meta")?,
            history: db.open_tree("history")?,
            db,
        })
    }

    pub fn flush(&self) -> Result<(), TargetingError> {
        self.db.flush()?;
        Ok(())
    }

    // swap records

    pub fn insert_swap(&self, swap: &Swap) -> Result<(), TargetingError> {
        self.swaps.insert(swap.id.as_bytes(), to_cbor(swap)?)?;
        Ok(())
    }

    pub fn swap(&self, swap_id: &str) -> Result<Option<Swap>, TargetingError> {
        match self.swaps.get(swap_id.as_bytes())? {
            Some(raw) => Ok(Some(from_cbor(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn update_swap_state(
        &self,
        swap_id: &str,
        state: SwapState,
    ) -> Result<(), TargetingError> {
        let mut swap = self
            .swap(swap_id)?
            .ok_or_else(|| TargetingError::NotFound(format!("swap {swap_id}")))?;
        swap.state = state;
        self.insert_swap(&swap)
    }

    pub fn remove_swap(&self, swap_id: &str) -> Result<(), TargetingError> {
        self.swaps.remove(swap_id.as_bytes())?;
        Ok(())
    }

    pub fn swaps_owned_by(&self, owner_id: &str) -> Result<Vec<Swap>, TargetingError> {
        let mut out = Vec::new();
        for item in self.swaps.iter() {
            let (_, raw) = item?;
            let swap: Swap = from_cbor(&raw)?;
            if swap.owner_id == owner_id {
                out.push(swap);
            }
        }
        Ok(out)
    }

    // edge and proposal records

    pub fn edge(&self, edge_id: &str) -> Result<Option<TargetingEdge>, TargetingError> {
        match self.edges.get(edge_id.as_bytes())? {
            Some(raw) => Ok(Some(from_cbor(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn proposal(&self, proposal_id: &str) -> Result<Option<Proposal>, TargetingError> {
        match self.edges.get(proposal_id.as_bytes())? {
            Some(raw) => Ok(Some(from_cbor(&raw)?)),
            None => Ok(None),
        }
    }

    /// All edge records ever written, any status. Proposal rows live in the
    /// same tree under the `prop` prefix and are skipped by the scan.
    pub fn all_edges(&self) -> Result<Vec<TargetingEdge>, TargetingError> {
        let mut out = Vec::new();
        for item in self.edges.scan_prefix(b"edge") {
            let (_, raw) = item?;
            out.push(from_cbor(&raw)?);
        }
        Ok(out)
    }

    // graph snapshot and history

    pub fn active_graph(&self) -> Result<ActiveGraph, TargetingError> {
        match self.meta.get(GRAPH_KEY)? {
            Some(raw) => Ok(from_cbor(&raw)?),
            None => Ok(ActiveGraph::new()),
        }
    }

    /// History entries in append order.
    pub fn history_entries(&self) -> Result<Vec<HistoryEntry>, TargetingError> {
        let mut out = Vec::new();
        for item in self.history.iter() {
            let (_, raw) = item?;
            out.push(from_cbor(&raw)?);
        }
        Ok(out)
    }
}

// codec helpers shared by the read paths and the transaction helpers

pub(crate) fn to_cbor<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, TargetingError> {
    Ok(minicbor::to_vec(value)?)
}

pub(crate) fn from_cbor<T: for<'b> minicbor::Decode<'b, ()>>(
    raw: &[u8],
) -> Result<T, TargetingError> {
    Ok(minicbor::decode(raw)?)
}

// transaction-scope helpers. sled transactional trees expose point reads and
// writes only, which is why the active graph lives under a single key: it is
// readable, checkable, and replaceable inside the same serializable
// transaction that inserts the edge.

pub(crate) type TxnResult<T> = ConflictableTransactionResult<T, TargetingError>;

pub(crate) fn abort<T>(err: TargetingError) -> TxnResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

pub(crate) fn txn_get<T: for<'b> minicbor::Decode<'b, ()>>(
    tree: &TransactionalTree,
    key: &str,
) -> TxnResult<Option<T>> {
    match tree.get(key.as_bytes())? {
        Some(raw) => match minicbor::decode(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => abort(TargetingError::Decode(e)),
        },
        None => Ok(None),
    }
}

pub(crate) fn txn_put<T: minicbor::Encode<()>>(
    tree: &TransactionalTree,
    key: &str,
    value: &T,
) -> TxnResult<()> {
    match minicbor::to_vec(value) {
        Ok(raw) => {
            tree.insert(key.as_bytes(), raw)?;
            Ok(())
        }
        Err(e) => abort(TargetingError::Encode(e)),
    }
}

pub(crate) fn txn_graph(meta: &TransactionalTree) -> TxnResult<ActiveGraph> {
    match meta.get(GRAPH_KEY)? {
        Some(raw) => match minicbor::decode(&raw) {
            Ok(graph) => Ok(graph),
            Err(e) => abort(TargetingError::Decode(e)),
        },
        None => Ok(ActiveGraph::new()),
    }
}

pub(crate) fn txn_put_graph(meta: &TransactionalTree, graph: &ActiveGraph) -> TxnResult<()> {
    match minicbor::to_vec(graph) {
        Ok(raw) => {
            meta.insert(GRAPH_KEY, raw)?;
            Ok(())
        }
        Err(e) => abort(TargetingError::Encode(e)),
    }
}

/// Append a history entry under the next sequence number. Both the counter
/// bump and the entry ride the surrounding transaction.
pub(crate) fn txn_append_history(
    meta: &TransactionalTree,
    history: &TransactionalTree,
    entry: &HistoryEntry,
) -> TxnResult<()> {
    let seq = match meta.get(SEQ_KEY)? {
        Some(raw) => match <[u8; 8]>::try_from(raw.as_ref()) {
            Ok(bytes) => u64::from_be_bytes(bytes),
            // a malformed counter must never rewind to 0: reused keys would
            // overwrite existing entries
            Err(_) => {
                return abort(TargetingError::Decode(minicbor::decode::Error::message(
                    "history sequence counter is corrupted",
                )));
            }
        },
        None => 0,
    };
    meta.insert(SEQ_KEY, (seq + 1).to_be_bytes().to_vec())?;

    match minicbor::to_vec(entry) {
        Ok(raw) => {
            history.insert(seq.to_be_bytes().to_vec(), raw)?;
            Ok(())
        }
        Err(e) => abort(TargetingError::Encode(e)),
    }
}

/// Collapse a sled transaction result back into the crate taxonomy.
pub(crate) fn commit<T>(res: TransactionResult<T, TargetingError>) -> Result<T, TargetingError> {
    res.map_err(|e| match e {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => TargetingError::Store(err),
    })
}
