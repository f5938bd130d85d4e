//! Off-ledger participation index.
//!
//! Materialized from `BatchCreated` / `EventRecorded` logs so creator and
//! participant lookups do not rescan the ledger.

use crate::types::{LedgerLog, TxReceipt};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct IndexState {
    /// creator -> batch ids
    created: HashMap<String, BTreeSet<u64>>,
    /// actor -> batch ids they recorded events on
    touched: HashMap<String, BTreeSet<u64>>,
}

/// Batch ids keyed by lower-cased identity
#[derive(Clone, Default)]
pub struct ParticipationIndex {
    state: Arc<RwLock<IndexState>>,
}

impl ParticipationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one ledger log
    pub async fn apply(&self, log: &LedgerLog) {
        let mut state = self.state.write().await;
        match log {
            LedgerLog::BatchCreated {
                batch_id, creator, ..
            } => {
                state
                    .created
                    .entry(creator.to_lowercase())
                    .or_default()
                    .insert(*batch_id);
            }
            LedgerLog::EventRecorded {
                batch_id, actor, ..
            } => {
                state
                    .touched
                    .entry(actor.to_lowercase())
                    .or_default()
                    .insert(*batch_id);
            }
        }
    }

    /// Apply every log `contract` emitted in a receipt
    pub async fn ingest_receipt(&self, receipt: &TxReceipt, contract: &str) {
        for log in receipt.ledger_logs(contract) {
            self.apply(&log).await;
        }
    }

    /// Batches created by `identity`, most recent first
    pub async fn batches_created_by(&self, identity: &str) -> Vec<u64> {
        let state = self.state.read().await;
        newest_first(state.created.get(&identity.to_lowercase()))
    }

    /// Batches `identity` has recorded at least one event on, most recent first
    pub async fn batches_touched_by(&self, identity: &str) -> Vec<u64> {
        let state = self.state.read().await;
        newest_first(state.touched.get(&identity.to_lowercase()))
    }

    pub async fn clear(&self) {
        *self.state.write().await = IndexState::default();
    }
}

fn newest_first(ids: Option<&BTreeSet<u64>>) -> Vec<u64> {
    ids.map(|ids| ids.iter().rev().copied().collect())
        .unwrap_or_default()
}
