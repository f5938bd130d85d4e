//! In-process ledger with the supply-chain contract's semantics.
//!
//! Used for tests and local tooling. Fault switches let callers make single
//! reads fail, withhold receipt logs or delay confirmations.

use crate::error::{Result, SdkError};
use crate::transport::LedgerTransport;
use crate::types::{parse_uint, EventType, LogEntry, TxReceipt, TxStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};

const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// Code used for contract reverts
const REVERT_CODE: i64 = 3;

struct StoredEvent {
    event_type: EventType,
    actor: String,
    timestamp: u64,
    data_hash: String,
}

struct StoredBatch {
    creator: String,
    product_type: String,
    created_at: u64,
    events: Vec<StoredEvent>,
}

struct PendingReceipt {
    receipt: TxReceipt,
    polls_remaining: u32,
}

#[derive(Default)]
struct Faults {
    reject_accounts: bool,
    drop_logs: bool,
    confirmation_delay: u32,
    failing_batches: HashSet<u64>,
    failing_events: HashSet<(u64, u64)>,
}

struct LedgerState {
    chain_id: u64,
    accounts: Vec<String>,
    next_batch_id: u64,
    batches: BTreeMap<u64, StoredBatch>,
    /// Every receipt ever issued. Never pruned; a receipt stays queryable for
    /// the ledger's lifetime as it would on chain.
    receipts: HashMap<String, PendingReceipt>,
    tx_count: u64,
    faults: Faults,
}

pub struct MemoryLedger {
    contract: String,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub const DEFAULT_CHAIN_ID: u64 = crate::config::DEFAULT_CHAIN_ID;

    pub fn new(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            state: Mutex::new(LedgerState {
                chain_id: Self::DEFAULT_CHAIN_ID,
                accounts: Vec::new(),
                next_batch_id: 1,
                batches: BTreeMap::new(),
                receipts: HashMap::new(),
                tx_count: 0,
                faults: Faults::default(),
            }),
        }
    }

    pub fn with_account(self, account: impl Into<String>) -> Self {
        self.state.lock().accounts.push(account.into());
        self
    }

    pub fn with_chain_id(self, chain_id: u64) -> Self {
        self.state.lock().chain_id = chain_id;
        self
    }

    /// Switch the network the wallet reports, as if the user changed it.
    pub fn set_chain_id(&self, chain_id: u64) {
        self.state.lock().chain_id = chain_id;
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Replace the wallet's accounts; the first one signs after the next connect.
    pub fn set_accounts<I, S>(&self, accounts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().accounts = accounts.into_iter().map(Into::into).collect();
    }

    pub fn reject_account_requests(&self, reject: bool) {
        self.state.lock().faults.reject_accounts = reject;
    }

    /// Strip logs from receipts of subsequent transactions.
    pub fn drop_receipt_logs(&self, drop: bool) {
        self.state.lock().faults.drop_logs = drop;
    }

    /// Number of receipt polls that report "pending" before confirmation.
    pub fn set_confirmation_delay(&self, polls: u32) {
        self.state.lock().faults.confirmation_delay = polls;
    }

    pub fn fail_batch_read(&self, batch_id: u64) {
        self.state.lock().faults.failing_batches.insert(batch_id);
    }

    pub fn fail_event_read(&self, batch_id: u64, index: u64) {
        self.state.lock().faults.failing_events.insert((batch_id, index));
    }

    pub fn transaction_count(&self) -> u64 {
        self.state.lock().tx_count
    }

    fn check_contract(&self, contract: &str) -> Result<()> {
        if contract.eq_ignore_ascii_case(&self.contract) {
            Ok(())
        } else {
            Err(SdkError::Rpc {
                code: -32602,
                message: format!("no contract at {}", contract),
            })
        }
    }

    fn execute(
        &self,
        state: &mut LedgerState,
        from: &str,
        method: &str,
        args: &[Value],
        timestamp: u64,
    ) -> Result<std::result::Result<Vec<LogEntry>, String>> {
        match method {
            "createBatch" => {
                let product_type = arg_str(args, 0)?;
                let batch_id = state.next_batch_id;
                state.next_batch_id += 1;
                state.batches.insert(
                    batch_id,
                    StoredBatch {
                        creator: from.to_string(),
                        product_type: product_type.clone(),
                        created_at: timestamp,
                        events: Vec::new(),
                    },
                );
                Ok(Ok(vec![self.log(
                    "BatchCreated",
                    json!({ "batchId": batch_id, "creator": from, "productType": product_type }),
                )]))
            }
            "recordEvent" => {
                let batch_id = arg_uint(args, 0)?;
                let code = arg_uint(args, 1)?;
                let data_hash = arg_str(args, 2)?;

                let Some(event_type) = u8::try_from(code).ok().and_then(EventType::from_code)
                else {
                    return Ok(Err("Invalid event type".to_string()));
                };
                let Some(batch) = state.batches.get_mut(&batch_id) else {
                    return Ok(Err("Batch does not exist".to_string()));
                };

                batch.events.push(StoredEvent {
                    event_type,
                    actor: from.to_string(),
                    timestamp,
                    data_hash: data_hash.clone(),
                });
                Ok(Ok(vec![self.log(
                    "EventRecorded",
                    json!({
                        "batchId": batch_id,
                        "eventType": event_type.code(),
                        "actor": from,
                        "dataHash": data_hash,
                    }),
                )]))
            }
            other => Err(SdkError::Rpc {
                code: -32601,
                message: format!("unknown method {}", other),
            }),
        }
    }

    fn log(&self, name: &str, args: Value) -> LogEntry {
        LogEntry {
            address: self.contract.clone(),
            name: name.to_string(),
            args,
        }
    }
}

#[async_trait]
impl LedgerTransport for MemoryLedger {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.state.lock().chain_id)
    }

    async fn request_accounts(&self) -> Result<Vec<String>> {
        let state = self.state.lock();
        if state.faults.reject_accounts {
            return Err(SdkError::UserRejected);
        }
        Ok(state.accounts.clone())
    }

    async fn call(&self, contract: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        self.check_contract(contract)?;
        let state = self.state.lock();

        match method {
            "nextBatchId" => Ok(json!(state.next_batch_id)),
            "getBatch" => {
                let batch_id = arg_uint(&args, 0)?;
                if state.faults.failing_batches.contains(&batch_id) {
                    return Err(unavailable());
                }
                let batch = state.batches.get(&batch_id).ok_or_else(missing_batch)?;
                Ok(json!([batch_id, batch.creator, batch.product_type, batch.created_at]))
            }
            "getBatchHistoryCount" => {
                let batch_id = arg_uint(&args, 0)?;
                let batch = state.batches.get(&batch_id).ok_or_else(missing_batch)?;
                Ok(json!(batch.events.len()))
            }
            "getBatchEvent" => {
                let batch_id = arg_uint(&args, 0)?;
                let index = arg_uint(&args, 1)?;
                if state.faults.failing_events.contains(&(batch_id, index)) {
                    return Err(unavailable());
                }
                let batch = state.batches.get(&batch_id).ok_or_else(missing_batch)?;
                let event = usize::try_from(index)
                    .ok()
                    .and_then(|i| batch.events.get(i))
                    .ok_or_else(|| revert("Index out of bounds"))?;
                Ok(json!([
                    event.event_type.code(),
                    event.actor,
                    event.timestamp,
                    event.data_hash
                ]))
            }
            other => Err(SdkError::Rpc {
                code: -32601,
                message: format!("unknown method {}", other),
            }),
        }
    }

    async fn send_transaction(
        &self,
        from: &str,
        contract: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<String> {
        self.check_contract(contract)?;
        let mut state = self.state.lock();

        let nonce = state.tx_count;
        let timestamp = GENESIS_TIMESTAMP + nonce;
        let outcome = self.execute(&mut state, from, method, &args, timestamp)?;
        state.tx_count += 1;

        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}:{}:{}", nonce, from, method, Value::from(args)));
        let tx_hash = format!("0x{}", hex::encode(hasher.finalize()));

        let (status, mut logs) = match outcome {
            Ok(logs) => (TxStatus::Confirmed, logs),
            Err(reason) => {
                tracing::debug!(%tx_hash, %reason, "memory ledger transaction reverted");
                (TxStatus::Failed, Vec::new())
            }
        };
        if state.faults.drop_logs {
            logs.clear();
        }

        let polls_remaining = state.faults.confirmation_delay;
        state.receipts.insert(
            tx_hash.clone(),
            PendingReceipt {
                receipt: TxReceipt {
                    tx_hash: tx_hash.clone(),
                    block_number: Some(nonce + 1),
                    status,
                    logs,
                },
                polls_remaining,
            },
        );

        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        let mut state = self.state.lock();
        let Some(pending) = state.receipts.get_mut(tx_hash) else {
            return Ok(None);
        };
        if pending.polls_remaining > 0 {
            pending.polls_remaining -= 1;
            return Ok(None);
        }
        Ok(Some(pending.receipt.clone()))
    }
}

fn revert(reason: &str) -> SdkError {
    SdkError::Rpc {
        code: REVERT_CODE,
        message: format!("execution reverted: {}", reason),
    }
}

fn missing_batch() -> SdkError {
    revert("Batch does not exist")
}

fn unavailable() -> SdkError {
    SdkError::Rpc {
        code: -32603,
        message: "internal error: state unavailable".into(),
    }
}

fn arg_uint(args: &[Value], position: usize) -> Result<u64> {
    args.get(position).and_then(parse_uint).ok_or_else(|| SdkError::Rpc {
        code: -32602,
        message: format!("argument {} must be an unsigned integer", position),
    })
}

fn arg_str(args: &[Value], position: usize) -> Result<String> {
    args.get(position)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SdkError::Rpc {
            code: -32602,
            message: format!("argument {} must be a string", position),
        })
}
