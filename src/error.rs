use crate::types::{EventType, Role};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SdkError>;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Not connected: {0}")]
    Connection(String),

    #[error("Wrong network: expected chain {expected}, connected to {actual}")]
    WrongNetwork { expected: u64, actual: u64 },

    #[error("Connection rejected by user")]
    UserRejected,

    #[error("Batch not found: {0}")]
    BatchNotFound(u64),

    #[error("Batch created but its id could not be resolved: {0}")]
    BatchIdResolution(String),

    #[error("Could not read event {index} of batch {batch_id}: {reason}")]
    EventRead {
        batch_id: u64,
        index: u64,
        reason: String,
    },

    #[error("Role {role:?} may not record {event_type:?} events")]
    EventNotPermitted { role: Role, event_type: EventType },

    #[error("Transaction {tx_hash} was not confirmed in time")]
    ConfirmationTimeout { tx_hash: String },

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed ledger response: {0}")]
    MalformedResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SdkError {
    /// Whether the ledger reverted a read because the batch does not exist.
    pub fn is_missing_batch(&self) -> bool {
        match self {
            SdkError::BatchNotFound(_) => true,
            SdkError::Rpc { message, .. } => {
                let message = message.to_lowercase();
                message.contains("does not exist") || message.contains("not found")
            }
            _ => false,
        }
    }
}

impl From<String> for SdkError {
    fn from(s: String) -> Self {
        SdkError::Other(s)
    }
}

impl From<&str> for SdkError {
    fn from(s: &str) -> Self {
        SdkError::Other(s.to_string())
    }
}
