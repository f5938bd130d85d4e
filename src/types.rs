use crate::error::{Result, SdkError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::TryFrom;
use std::fmt;

/// Kind of supply-chain event. Codes are fixed by the ledger contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EventType {
    Harvest = 0,
    Shipment = 1,
    Processing = 2,
    QualityCheck = 3,
    Sale = 4,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::Harvest,
        EventType::Shipment,
        EventType::Processing,
        EventType::QualityCheck,
        EventType::Sale,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Human readable label
    pub fn label(self) -> &'static str {
        match self {
            EventType::Harvest => "Harvest",
            EventType::Shipment => "Shipment",
            EventType::Processing => "Processing",
            EventType::QualityCheck => "Quality Check",
            EventType::Sale => "Sale",
        }
    }
}

impl TryFrom<u8> for EventType {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        EventType::from_code(code).ok_or_else(|| format!("unknown event type code {}", code))
    }
}

impl From<EventType> for u8 {
    fn from(kind: EventType) -> Self {
        kind.code()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Participant role, held in the profile store rather than on the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Role {
    Farmer = 0,
    Aggregator = 1,
    Processor = 2,
    Retailer = 3,
    Regulator = 4,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Farmer,
        Role::Aggregator,
        Role::Processor,
        Role::Retailer,
        Role::Regulator,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

impl TryFrom<u8> for Role {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        Role::from_code(code).ok_or_else(|| format!("unknown role code {}", code))
    }
}

impl From<Role> for u8 {
    fn from(role: Role) -> Self {
        role.code()
    }
}

/// A batch of product as stored on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: u64,
    pub creator: String,
    pub product_type: String,
    /// Unix seconds
    pub creation_timestamp: u64,
}

impl Batch {
    /// Parse the `getBatch` result, either the positional tuple
    /// `(id, creator, productType, creationTimestamp)` or a named object.
    pub fn from_ledger(value: &Value) -> Result<Self> {
        let (id, creator, product_type, ts) = match value {
            Value::Array(items) if items.len() >= 4 => {
                (&items[0], &items[1], &items[2], &items[3])
            }
            Value::Object(map) => (
                map.get("id").unwrap_or(&Value::Null),
                map.get("creator").unwrap_or(&Value::Null),
                map.get("productType").unwrap_or(&Value::Null),
                map.get("creationTimestamp").unwrap_or(&Value::Null),
            ),
            other => {
                return Err(SdkError::MalformedResponse(format!(
                    "unexpected getBatch result: {}",
                    other
                )))
            }
        };

        Ok(Batch {
            id: require_uint(id, "batch id")?,
            creator: require_str(creator, "creator")?,
            product_type: require_str(product_type, "productType")?,
            creation_timestamp: require_uint(ts, "creationTimestamp")?,
        })
    }
}

/// One entry of a batch's timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyChainEvent {
    /// Position in the batch's append order
    pub index: u64,
    pub event_type: EventType,
    pub actor: String,
    /// Unix seconds, assigned by the ledger
    pub timestamp: u64,
    pub data_hash: String,
}

impl SupplyChainEvent {
    /// Parse the `getBatchEvent` result `(eventType, actor, timestamp, dataHash)`.
    pub fn from_ledger(index: u64, value: &Value) -> Result<Self> {
        let (kind, actor, ts, data) = match value {
            Value::Array(items) if items.len() >= 4 => {
                (&items[0], &items[1], &items[2], &items[3])
            }
            Value::Object(map) => (
                map.get("eventType").unwrap_or(&Value::Null),
                map.get("actor").unwrap_or(&Value::Null),
                map.get("timestamp").unwrap_or(&Value::Null),
                map.get("dataHash").unwrap_or(&Value::Null),
            ),
            other => {
                return Err(SdkError::MalformedResponse(format!(
                    "unexpected getBatchEvent result: {}",
                    other
                )))
            }
        };

        let code = require_uint(kind, "eventType")?;
        let event_type = u8::try_from(code)
            .ok()
            .and_then(EventType::from_code)
            .ok_or_else(|| SdkError::MalformedResponse(format!("unknown event type {}", code)))?;

        Ok(SupplyChainEvent {
            index,
            event_type,
            actor: require_str(actor, "actor")?,
            timestamp: require_uint(ts, "timestamp")?,
            // Missing payloads are stored as empty strings
            data_hash: data.as_str().unwrap_or_default().to_string(),
        })
    }

    pub fn is_recorded_by(&self, identity: &str) -> bool {
        self.actor.eq_ignore_ascii_case(identity)
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Confirmed,
    Failed,
}

/// Raw log emitted by a confirmed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emitting contract address
    pub address: String,
    /// Event name, e.g. `BatchCreated`
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// Confirmed transaction receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
    #[serde(default)]
    pub block_number: Option<u64>,
    pub status: TxStatus,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl TxReceipt {
    /// Typed logs emitted by `contract`; logs from other addresses or with
    /// unparseable arguments are ignored.
    pub fn ledger_logs(&self, contract: &str) -> Vec<LedgerLog> {
        self.logs
            .iter()
            .filter(|log| log.address.eq_ignore_ascii_case(contract))
            .filter_map(LedgerLog::from_entry)
            .collect()
    }
}

/// Contract events the SDK understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerLog {
    BatchCreated {
        batch_id: u64,
        creator: String,
        product_type: String,
    },
    EventRecorded {
        batch_id: u64,
        event_type: EventType,
        actor: String,
        data_hash: String,
    },
}

impl LedgerLog {
    pub fn from_entry(entry: &LogEntry) -> Option<Self> {
        let args = &entry.args;
        match entry.name.as_str() {
            "BatchCreated" => Some(LedgerLog::BatchCreated {
                batch_id: parse_uint(&args["batchId"])?,
                creator: args["creator"].as_str()?.to_string(),
                product_type: args["productType"].as_str().unwrap_or_default().to_string(),
            }),
            "EventRecorded" => {
                let code = u8::try_from(parse_uint(&args["eventType"])?).ok()?;
                Some(LedgerLog::EventRecorded {
                    batch_id: parse_uint(&args["batchId"])?,
                    event_type: EventType::from_code(code)?,
                    actor: args["actor"].as_str()?.to_string(),
                    data_hash: args["dataHash"].as_str().unwrap_or_default().to_string(),
                })
            }
            _ => None,
        }
    }

    pub fn batch_id(&self) -> u64 {
        match self {
            LedgerLog::BatchCreated { batch_id, .. } => *batch_id,
            LedgerLog::EventRecorded { batch_id, .. } => *batch_id,
        }
    }
}

/// Read an unsigned integer rendered as a JSON number, a decimal string or a
/// `0x` hex string.
pub fn parse_uint(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) if !hex.is_empty() => u64::from_str_radix(hex, 16).ok(),
                Some(_) => None,
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}

pub(crate) fn require_uint(value: &Value, field: &str) -> Result<u64> {
    parse_uint(value)
        .ok_or_else(|| SdkError::MalformedResponse(format!("{} is not an integer: {}", field, value)))
}

fn require_str(value: &Value, field: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SdkError::MalformedResponse(format!("{} is not a string: {}", field, value)))
}
