use crate::error::{Result, SdkError};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Polygon Amoy testnet
pub const DEFAULT_CHAIN_ID: u64 = 80002;

/// Connection and scan settings for a ledger session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    /// JSON-RPC gateway URL
    pub rpc_url: String,

    /// Supply-chain contract address
    pub contract_address: String,

    /// Chain the session must be connected to
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// How long `submit` waits for a receipt
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    /// Delay between receipt polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Maximum ledger reads in flight during bulk scans
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,

    /// How many recent batches filtered scans look at
    #[serde(default = "default_scan_bound")]
    pub scan_bound: usize,
}

fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

fn default_confirmation_timeout() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    500
}

fn default_read_concurrency() -> usize {
    8
}

fn default_scan_bound() -> usize {
    50
}

impl LedgerConfig {
    pub fn new(rpc_url: impl Into<String>, contract_address: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into().trim_end_matches('/').to_string(),
            contract_address: contract_address.into(),
            chain_id: default_chain_id(),
            confirmation_timeout_secs: default_confirmation_timeout(),
            poll_interval_ms: default_poll_interval(),
            read_concurrency: default_read_concurrency(),
            scan_bound: default_scan_bound(),
        }
    }

    /// Load from the process environment, reading a `.env` file first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let rpc_url = env::var("LEDGER_RPC_URL")
            .map_err(|_| SdkError::InvalidConfig("LEDGER_RPC_URL is not set".into()))?;
        let contract = env::var("LEDGER_CONTRACT_ADDRESS")
            .map_err(|_| SdkError::InvalidConfig("LEDGER_CONTRACT_ADDRESS is not set".into()))?;

        let mut config = Self::new(rpc_url, contract);
        if let Some(chain_id) = env_number("LEDGER_CHAIN_ID")? {
            config.chain_id = chain_id;
        }
        if let Some(secs) = env_number("LEDGER_CONFIRMATION_TIMEOUT_SECS")? {
            config.confirmation_timeout_secs = secs;
        }
        if let Some(ms) = env_number("LEDGER_POLL_INTERVAL_MS")? {
            config.poll_interval_ms = ms;
        }
        if let Some(n) = env_number("LEDGER_READ_CONCURRENCY")? {
            config.read_concurrency = n;
        }
        if let Some(n) = env_number("LEDGER_SCAN_BOUND")? {
            config.scan_bound = n;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_read_concurrency(mut self, n: usize) -> Self {
        self.read_concurrency = n;
        self
    }

    pub fn with_scan_bound(mut self, n: usize) -> Self {
        self.scan_bound = n;
        self
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(SdkError::InvalidConfig("RPC URL must not be empty".into()));
        }
        if self.contract_address.trim().is_empty() {
            return Err(SdkError::InvalidConfig("Contract address must not be empty".into()));
        }
        if self.read_concurrency == 0 {
            return Err(SdkError::InvalidConfig("Read concurrency must be at least 1".into()));
        }
        if self.scan_bound == 0 {
            return Err(SdkError::InvalidConfig("Scan bound must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(SdkError::InvalidConfig("Poll interval must be non-zero".into()));
        }
        Ok(())
    }
}

fn env_number<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SdkError::InvalidConfig(format!("{} is not a valid number: {}", key, raw))),
        Err(_) => Ok(None),
    }
}
