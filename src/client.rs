use crate::config::LedgerConfig;
use crate::error::{Result, SdkError};
use crate::transport::LedgerTransport;
use crate::types::{TxReceipt, TxStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

/// An authenticated actor on a specific chain
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: Uuid,
    /// Signing identity
    pub actor: String,
    pub chain_id: u64,
    pub connected_at: DateTime<Utc>,
}

/// Ledger client. Owns the current session; connecting or disconnecting
/// replaces it as a whole.
pub struct LedgerClient<T: LedgerTransport> {
    transport: T,
    config: LedgerConfig,
    session: Option<Session>,
}

impl<T: LedgerTransport> LedgerClient<T> {
    pub fn new(transport: T, config: LedgerConfig) -> Self {
        Self {
            transport,
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Connected actor, if any
    pub fn actor(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.actor.as_str())
    }

    /// Establish a session and return the signing identity.
    ///
    /// Any previous session is dropped first, so a failed reconnect leaves the
    /// client disconnected.
    pub async fn connect(&mut self) -> Result<String> {
        self.disconnect();

        let accounts = self.transport.request_accounts().await?;
        let actor = accounts
            .into_iter()
            .find(|a| !a.trim().is_empty())
            .ok_or_else(|| SdkError::Connection("no signing account available".into()))?;

        let chain_id = self.transport.chain_id().await?;
        if chain_id != self.config.chain_id {
            return Err(SdkError::WrongNetwork {
                expected: self.config.chain_id,
                actual: chain_id,
            });
        }

        let session = Session {
            id: Uuid::new_v4(),
            actor: actor.clone(),
            chain_id,
            connected_at: Utc::now(),
        };
        tracing::info!(session = %session.id, %actor, chain_id, "ledger session established");
        self.session = Some(session);

        Ok(actor)
    }

    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!(session = %session.id, "ledger session closed");
        }
    }

    /// Read-only contract call
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        tracing::debug!(method, "ledger call");
        self.transport
            .call(&self.config.contract_address, method, args)
            .await
    }

    /// Send a state-changing call and wait for its receipt.
    ///
    /// The transaction is broadcast once. A timeout means the outcome is
    /// unknown, not that the write did not happen.
    pub async fn submit(&self, method: &str, args: Vec<Value>) -> Result<TxReceipt> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| SdkError::Connection("wallet not connected".into()))?;

        let tx_hash = self
            .transport
            .send_transaction(&session.actor, &self.config.contract_address, method, args)
            .await?;
        tracing::debug!(method, %tx_hash, "transaction sent");

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        if receipt.status == TxStatus::Failed {
            return Err(SdkError::TransactionFailed(format!(
                "{} reverted in {}",
                method, tx_hash
            )));
        }

        Ok(receipt)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt> {
        let deadline = Instant::now() + self.config.confirmation_timeout();

        loop {
            if let Some(receipt) = self.transport.transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            if Instant::now() >= deadline {
                return Err(SdkError::ConfirmationTimeout {
                    tx_hash: tx_hash.to_string(),
                });
            }
            sleep(self.config.poll_interval()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedger;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const CONTRACT: &str = "0xC0FFEE";

    fn config() -> LedgerConfig {
        LedgerConfig::new("memory://", CONTRACT)
            .with_chain_id(MemoryLedger::DEFAULT_CHAIN_ID)
            .with_poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_connect_returns_actor() {
        let ledger = MemoryLedger::new(CONTRACT).with_account("0xFarmer");
        let mut client = LedgerClient::new(ledger, config());

        let actor = client.connect().await.unwrap();
        assert_eq!(actor, "0xFarmer");
        assert_eq!(client.actor(), Some("0xFarmer"));

        client.disconnect();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_without_accounts() {
        let mut client = LedgerClient::new(MemoryLedger::new(CONTRACT), config());
        assert!(matches!(client.connect().await, Err(SdkError::Connection(_))));
    }

    #[tokio::test]
    async fn test_connect_wrong_network() {
        let ledger = MemoryLedger::new(CONTRACT).with_account("0xFarmer");
        let mut client = LedgerClient::new(ledger, config().with_chain_id(1));

        match client.connect().await {
            Err(SdkError::WrongNetwork { expected, actual }) => {
                assert_eq!(expected, 1);
                assert_eq!(actual, MemoryLedger::DEFAULT_CHAIN_ID);
            }
            other => panic!("expected wrong network, got {:?}", other),
        }
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_rejected() {
        let ledger = Arc::new(MemoryLedger::new(CONTRACT).with_account("0xFarmer"));
        ledger.reject_account_requests(true);
        let mut client = LedgerClient::new(ledger, config());

        assert!(matches!(client.connect().await, Err(SdkError::UserRejected)));
    }

    #[tokio::test]
    async fn test_failed_reconnect_drops_session() {
        let ledger = Arc::new(MemoryLedger::new(CONTRACT).with_account("0xOld"));
        let mut client = LedgerClient::new(Arc::clone(&ledger), config());
        client.connect().await.unwrap();

        ledger.reject_account_requests(true);
        assert!(matches!(client.connect().await, Err(SdkError::UserRejected)));
        assert!(!client.is_connected());
        assert_eq!(client.actor(), None);

        let result = client.submit("createBatch", vec![json!("Maize")]).await;
        assert!(matches!(result, Err(SdkError::Connection(_))));
        assert_eq!(ledger.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_on_wrong_network_drops_session() {
        let ledger = Arc::new(MemoryLedger::new(CONTRACT).with_account("0xOld"));
        let mut client = LedgerClient::new(Arc::clone(&ledger), config());
        client.connect().await.unwrap();

        ledger.set_chain_id(1);
        assert!(matches!(
            client.connect().await,
            Err(SdkError::WrongNetwork { .. })
        ));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_submit_requires_session() {
        let ledger = MemoryLedger::new(CONTRACT).with_account("0xFarmer");
        let client = LedgerClient::new(ledger, config());

        let result = client.submit("createBatch", vec![json!("Maize")]).await;
        assert!(matches!(result, Err(SdkError::Connection(_))));
    }

    #[tokio::test]
    async fn test_submit_waits_for_receipt() {
        let ledger = Arc::new(MemoryLedger::new(CONTRACT).with_account("0xFarmer"));
        ledger.set_confirmation_delay(2);
        let mut client = LedgerClient::new(Arc::clone(&ledger), config());
        client.connect().await.unwrap();

        let receipt = client.submit("createBatch", vec![json!("Maize")]).await.unwrap();
        assert_eq!(receipt.status, TxStatus::Confirmed);
        assert_eq!(ledger.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_submit_times_out_without_resending() {
        let ledger = Arc::new(MemoryLedger::new(CONTRACT).with_account("0xFarmer"));
        ledger.set_confirmation_delay(u32::MAX);
        let mut client = LedgerClient::new(
            Arc::clone(&ledger),
            config().with_confirmation_timeout(Duration::from_secs(0)),
        );
        client.connect().await.unwrap();

        let result = client.submit("createBatch", vec![json!("Maize")]).await;
        assert!(matches!(result, Err(SdkError::ConfirmationTimeout { .. })));
        assert_eq!(ledger.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_reverted_submit_is_failed() {
        let ledger = MemoryLedger::new(CONTRACT).with_account("0xFarmer");
        let mut client = LedgerClient::new(ledger, config());
        client.connect().await.unwrap();

        let result = client
            .submit("recordEvent", vec![json!(99), json!(1), json!("")])
            .await;
        assert!(matches!(result, Err(SdkError::TransactionFailed(_))));
    }
}
