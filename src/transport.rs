use crate::error::{Result, SdkError};
use crate::types::{parse_uint, TxReceipt};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Wallet rejected the request (EIP-1193 code)
pub const USER_REJECTED_CODE: i64 = 4001;

/// No authorized account (EIP-1193 code)
pub const UNAUTHORIZED_CODE: i64 = 4100;

/// Raw ledger access: signer discovery, network context, reads, writes and receipts.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Chain the provider is currently connected to
    async fn chain_id(&self) -> Result<u64>;

    /// Ask the wallet for signing accounts
    async fn request_accounts(&self) -> Result<Vec<String>>;

    /// Read-only contract call
    async fn call(&self, contract: &str, method: &str, args: Vec<Value>) -> Result<Value>;

    /// Broadcast a state-changing call, returning the transaction hash
    async fn send_transaction(
        &self,
        from: &str,
        contract: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<String>;

    /// Receipt of a mined transaction, `None` while still pending
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>>;
}

#[async_trait]
impl<T: LedgerTransport + ?Sized> LedgerTransport for Arc<T> {
    async fn chain_id(&self) -> Result<u64> {
        (**self).chain_id().await
    }

    async fn request_accounts(&self) -> Result<Vec<String>> {
        (**self).request_accounts().await
    }

    async fn call(&self, contract: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        (**self).call(contract, method, args).await
    }

    async fn send_transaction(
        &self,
        from: &str,
        contract: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<String> {
        (**self).send_transaction(from, contract, method, args).await
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        (**self).transaction_receipt(tx_hash).await
    }
}

/// JSON-RPC 2.0 transport over HTTP
pub struct HttpTransport {
    /// Gateway URL
    pub base_url: String,
    /// HTTP client
    pub client: Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self::with_client(rpc_url, Client::new())
    }

    /// Create a transport with a custom reqwest client
    pub fn with_client(rpc_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: rpc_url.into().trim_end_matches('/').to_string(),
            client,
            next_id: AtomicU64::new(1),
        }
    }

    async fn rpc<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        tracing::debug!(method, id = request.id, "ledger rpc");

        let response = self.client.post(&self.base_url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SdkError::Rpc {
                code: i64::from(status.as_u16()),
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let envelope: RpcResponse = response.json().await?;
        envelope.into_result()
    }
}

#[async_trait]
impl LedgerTransport for HttpTransport {
    async fn chain_id(&self) -> Result<u64> {
        let value: Value = self.rpc("ledger_chainId", json!([])).await?;
        parse_uint(&value)
            .ok_or_else(|| SdkError::MalformedResponse(format!("chain id: {}", value)))
    }

    async fn request_accounts(&self) -> Result<Vec<String>> {
        self.rpc("ledger_requestAccounts", json!([])).await
    }

    async fn call(&self, contract: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        self.rpc(
            "ledger_call",
            json!([{ "to": contract, "method": method, "args": args }]),
        )
        .await
    }

    async fn send_transaction(
        &self,
        from: &str,
        contract: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<String> {
        self.rpc(
            "ledger_sendTransaction",
            json!([{ "from": from, "to": contract, "method": method, "args": args }]),
        )
        .await
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        self.rpc("ledger_getTransactionReceipt", json!([tx_hash]))
            .await
    }
}

// Wire types
#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl RpcResponse {
    fn into_result<R: DeserializeOwned>(self) -> Result<R> {
        if let Some(error) = self.error {
            return Err(map_rpc_error(error.code, error.message));
        }
        Ok(serde_json::from_value(self.result.unwrap_or(Value::Null))?)
    }
}

fn map_rpc_error(code: i64, message: String) -> SdkError {
    match code {
        USER_REJECTED_CODE => SdkError::UserRejected,
        UNAUTHORIZED_CODE => SdkError::Connection(message),
        _ => SdkError::Rpc { code, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(raw: &str) -> RpcResponse {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_transport_creation() {
        let transport = HttpTransport::new("http://localhost:8545/");
        assert_eq!(transport.base_url, "http://localhost:8545");
    }

    #[test]
    fn test_request_shape() {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 7,
            method: "ledger_call",
            params: json!([{ "to": "0xc", "method": "nextBatchId", "args": [] }]),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["params"][0]["method"], "nextBatchId");
    }

    #[test]
    fn test_error_mapping() {
        let rejected: Result<Value> =
            response(r#"{"jsonrpc":"2.0","id":1,"error":{"code":4001,"message":"User rejected the request."}}"#)
                .into_result();
        assert!(matches!(rejected, Err(SdkError::UserRejected)));

        let unauthorized: Result<Value> =
            response(r#"{"jsonrpc":"2.0","id":1,"error":{"code":4100,"message":"no account"}}"#)
                .into_result();
        assert!(matches!(unauthorized, Err(SdkError::Connection(_))));

        let revert: Result<Value> =
            response(r#"{"jsonrpc":"2.0","id":1,"error":{"code":3,"message":"execution reverted: Batch does not exist"}}"#)
                .into_result();
        match revert {
            Err(SdkError::Rpc { code, message }) => {
                assert_eq!(code, 3);
                assert!(message.contains("does not exist"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pending_receipt_is_none() {
        let receipt: Option<TxReceipt> =
            response(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).into_result().unwrap();
        assert!(receipt.is_none());

        let receipt: Option<TxReceipt> = response(
            r#"{"jsonrpc":"2.0","id":2,"result":{"txHash":"0xaa","blockNumber":12,"status":"confirmed","logs":[
                {"address":"0xc","name":"BatchCreated","args":{"batchId":"0x5","creator":"0xabc","productType":"Maize"}}
            ]}}"#,
        )
        .into_result()
        .unwrap();
        let receipt = receipt.unwrap();
        assert_eq!(receipt.block_number, Some(12));
        assert_eq!(receipt.ledger_logs("0xC")[0].batch_id(), 5);
    }
}
