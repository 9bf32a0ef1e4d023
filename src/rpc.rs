//! JSON-RPC client for the Ethereum-family endpoints the monitor tails.
//! Speaks the subset of the `eth_*` namespace the block detector needs:
//! `eth_blockNumber`, `eth_getBlockByNumber`, and `eth_getCode`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::RpcError;

/// A transaction as returned inside `eth_getBlockByNumber`'s `result.transactions`
/// when called with `full_transactions = true`. Only the fields the block
/// detector needs are modeled; unrecognized fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    /// `null` for a contract-creation transaction.
    pub to: Option<String>,
    #[serde(deserialize_with = "deserialize_hex_u64")]
    pub nonce: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    #[serde(deserialize_with = "deserialize_hex_u64")]
    pub number: u64,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(parse_hex_u64(&s))
}

/// The subset of Ethereum JSON-RPC this pipeline drives, behind a trait so
/// tests can substitute a fixture client instead of a live network endpoint.
#[async_trait]
pub trait BlockchainClient: Send + Sync {
    async fn block_number(&self) -> Result<u64, RpcError>;
    async fn block_by_number(&self, number: u64) -> Result<Option<Block>, RpcError>;
    async fn code_at(&self, address: &str) -> Result<Vec<u8>, RpcError>;
}

/// An `eth_*` JSON-RPC client over a single HTTP endpoint (an Infura project
/// URL, or any compatible node).
pub struct JsonRpcClient {
    http: reqwest::Client,
    endpoint: url::Url,
}

impl JsonRpcClient {
    pub fn new(http: reqwest::Client, endpoint: url::Url) -> Self {
        Self { http, endpoint }
    }

    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn call(&self, method: &'static str, params: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|source| RpcError::Transport { method, source })?;

        let payload: Value = response
            .json()
            .await
            .map_err(|source| RpcError::Transport { method, source })?;

        if let Some(error) = payload.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown rpc error")
                .to_string();
            return Err(RpcError::Remote { method, message });
        }

        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl BlockchainClient for JsonRpcClient {
    #[tracing::instrument(skip(self))]
    async fn block_number(&self) -> Result<u64, RpcError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let hex = result.as_str().unwrap_or("0x0");
        Ok(parse_hex_u64(hex))
    }

    #[tracing::instrument(skip(self))]
    async fn block_by_number(&self, number: u64) -> Result<Option<Block>, RpcError> {
        let params = json!([format!("0x{:x}", number), true]);
        let result = self.call("eth_getBlockByNumber", params).await?;
        if result.is_null() {
            return Ok(None);
        }
        let block: Block = serde_json::from_value(result)
            .map_err(|source| RpcError::Malformed { method: "eth_getBlockByNumber", source })?;
        Ok(Some(block))
    }

    #[tracing::instrument(skip(self))]
    async fn code_at(&self, address: &str) -> Result<Vec<u8>, RpcError> {
        let params = json!([address, "latest"]);
        let result = self.call("eth_getCode", params).await?;
        let hex = result.as_str().unwrap_or("0x");
        Ok(hex::decode(hex.strip_prefix("0x").unwrap_or(hex)).unwrap_or_default())
    }
}

fn parse_hex_u64(s: &str) -> u64 {
    u64::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16).unwrap_or(0)
}
