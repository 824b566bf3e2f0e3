use crate::event::{EventAttribute, RawEvent};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

/// Events of one transaction, in emission order.
pub type TxEvents = Vec<RawEvent>;

// We use a trait so we can inject a mock in the tests
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SourceChainRpc: Send + Sync {
    /// Liveness check used when opening a subscription session.
    async fn health(&self) -> Result<()>;

    async fn latest_height(&self) -> Result<u64>;

    /// Transaction results of the block at `height`, in transaction order.
    async fn block_results(&self, height: u64) -> Result<Vec<TxEvents>>;

    fn endpoint(&self) -> String;
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: i64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    latest_block_height: String,
}

#[derive(Debug, Deserialize)]
struct BlockResults {
    #[serde(default)]
    txs_results: Option<Vec<TxResult>>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    events: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    attributes: Vec<WireAttribute>,
}

#[derive(Debug, Deserialize)]
struct WireAttribute {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

/// Tendermint JSON-RPC over HTTP.
pub struct TendermintRpcClient {
    client: reqwest::Client,
    endpoint: String,
}

impl TendermintRpcClient {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .context(format!("Failed to send {method} request"))?;

        let text = response.text().await?;
        debug!(method, response_len = text.len(), "Raw rpc response");
        parse_response(method, &text)
    }
}

fn parse_response<T: DeserializeOwned>(method: &str, text: &str) -> Result<T> {
    let response: JsonRpcResponse<T> =
        serde_json::from_str(text).context(format!("Malformed {method} response"))?;

    match (response.result, response.error) {
        (_, Some(error)) => Err(anyhow!(
            "{method} returned error {}: {}{}",
            error.code,
            error.message,
            error.data.map(|d| format!(" ({d})")).unwrap_or_default()
        )),
        (Some(result), None) => Ok(result),
        (None, None) => Err(anyhow!("{method} returned neither result nor error")),
    }
}

fn into_tx_events(results: BlockResults) -> Vec<TxEvents> {
    results
        .txs_results
        .unwrap_or_default()
        .into_iter()
        // failed transactions still report events, but none of them took effect
        .filter(|tx| tx.code == 0)
        .map(|tx| {
            tx.events
                .into_iter()
                .map(|event| RawEvent {
                    event_type: event.event_type,
                    attributes: event
                        .attributes
                        .into_iter()
                        .map(|attribute| EventAttribute {
                            key: attribute.key.unwrap_or_default(),
                            value: attribute.value.unwrap_or_default(),
                        })
                        .collect(),
                })
                .collect()
        })
        .collect()
}

#[async_trait]
impl SourceChainRpc for TendermintRpcClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn health(&self) -> Result<()> {
        let _: Value = self.call("health", json!({})).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn latest_height(&self) -> Result<u64> {
        let status: StatusResult = self.call("status", json!({})).await?;
        status
            .sync_info
            .latest_block_height
            .parse()
            .context("Invalid latest_block_height")
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn block_results(&self, height: u64) -> Result<Vec<TxEvents>> {
        let results: BlockResults = self
            .call("block_results", json!({ "height": height.to_string() }))
            .await?;
        Ok(into_tx_events(results))
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}
