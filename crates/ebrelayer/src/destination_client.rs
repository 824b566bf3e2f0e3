use crate::types::{NetworkDescriptor, ProphecyId};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use serde::{de::DeserializeOwned, Deserialize, Serialize, Serializer};
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

const QUERY_ROUTE: &str = "sifchain/ethbridge/v1";

/// Message recording one validator's signature over a prophecy id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MsgSignProphecy {
    pub cosmos_sender: String,
    pub network_descriptor: NetworkDescriptor,
    #[serde(serialize_with = "as_base64")]
    pub prophecy_id: ProphecyId,
    pub ethereum_address: String,
    pub signature: String,
}

fn as_base64<S: Serializer>(id: &ProphecyId, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&general_purpose::STANDARD.encode(id.as_bytes()))
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DestinationChainRpc: Send + Sync {
    /// Nonce of the last event `validator` has attested for `network`.
    async fn witness_nonce(&self, network: NetworkDescriptor, validator: &str) -> Result<u64>;

    /// Source-chain height at which the event carrying `nonce` occurred, or
    /// `0` when no such event has been indexed yet.
    async fn global_nonce_block_number(&self, network: NetworkDescriptor, nonce: u64) -> Result<u64>;

    /// Broadcasts `msg` and returns the transaction hash. A refusal by the
    /// chain is reported as [`BroadcastRejected`].
    async fn submit_signed_prophecy(&self, msg: MsgSignProphecy) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct WitnessNonceResponse {
    witness_lock_burn_nonce: String,
}

#[derive(Debug, Deserialize)]
struct GlobalNonceBlockNumberResponse {
    block_number: String,
}

#[derive(Serialize)]
struct BroadcastRequest<'a> {
    msg: &'a MsgSignProphecy,
}

/// The destination chain processed the broadcast and refused it. Sending
/// the same message again will not change the outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transaction rejected with code {code}: {raw_log}")]
pub struct BroadcastRejected {
    pub code: u32,
    pub raw_log: String,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    #[serde(default)]
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    raw_log: String,
}

/// Client for the destination chain's REST gateway.
pub struct CosmosRestClient {
    client: reqwest::Client,
    base_url: String,
}

impl CosmosRestClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}/{}", self.base_url, QUERY_ROUTE, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context(format!("Failed to query {url}"))?
            .error_for_status()?;

        let text = response.text().await?;
        debug!(%url, response = %text, "Raw query response");
        serde_json::from_str(&text).context(format!("Malformed response from {url}"))
    }
}

fn parse_u64(field: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .context(format!("Invalid {field} {value:?}"))
}

fn check_broadcast(response: BroadcastResponse) -> Result<String> {
    if response.code != 0 {
        return Err(BroadcastRejected {
            code: response.code,
            raw_log: response.raw_log,
        }
        .into());
    }
    Ok(response.txhash)
}

#[async_trait]
impl DestinationChainRpc for CosmosRestClient {
    #[instrument(skip(self))]
    async fn witness_nonce(&self, network: NetworkDescriptor, validator: &str) -> Result<u64> {
        let response: WitnessNonceResponse = self
            .get(&format!("witness_lock_burn_nonce/{}/{}", network.0, validator))
            .await?;
        parse_u64("witness_lock_burn_nonce", &response.witness_lock_burn_nonce)
    }

    #[instrument(skip(self))]
    async fn global_nonce_block_number(&self, network: NetworkDescriptor, nonce: u64) -> Result<u64> {
        let response: GlobalNonceBlockNumberResponse = self
            .get(&format!("global_nonce_block_number/{}/{}", network.0, nonce))
            .await?;
        parse_u64("block_number", &response.block_number)
    }

    #[instrument(skip(self, msg), fields(prophecy_id = %msg.prophecy_id))]
    async fn submit_signed_prophecy(&self, msg: MsgSignProphecy) -> Result<String> {
        let url = format!("{}/{}/sign_prophecy", self.base_url, QUERY_ROUTE);
        let response = self
            .client
            .post(&url)
            .json(&BroadcastRequest { msg: &msg })
            .send()
            .await
            .context(format!("Failed to broadcast to {url}"))?
            .error_for_status()?;

        let text = response.text().await?;
        debug!(response = %text, "Raw broadcast response");
        let response: BroadcastResponse =
            serde_json::from_str(&text).context("Malformed broadcast response")?;
        check_broadcast(response)
    }
}
