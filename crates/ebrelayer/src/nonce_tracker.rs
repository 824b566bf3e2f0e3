use crate::{
    destination_client::DestinationChainRpc,
    source_client::SourceChainRpc,
    types::{NetworkDescriptor, RelayerError},
};
use anyhow::anyhow;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, instrument};

/// Inclusive range of source-chain heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    pub from: u64,
    pub to: u64,
}

impl ScanRange {
    pub fn block_count(&self) -> u64 {
        self.to.saturating_sub(self.from) + 1
    }
}

/// Works out which part of the source chain a validator still has to witness.
pub struct NonceTracker {
    source: Arc<dyn SourceChainRpc>,
    destination: Arc<dyn DestinationChainRpc>,
    rpc_timeout: Duration,
}

impl NonceTracker {
    pub fn new(
        source: Arc<dyn SourceChainRpc>,
        destination: Arc<dyn DestinationChainRpc>,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            source,
            destination,
            rpc_timeout,
        }
    }

    /// Returns the range to scan, or `None` when the validator is caught up.
    ///
    /// The scan starts at the height of the first event the validator has
    /// not witnessed (global nonce `witness_nonce + 1`) and ends at the
    /// current source head.
    #[instrument(skip(self))]
    pub async fn pending_range(
        &self,
        network: NetworkDescriptor,
        validator: &str,
    ) -> Result<Option<ScanRange>, RelayerError> {
        let witness_nonce = self
            .with_timeout("witness_nonce", self.destination.witness_nonce(network, validator))
            .await?;

        let next_nonce = witness_nonce.checked_add(1).ok_or_else(|| RelayerError::Rpc {
            call: "witness_nonce",
            source: anyhow!("witness nonce {witness_nonce} cannot be advanced"),
        })?;
        let from = self
            .with_timeout(
                "global_nonce_block_number",
                self.destination.global_nonce_block_number(network, next_nonce),
            )
            .await?;
        if from == 0 {
            debug!(witness_nonce, "no unwitnessed events");
            return Ok(None);
        }

        let to = self
            .with_timeout("latest_height", self.source.latest_height())
            .await?;
        if from > to {
            debug!(from, to, "next event is above the source head");
            return Ok(None);
        }

        debug!(witness_nonce, from, to, "unwitnessed events pending");
        Ok(Some(ScanRange { from, to }))
    }

    async fn with_timeout<T>(
        &self,
        call: &'static str,
        request: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, RelayerError> {
        tokio::time::timeout(self.rpc_timeout, request)
            .await
            .map_err(|_| RelayerError::Rpc {
                call,
                source: anyhow!("timed out after {:?}", self.rpc_timeout),
            })?
            .map_err(|source| RelayerError::Rpc { call, source })
    }
}
