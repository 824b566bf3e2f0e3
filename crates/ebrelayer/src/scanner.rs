use crate::{
    event::{AttributeEncoding, ChainEvent},
    nonce_tracker::ScanRange,
    source_client::{SourceChainRpc, TxEvents},
    types::RelayerError,
};
use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Receives every classified event of a scanned range, in chain order.
#[async_trait]
pub trait EventHandler: Send {
    async fn handle_event(&mut self, height: u64, event: ChainEvent);
}

#[derive(Debug, Clone, Copy)]
pub struct ScannerConfig {
    pub attribute_encoding: AttributeEncoding,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Consecutive failures of one height before the scan gives up for this tick
    pub max_height_retries: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub blocks_scanned: u64,
    pub events_handled: u64,
    pub events_dropped: u64,
    /// Set when shutdown was requested while waiting to retry a height
    pub interrupted: bool,
}

pub struct BlockRangeScanner {
    source: Arc<dyn SourceChainRpc>,
    config: ScannerConfig,
}

impl BlockRangeScanner {
    pub fn new(source: Arc<dyn SourceChainRpc>, config: ScannerConfig) -> Self {
        Self { source, config }
    }

    /// Walks `range` in ascending order and hands every decodable event to
    /// `handler`.
    ///
    /// A height is only left behind once its block results were fetched. A
    /// failing height is retried with backoff; after `max_height_retries`
    /// consecutive failures the scan stops with
    /// [`RelayerError::HeightStalled`] so that the next tick can retry it.
    ///
    /// A scan that has started runs to the end of the range. `shutdown` only
    /// cuts short the wait before retrying a failing height.
    #[instrument(skip(self, shutdown, handler), fields(from = range.from, to = range.to))]
    pub async fn scan(
        &self,
        range: ScanRange,
        shutdown: &CancellationToken,
        handler: &mut dyn EventHandler,
    ) -> Result<ScanSummary, RelayerError> {
        let mut summary = ScanSummary::default();
        let mut delays = self.retry_delays();
        let mut failures = 0u32;
        let mut height = range.from;

        while height <= range.to {
            let txs = match self.source.block_results(height).await {
                Ok(txs) => txs,
                Err(e) => {
                    failures += 1;
                    if failures >= self.config.max_height_retries {
                        error!(height, attempts = failures, error = %e, "Block keeps failing, relay is stalled at this height");
                        return Err(RelayerError::HeightStalled {
                            height,
                            attempts: failures,
                            source: e,
                        });
                    }

                    let delay = delays.next().unwrap_or(self.config.max_retry_delay);
                    warn!(height, attempts = failures, ?delay, error = %e, "Failed to fetch block results, retrying same height");
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => {
                            summary.interrupted = true;
                            return Ok(summary);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
            };
            if failures > 0 {
                failures = 0;
                delays = self.retry_delays();
            }

            self.process_block(height, txs, handler, &mut summary).await;
            summary.blocks_scanned += 1;

            if height == range.to {
                break;
            }
            height += 1;
        }

        info!(
            blocks = summary.blocks_scanned,
            handled = summary.events_handled,
            dropped = summary.events_dropped,
            "Scan finished"
        );
        Ok(summary)
    }

    fn retry_delays(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.config.retry_delay)
            .with_max_delay(self.config.max_retry_delay)
            .without_max_times()
            .build()
    }

    async fn process_block(
        &self,
        height: u64,
        txs: Vec<TxEvents>,
        handler: &mut dyn EventHandler,
        summary: &mut ScanSummary,
    ) {
        for (tx_index, events) in txs.into_iter().enumerate() {
            for raw in events {
                match ChainEvent::decode(raw, self.config.attribute_encoding) {
                    Ok(ChainEvent::Unsupported(event_type)) => {
                        debug!(height, tx_index, %event_type, "Ignoring unsupported event");
                    }
                    Ok(event) => {
                        handler.handle_event(height, event).await;
                        summary.events_handled += 1;
                    }
                    Err(e) => {
                        warn!(height, tx_index, error = %e, "Dropping malformed event");
                        summary.events_dropped += 1;
                    }
                }
            }
        }
    }
}
