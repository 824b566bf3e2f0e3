use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::{
    ChainSubscriber, ClaimBuilder, CosmosRestClient, DestinationChainRpc, ProphecySigner,
    RelayerConfig, SourceChainRpc, TendermintRpcClient,
};

pub struct RelayerApp {
    config: RelayerConfig,
    signer: Arc<ProphecySigner>,
    claim_builder: Arc<ClaimBuilder>,
    source: Arc<dyn SourceChainRpc>,
    destination: Arc<dyn DestinationChainRpc>,
}

impl RelayerApp {
    #[instrument(skip_all, fields(config.networks_count = config.networks.len()))]
    pub fn new(config: RelayerConfig, private_key: &str) -> Result<Self> {
        info!("Initializing relayer application");

        let source: Arc<dyn SourceChainRpc> =
            Arc::new(TendermintRpcClient::new(config.source.rpc_url.clone()));
        let destination: Arc<dyn DestinationChainRpc> =
            Arc::new(CosmosRestClient::new(config.destination.rest_url.clone()));

        Self::with_clients(config, private_key, source, destination)
    }

    pub fn with_clients(
        config: RelayerConfig,
        private_key: &str,
        source: Arc<dyn SourceChainRpc>,
        destination: Arc<dyn DestinationChainRpc>,
    ) -> Result<Self> {
        config.validate()?;
        let signer = Arc::new(
            ProphecySigner::from_private_key(private_key).context("Failed to load relayer key")?,
        );
        let claim_builder = Arc::new(
            config
                .claim_builder()
                .context("Failed to load symbol translator")?,
        );
        info!(signer = %signer.address(), "Loaded relayer key");

        Ok(Self {
            config,
            signer,
            claim_builder,
            source,
            destination,
        })
    }

    /// Start one subscriber per configured network and wait until all of
    /// them have stopped. Subscribers stop when `shutdown` is cancelled.
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!("Starting all chain subscribers");

        let mut subscribers = JoinSet::new();
        for &network in &self.config.networks {
            let subscriber = ChainSubscriber::new(
                self.config.subscriber_config(network),
                self.source.clone(),
                self.destination.clone(),
                self.signer.clone(),
                self.claim_builder.clone(),
            );
            subscribers.spawn(subscriber.start(shutdown.child_token()));
        }

        let mut failed = 0usize;
        while let Some(joined) = subscribers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Chain subscriber task failed");
                failed += 1;
                // one dead subscriber takes the rest down with it
                shutdown.cancel();
            }
        }

        if failed > 0 {
            anyhow::bail!("{failed} chain subscriber(s) exited abnormally");
        }
        info!("All chain subscribers stopped");
        Ok(())
    }
}
