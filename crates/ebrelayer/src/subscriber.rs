//! Per-network subscription loop.
//!
//! A [`ChainSubscriber`] owns its connection to the source chain. It
//! reconnects with backoff until a session is open, then runs the catch-up
//! sequence once per tick until shutdown is requested.

use crate::{
    claim::{burn_lock_event_to_message, ClaimBuilder},
    destination_client::DestinationChainRpc,
    event::{ChainEvent, EventAttribute},
    nonce_tracker::NonceTracker,
    scanner::{BlockRangeScanner, EventHandler, ScanSummary, ScannerConfig},
    signer::ProphecySigner,
    source_client::SourceChainRpc,
    submitter::{SubmissionLimits, Submitter},
    types::{Attestation, NetworkDescriptor, RelayMessage, RelayerError},
};
use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use std::{sync::Arc, time::Duration};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Disconnected,
    Connecting,
    Subscribed,
    CatchingUp,
    Idle,
    ShuttingDown,
}

// Everything one subscriber needs, passed in at construction
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub network: NetworkDescriptor,
    pub validator_name: String,
    pub validator_address: String,
    pub tick_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub rpc_timeout: Duration,
    pub submission: SubmissionLimits,
    pub scanner: ScannerConfig,
}

/// A live connection to the source chain. The token is cancelled when the
/// session is released.
#[derive(Debug)]
pub struct SubscriptionSession {
    endpoint: String,
    opened_at: Instant,
    shutdown: CancellationToken,
}

impl SubscriptionSession {
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    fn release(self) {
        self.shutdown.cancel();
        debug!(endpoint = %self.endpoint, uptime = ?self.opened_at.elapsed(), "Session released");
    }
}

enum SessionEnd {
    Shutdown,
    ConnectionLost,
}

/// Turns lock/burn events into signed attestations and hands them to the
/// submitter. Completed prophecies are settled without signing.
pub struct WitnessPipeline {
    network: NetworkDescriptor,
    validator_address: String,
    signer: Arc<ProphecySigner>,
    claim_builder: Arc<ClaimBuilder>,
    submitter: Submitter,
}

impl WitnessPipeline {
    pub fn new(
        network: NetworkDescriptor,
        validator_address: String,
        signer: Arc<ProphecySigner>,
        claim_builder: Arc<ClaimBuilder>,
        submitter: Submitter,
    ) -> Self {
        Self {
            network,
            validator_address,
            signer,
            claim_builder,
            submitter,
        }
    }

    #[instrument(skip(self, message), fields(prophecy_id = %message.prophecy_id))]
    async fn witness_sign_prophecy_id(&mut self, message: RelayMessage) -> Result<(), RelayerError> {
        let signature = self.signer.sign(&message.prophecy_id)?;
        let attestation = Attestation {
            validator_address: self.validator_address.clone(),
            network_descriptor: message.network_descriptor,
            prophecy_id: message.prophecy_id,
            signer_address: self.signer.address(),
            signature,
        };
        self.submitter.submit(attestation).await?;
        Ok(())
    }

    fn prophecy_completed(&mut self, height: u64, attributes: &[EventAttribute]) {
        let claim = match self.claim_builder.sign_prophecy_claim(attributes) {
            Ok(claim) => claim,
            Err(e) => {
                warn!(height, error = %e, "Failed to parse prophecy completed event");
                return;
            }
        };
        if claim.network_descriptor != self.network {
            return;
        }

        let was_pending = self.submitter.mark_completed(&claim.prophecy_id);
        info!(height, prophecy_id = %claim.prophecy_id, was_pending, "Prophecy completed");
    }
}

#[async_trait]
impl EventHandler for WitnessPipeline {
    async fn handle_event(&mut self, height: u64, event: ChainEvent) {
        if let ChainEvent::ProphecyCompleted(attributes) = &event {
            self.prophecy_completed(height, attributes);
            return;
        }
        let Some(attributes) = event.lock_burn_attributes() else {
            debug!(height, kind = ?event.kind(), "Not a lock or burn event");
            return;
        };

        let message = match burn_lock_event_to_message(attributes) {
            Ok(message) => message,
            Err(e) => {
                warn!(height, error = %e, "Failed to get burn lock message from event");
                return;
            }
        };
        info!(height, kind = ?event.kind(), prophecy_id = %message.prophecy_id, network = %message.network_descriptor, "Received message from source chain");

        if message.network_descriptor != self.network {
            debug!(network = %message.network_descriptor, "Message is for another network");
            return;
        }
        if self.submitter.is_known(&message.prophecy_id) {
            debug!(prophecy_id = %message.prophecy_id, "Prophecy already witnessed");
            return;
        }

        // a failed submission is queued by the submitter, so only log here
        if let Err(e) = self.witness_sign_prophecy_id(message).await {
            error!(height, error = %e, "Failed to witness prophecy");
        }
    }
}

pub struct ChainSubscriber {
    config: SubscriberConfig,
    source: Arc<dyn SourceChainRpc>,
    nonce_tracker: NonceTracker,
    scanner: BlockRangeScanner,
    pipeline: WitnessPipeline,
    state: SubscriberState,
}

impl ChainSubscriber {
    pub fn new(
        config: SubscriberConfig,
        source: Arc<dyn SourceChainRpc>,
        destination: Arc<dyn DestinationChainRpc>,
        signer: Arc<ProphecySigner>,
        claim_builder: Arc<ClaimBuilder>,
    ) -> Self {
        let nonce_tracker = NonceTracker::new(source.clone(), destination.clone(), config.rpc_timeout);
        let scanner = BlockRangeScanner::new(source.clone(), config.scanner);
        let pipeline = WitnessPipeline::new(
            config.network,
            config.validator_address.clone(),
            signer,
            claim_builder,
            Submitter::new(destination, config.submission),
        );

        Self {
            config,
            source,
            nonce_tracker,
            scanner,
            pipeline,
            state: SubscriberState::Disconnected,
        }
    }

    pub fn state(&self) -> SubscriberState {
        self.state
    }

    fn transition(&mut self, next: SubscriberState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Subscriber state change");
            self.state = next;
        }
    }

    /// Runs until `shutdown` is cancelled.
    #[instrument(skip_all, name = "chain_subscriber", fields(network = %self.config.network, validator = %self.config.validator_name))]
    pub async fn start(mut self, shutdown: CancellationToken) {
        info!("Starting chain subscriber");

        loop {
            let Some(session) = self.connect(&shutdown).await else {
                break;
            };

            let end = self.run_session(&session, &shutdown).await;
            session.release();
            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::ConnectionLost => {
                    warn!("Lost connection to source chain, reconnecting");
                    self.transition(SubscriberState::Disconnected);
                }
            }
        }

        self.transition(SubscriberState::ShuttingDown);
        info!("Chain subscriber stopped");
    }

    /// Retries until a session is open. Returns `None` on shutdown.
    async fn connect(&mut self, shutdown: &CancellationToken) -> Option<SubscriptionSession> {
        let mut delays = ExponentialBuilder::default()
            .with_min_delay(self.config.reconnect_delay)
            .with_max_delay(self.config.max_reconnect_delay)
            .without_max_times()
            .build();
        let mut attempt = 0u32;

        loop {
            if shutdown.is_cancelled() {
                return None;
            }
            self.transition(SubscriberState::Connecting);

            match self.open_session(shutdown).await {
                Ok(session) => {
                    self.transition(SubscriberState::Subscribed);
                    info!(endpoint = %session.endpoint, "Subscribed to source chain");
                    return Some(session);
                }
                Err(e) => {
                    self.transition(SubscriberState::Disconnected);
                    attempt += 1;
                    let delay = delays.next().unwrap_or(self.config.max_reconnect_delay);
                    error!(error = %e, attempt, ?delay, "Failed to start source chain client");
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return None,
                        _ = time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn open_session(&self, shutdown: &CancellationToken) -> Result<SubscriptionSession, RelayerError> {
        let endpoint = self.source.endpoint();
        match time::timeout(self.config.rpc_timeout, self.source.health()).await {
            Ok(Ok(())) => Ok(SubscriptionSession {
                endpoint,
                opened_at: Instant::now(),
                shutdown: shutdown.child_token(),
            }),
            Ok(Err(source)) => Err(RelayerError::Connection { endpoint, source }),
            Err(_) => Err(RelayerError::Connection {
                endpoint,
                source: anyhow::anyhow!("health check timed out after {:?}", self.config.rpc_timeout),
            }),
        }
    }

    async fn run_session(&mut self, session: &SubscriptionSession, shutdown: &CancellationToken) -> SessionEnd {
        let mut ticker = time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Received the quit signal");
                    return SessionEnd::Shutdown;
                }
                _ = ticker.tick() => {}
            }

            // a started scan runs to the end of its range; shutdown is observed here
            match self.check_nonce_and_process(session.shutdown_token()).await {
                Ok(_) => {}
                Err(e) if e.is_infrastructure() => {
                    warn!(error = %e, "Catch-up failed, retrying next tick");
                    if !self.check_health().await {
                        return SessionEnd::ConnectionLost;
                    }
                }
                Err(e) => error!(error = %e, "Catch-up failed"),
            }
        }
    }

    async fn check_health(&self) -> bool {
        matches!(
            time::timeout(self.config.rpc_timeout, self.source.health()).await,
            Ok(Ok(()))
        )
    }

    /// One tick: deliver queued attestations, then scan from the first
    /// unwitnessed event up to the head.
    #[instrument(skip_all)]
    pub async fn check_nonce_and_process(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Result<Option<ScanSummary>, RelayerError> {
        self.pipeline.submitter.retry_pending().await;

        let range = self
            .nonce_tracker
            .pending_range(self.config.network, &self.config.validator_address)
            .await?;

        let Some(range) = range else {
            self.transition(SubscriberState::Idle);
            return Ok(None);
        };

        self.transition(SubscriberState::CatchingUp);
        info!(from = range.from, to = range.to, "Catching up on unwitnessed events");
        let result = self.scanner.scan(range, shutdown, &mut self.pipeline).await;
        self.transition(SubscriberState::Idle);
        result.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        destination_client::{MockDestinationChainRpc, MsgSignProphecy},
        event::{AttributeEncoding, RawEvent},
        symbol_translator::SymbolTranslator,
        signer::prefixed_digest,
        source_client::{MockSourceChainRpc, TxEvents},
        types::ProphecyId,
    };
    use anyhow::anyhow;
    use ethers::core::types::Signature;
    use mockall::{predicate::eq, Sequence};
    use std::sync::Mutex;

    const VALIDATOR: &str = "sifvaloper1validator";
    const PRIVATE_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn config() -> SubscriberConfig {
        SubscriberConfig {
            network: NetworkDescriptor::ETHEREUM,
            validator_name: "validator".to_string(),
            validator_address: VALIDATOR.to_string(),
            tick_interval: Duration::from_secs(1),
            reconnect_delay: Duration::from_millis(100),
            max_reconnect_delay: Duration::from_secs(1),
            rpc_timeout: Duration::from_secs(1),
            submission: SubmissionLimits::default(),
            scanner: ScannerConfig {
                attribute_encoding: AttributeEncoding::Plain,
                retry_delay: Duration::from_millis(10),
                max_retry_delay: Duration::from_millis(100),
                max_height_retries: 3,
            },
        }
    }

    fn signer() -> Arc<ProphecySigner> {
        Arc::new(ProphecySigner::from_private_key(PRIVATE_KEY).unwrap())
    }

    fn new_subscriber(source: MockSourceChainRpc, destination: MockDestinationChainRpc) -> ChainSubscriber {
        ChainSubscriber::new(
            config(),
            Arc::new(source),
            Arc::new(destination),
            signer(),
            Arc::new(ClaimBuilder::new("sif", "eth", Arc::new(SymbolTranslator::default()))),
        )
    }

    fn lock(prophecy_id: &str, network: &str) -> TxEvents {
        vec![RawEvent {
            event_type: "lock".to_string(),
            attributes: vec![
                EventAttribute::new("prophecy_id", prophecy_id),
                EventAttribute::new("network_descriptor", network),
            ],
        }]
    }

    fn destination_behind_at(height: u64) -> MockDestinationChainRpc {
        let mut destination = MockDestinationChainRpc::new();
        destination.expect_witness_nonce().returning(|_, _| Ok(0));
        destination
            .expect_global_nonce_block_number()
            .returning(move |_, _| Ok(height));
        destination
    }

    #[tokio::test]
    async fn lock_event_is_signed_and_submitted_once() {
        let mut source = MockSourceChainRpc::new();
        source.expect_latest_height().returning(|| Ok(100));
        source
            .expect_block_results()
            .with(eq(100))
            .times(1)
            .returning(|_| Ok(vec![lock("abc123", "1")]));

        let submitted = Arc::new(Mutex::new(Vec::<MsgSignProphecy>::new()));
        let mut destination = destination_behind_at(100);
        let captured = submitted.clone();
        destination
            .expect_submit_signed_prophecy()
            .times(1)
            .returning(move |msg| {
                captured.lock().unwrap().push(msg);
                Ok("TXHASH".to_string())
            });

        let signer = signer();
        let mut subscriber = ChainSubscriber::new(
            config(),
            Arc::new(source),
            Arc::new(destination),
            signer.clone(),
            Arc::new(ClaimBuilder::new("sif", "eth", Arc::new(SymbolTranslator::default()))),
        );
        let summary = subscriber
            .check_nonce_and_process(&CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.events_handled, 1);
        assert_eq!(subscriber.state(), SubscriberState::Idle);

        let submitted = submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        let msg = &submitted[0];
        assert_eq!(msg.cosmos_sender, VALIDATOR);
        assert_eq!(msg.network_descriptor, NetworkDescriptor::ETHEREUM);
        assert_eq!(msg.prophecy_id, ProphecyId::from("abc123"));

        let bytes = hex::decode(msg.signature.trim_start_matches("0x")).unwrap();
        assert!(!bytes.is_empty());
        let recovered = Signature::try_from(bytes.as_slice())
            .unwrap()
            .recover(prefixed_digest(&ProphecyId::from("abc123")))
            .unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[tokio::test]
    async fn rescanning_the_same_range_does_not_resubmit() {
        let mut source = MockSourceChainRpc::new();
        source.expect_latest_height().returning(|| Ok(100));
        source
            .expect_block_results()
            .times(2)
            .returning(|_| Ok(vec![lock("abc123", "1")]));

        let mut destination = destination_behind_at(100);
        destination
            .expect_submit_signed_prophecy()
            .times(1)
            .returning(|_| Ok("TXHASH".to_string()));

        let mut subscriber = new_subscriber(source, destination);
        let shutdown = CancellationToken::new();
        subscriber.check_nonce_and_process(&shutdown).await.unwrap();
        subscriber.check_nonce_and_process(&shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn events_for_other_networks_and_kinds_are_ignored() {
        let mut source = MockSourceChainRpc::new();
        source.expect_latest_height().returning(|| Ok(10));
        source.expect_block_results().returning(|_| {
            Ok(vec![
                lock("other-network", "2"),
                lock("invalid-network", "12345"),
                vec![RawEvent {
                    event_type: "prophecy_completed".to_string(),
                    attributes: vec![EventAttribute::new("prophecy_id", "done")],
                }],
                vec![RawEvent {
                    event_type: "lock".to_string(),
                    attributes: vec![EventAttribute::new("prophecy_id", "incomplete")],
                }],
            ])
        });

        let mut destination = destination_behind_at(10);
        destination.expect_submit_signed_prophecy().never();

        let mut subscriber = new_subscriber(source, destination);
        subscriber
            .check_nonce_and_process(&CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_submission_is_delivered_on_the_next_tick() {
        let mut source = MockSourceChainRpc::new();
        let mut destination = MockDestinationChainRpc::new();
        let mut seq = Sequence::new();

        // first tick: one lock at height 7, submission fails
        destination
            .expect_witness_nonce()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(0));
        destination
            .expect_global_nonce_block_number()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(7));
        source
            .expect_latest_height()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(7));
        source
            .expect_block_results()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![lock("abc123", "1")]));
        destination
            .expect_submit_signed_prophecy()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow!("destination unreachable")));

        // second tick: the queued attestation goes out before the nonce query
        destination
            .expect_submit_signed_prophecy()
            .withf(|msg| msg.prophecy_id == ProphecyId::from("abc123"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("TXHASH".to_string()));
        destination
            .expect_witness_nonce()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(1));
        destination
            .expect_global_nonce_block_number()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(0));

        let mut subscriber = new_subscriber(source, destination);
        let shutdown = CancellationToken::new();
        subscriber.check_nonce_and_process(&shutdown).await.unwrap();
        assert_eq!(subscriber.check_nonce_and_process(&shutdown).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn block_fetch_error_retries_same_height_on_next_tick() {
        let processed = Arc::new(Mutex::new(Vec::<ProphecyId>::new()));

        let mut source = MockSourceChainRpc::new();
        source.expect_latest_height().returning(|| Ok(6));
        let mut seq = Sequence::new();
        source
            .expect_block_results()
            .with(eq(5))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![lock("h5", "1")]));
        source
            .expect_block_results()
            .with(eq(6))
            .times(3)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow!("timeout")));
        // next tick restarts from the nonce index and comes back to 6, never 7
        source
            .expect_block_results()
            .with(eq(5))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![lock("h5", "1")]));
        source
            .expect_block_results()
            .with(eq(6))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![lock("h6", "1")]));

        let mut destination = destination_behind_at(5);
        let captured = processed.clone();
        destination
            .expect_submit_signed_prophecy()
            .times(2)
            .returning(move |msg| {
                captured.lock().unwrap().push(msg.prophecy_id);
                Ok("TXHASH".to_string())
            });

        let mut subscriber = new_subscriber(source, destination);
        let shutdown = CancellationToken::new();

        let first = subscriber.check_nonce_and_process(&shutdown).await;
        assert!(matches!(
            first,
            Err(RelayerError::HeightStalled { height: 6, .. })
        ));
        assert_eq!(*processed.lock().unwrap(), vec![ProphecyId::from("h5")]);

        let second = subscriber.check_nonce_and_process(&shutdown).await.unwrap().unwrap();
        assert_eq!(second.blocks_scanned, 2);
        assert_eq!(
            *processed.lock().unwrap(),
            vec![ProphecyId::from("h5"), ProphecyId::from("h6")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_until_the_source_is_healthy_then_shuts_down() {
        let shutdown = CancellationToken::new();

        let mut source = MockSourceChainRpc::new();
        source.expect_endpoint().returning(|| "http://localhost:26657".to_string());
        let mut seq = Sequence::new();
        source
            .expect_health()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|| Err(anyhow!("connection refused")));
        source
            .expect_health()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let mut destination = MockDestinationChainRpc::new();
        let token = shutdown.clone();
        destination.expect_witness_nonce().times(1).returning(move |_, _| {
            // stop after the first tick
            token.cancel();
            Ok(0)
        });
        destination
            .expect_global_nonce_block_number()
            .times(1)
            .returning(|_, _| Ok(0));

        let subscriber = new_subscriber(source, destination);
        tokio::time::timeout(Duration::from_secs(60), subscriber.start(shutdown))
            .await
            .expect("subscriber should stop after shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_reconnect_backoff() {
        let shutdown = CancellationToken::new();

        let mut source = MockSourceChainRpc::new();
        source.expect_endpoint().returning(|| "http://localhost:26657".to_string());
        let token = shutdown.clone();
        source.expect_health().returning(move || {
            token.cancel();
            Err(anyhow!("connection refused"))
        });

        let destination = MockDestinationChainRpc::new();
        let subscriber = new_subscriber(source, destination);
        tokio::time::timeout(Duration::from_secs(60), subscriber.start(shutdown))
            .await
            .expect("subscriber should stop while waiting to reconnect");
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_source_during_a_tick_triggers_reconnect() {
        let shutdown = CancellationToken::new();

        let mut source = MockSourceChainRpc::new();
        source.expect_endpoint().returning(|| "http://localhost:26657".to_string());
        let mut seq = Sequence::new();
        // connect
        source.expect_health().times(1).in_sequence(&mut seq).returning(|| Ok(()));
        // health check after the failed tick
        source
            .expect_health()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(anyhow!("connection refused")));
        // reconnect
        let token = shutdown.clone();
        source.expect_health().times(1).in_sequence(&mut seq).returning(move || {
            token.cancel();
            Ok(())
        });

        let mut destination = MockDestinationChainRpc::new();
        destination
            .expect_witness_nonce()
            .times(1)
            .returning(|_, _| Err(anyhow!("connection refused")));

        let subscriber = new_subscriber(source, destination);
        tokio::time::timeout(Duration::from_secs(60), subscriber.start(shutdown))
            .await
            .expect("subscriber should stop after reconnecting");
    }

    #[tokio::test]
    async fn completed_prophecy_is_not_signed() {
        let mut source = MockSourceChainRpc::new();
        source.expect_latest_height().returning(|| Ok(10));
        source.expect_block_results().returning(|_| {
            Ok(vec![
                vec![RawEvent {
                    event_type: "prophecy_completed".to_string(),
                    attributes: vec![
                        EventAttribute::new("prophecy_id", "abc123"),
                        EventAttribute::new("network_descriptor", "1"),
                    ],
                }],
                lock("abc123", "1"),
            ])
        });

        let mut destination = destination_behind_at(10);
        destination.expect_submit_signed_prophecy().never();

        let mut subscriber = new_subscriber(source, destination);
        let summary = subscriber
            .check_nonce_and_process(&CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.events_handled, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_lets_the_running_scan_finish() {
        let shutdown = CancellationToken::new();
        let fetched = Arc::new(Mutex::new(Vec::<u64>::new()));

        let mut source = MockSourceChainRpc::new();
        source.expect_endpoint().returning(|| "http://localhost:26657".to_string());
        source.expect_health().returning(|| Ok(()));
        source.expect_latest_height().times(1).returning(|| Ok(3));
        let token = shutdown.clone();
        let captured = fetched.clone();
        source.expect_block_results().returning(move |height| {
            captured.lock().unwrap().push(height);
            if height == 1 {
                token.cancel();
            }
            Ok(vec![])
        });

        let mut destination = destination_behind_at(1);
        destination.expect_submit_signed_prophecy().never();

        let subscriber = new_subscriber(source, destination);
        tokio::time::timeout(Duration::from_secs(60), subscriber.start(shutdown))
            .await
            .expect("subscriber should stop once the scan is done");

        assert_eq!(*fetched.lock().unwrap(), vec![1, 2, 3]);
    }
}
