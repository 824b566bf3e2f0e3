mod app;
mod claim;
mod config;
mod destination_client;
mod event;
mod nonce_tracker;
mod scanner;
mod signer;
mod source_client;
mod submitter;
mod subscriber;
mod symbol_translator;
mod types;

pub use app::RelayerApp;
pub use claim::{
    burn_lock_event_to_message, denom_hash, Claim, ClaimBuilder, ClaimKind, EthereumBridgeClaim,
    EthereumEvent, SignProphecyClaim,
};
pub use config::{DestinationChainConfig, RelayerConfig, SourceChainConfig, ValidatorConfig};
pub use destination_client::{BroadcastRejected, CosmosRestClient, DestinationChainRpc, MsgSignProphecy};
pub use event::{AttributeEncoding, ChainEvent, EventAttribute, EventKind, RawEvent};
pub use nonce_tracker::{NonceTracker, ScanRange};
pub use scanner::{BlockRangeScanner, EventHandler, ScanSummary, ScannerConfig};
pub use signer::{prefixed_digest, ProphecySigner, SIGNED_MESSAGE_PREFIX};
pub use source_client::{SourceChainRpc, TendermintRpcClient, TxEvents};
pub use submitter::{SubmissionLimits, Submitter};
pub use subscriber::{ChainSubscriber, SubscriberConfig, SubscriberState, WitnessPipeline};
pub use symbol_translator::SymbolTranslator;
pub use types::{Attestation, NetworkDescriptor, ProphecyId, RelayMessage, RelayerError};
