use ethers::core::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

// Chain identifier shared by the source and destination ledgers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkDescriptor(pub u32);

impl NetworkDescriptor {
    pub const ETHEREUM: Self = Self(1);
    pub const BINANCE_SMART_CHAIN: Self = Self(2);
    pub const ETHEREUM_TESTNET_ROPSTEN: Self = Self(3);
    pub const HARDHAT: Self = Self(9999);

    /// Every network the relayer accepts. Anything else, including the
    /// unspecified value `0`, is rejected.
    pub const RECOGNIZED: [Self; 4] = [
        Self::ETHEREUM,
        Self::BINANCE_SMART_CHAIN,
        Self::ETHEREUM_TESTNET_ROPSTEN,
        Self::HARDHAT,
    ];

    pub fn is_valid(self) -> bool {
        Self::RECOGNIZED.contains(&self)
    }

    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::ETHEREUM => Some("ethereum"),
            Self::BINANCE_SMART_CHAIN => Some("binance-smart-chain"),
            Self::ETHEREUM_TESTNET_ROPSTEN => Some("ethereum-testnet-ropsten"),
            Self::HARDHAT => Some("hardhat"),
            _ => None,
        }
    }
}

impl fmt::Display for NetworkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "unknown({})", self.0),
        }
    }
}

/// Opaque identifier binding one witnessed event to its prophecy on the
/// destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProphecyId(Vec<u8>);

impl ProphecyId {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ProphecyId {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl fmt::Display for ProphecyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

// Minimal message extracted from a lock/burn event on the source chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    pub network_descriptor: NetworkDescriptor,
    pub prophecy_id: ProphecyId,
}

// Signed statement by one validator about one prophecy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub validator_address: String,
    pub network_descriptor: NetworkDescriptor,
    pub prophecy_id: ProphecyId,
    pub signer_address: Address,
    pub signature: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayerError {
    #[error("Failed to connect to {endpoint}: {source}")]
    Connection {
        endpoint: String,
        source: anyhow::Error,
    },

    #[error("RPC call {call} failed: {source}")]
    Rpc {
        call: &'static str,
        source: anyhow::Error,
    },

    #[error("Failed to parse {field}: {reason}")]
    Parse { field: String, reason: String },

    #[error("Message not complete: found {found} of {required} required attributes")]
    IncompleteMessage { found: usize, required: usize },

    #[error("Network descriptor {0:?} is invalid")]
    InvalidNetwork(String),

    #[error("Invalid recipient address {address:?}: {reason}")]
    InvalidRecipient { address: String, reason: String },

    #[error("Symbol {symbol:?} must have null address set as token address, got {token}")]
    SpoofedNativeAsset { symbol: String, token: String },

    #[error("Failed to sign prophecy id: {0}")]
    Signing(String),

    #[error("Failed to submit signed prophecy {prophecy_id}: {source}")]
    Submission {
        prophecy_id: ProphecyId,
        source: anyhow::Error,
    },

    #[error("Signed prophecy {prophecy_id} rejected with code {code}: {reason}")]
    Rejected {
        prophecy_id: ProphecyId,
        code: u32,
        reason: String,
    },

    #[error("Block {height} could not be fetched after {attempts} attempts: {source}")]
    HeightStalled {
        height: u64,
        attempts: u32,
        source: anyhow::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RelayerError {
    /// Infrastructure faults are retried at the unit where they occurred;
    /// everything else is scoped to a single event or attestation.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Rpc { .. } | Self::HeightStalled { .. }
        )
    }
}
