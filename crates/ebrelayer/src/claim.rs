//! Extraction of relay messages and canonical claims from witnessed events.

use crate::{
    event::EventAttribute,
    symbol_translator::SymbolTranslator,
    types::{NetworkDescriptor, ProphecyId, RelayMessage, RelayerError},
};
use bech32::{FromBase32, ToBase32, Variant};
use ethers::{
    core::types::Address,
    utils::{keccak256, to_checksum},
};
use num_bigint::BigUint;
use std::{str::FromStr, sync::Arc};
use tracing::{debug, warn};

pub const PROPHECY_ID_KEY: &str = "prophecy_id";
pub const NETWORK_DESCRIPTOR_KEY: &str = "network_descriptor";
pub const COSMOS_SENDER_KEY: &str = "cosmos_sender";
pub const ETHEREUM_SENDER_KEY: &str = "ethereum_sender";
pub const ETHEREUM_SENDER_NONCE_KEY: &str = "ethereum_sender_nonce";

const REQUIRED_MESSAGE_ATTRIBUTES: usize = 2;
const REQUIRED_BRIDGE_CLAIM_ATTRIBUTES: usize = 3;
const VALIDATOR_ADDRESS_SUFFIX: &str = "valoper";
const DENOM_HASH_PREFIX: &str = "sif";

/// Parses the attributes of a lock or burn event into a [`RelayMessage`].
///
/// Both `prophecy_id` and `network_descriptor` must be present. The network
/// is validated as soon as it is seen, so an unrecognized network is
/// reported even when the prophecy id is missing.
pub fn burn_lock_event_to_message(
    attributes: &[EventAttribute],
) -> Result<RelayMessage, RelayerError> {
    let mut prophecy_id = None;
    let mut network_descriptor = None;

    for attribute in attributes {
        match attribute.key.as_str() {
            PROPHECY_ID_KEY => {
                prophecy_id = Some(ProphecyId::from(attribute.value.as_str()));
            }
            NETWORK_DESCRIPTOR_KEY => {
                network_descriptor = Some(parse_network_descriptor(&attribute.value)?);
            }
            _ => {}
        }
    }

    match (prophecy_id, network_descriptor) {
        (Some(prophecy_id), Some(network_descriptor)) => Ok(RelayMessage {
            network_descriptor,
            prophecy_id,
        }),
        (prophecy_id, network_descriptor) => {
            let found = usize::from(prophecy_id.is_some()) + usize::from(network_descriptor.is_some());
            warn!(found, "message not complete");
            Err(RelayerError::IncompleteMessage {
                found,
                required: REQUIRED_MESSAGE_ATTRIBUTES,
            })
        }
    }
}

fn parse_network_descriptor(value: &str) -> Result<NetworkDescriptor, RelayerError> {
    let network = value
        .trim()
        .parse::<u32>()
        .map(NetworkDescriptor)
        .map_err(|_| RelayerError::InvalidNetwork(value.to_string()))?;

    if !network.is_valid() {
        return Err(RelayerError::InvalidNetwork(value.to_string()));
    }
    Ok(network)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimKind {
    Lock,
    Burn,
}

// A lock or burn as emitted by the bridge contract on the foreign chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthereumEvent {
    pub network_descriptor: NetworkDescriptor,
    pub bridge_contract_address: Address,
    pub claim_kind: ClaimKind,
    pub from: Address,
    /// Recipient as emitted on chain: the bech32 string's bytes
    pub to: Vec<u8>,
    pub token: Address,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub value: BigUint,
    pub nonce: u64,
}

/// Canonical, chain-agnostic record of one transfer event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    network_descriptor: NetworkDescriptor,
    bridge_contract_address: String,
    claim_kind: ClaimKind,
    nonce: u64,
    sender: String,
    receiver: String,
    validator_address: String,
    token_contract_address: String,
    symbol: String,
    name: String,
    decimals: u8,
    amount: BigUint,
    denom_hash: String,
}

impl Claim {
    pub fn network_descriptor(&self) -> NetworkDescriptor {
        self.network_descriptor
    }

    pub fn bridge_contract_address(&self) -> &str {
        &self.bridge_contract_address
    }

    pub fn claim_kind(&self) -> ClaimKind {
        self.claim_kind
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn validator_address(&self) -> &str {
        &self.validator_address
    }

    pub fn token_contract_address(&self) -> &str {
        &self.token_contract_address
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn amount(&self) -> &BigUint {
        &self.amount
    }

    pub fn denom_hash(&self) -> &str {
        &self.denom_hash
    }
}

/// Prophecy reference carried by `sign_prophecy` and `prophecy_completed`
/// events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignProphecyClaim {
    /// Validator operator address, when the event names one
    pub cosmos_sender: Option<String>,
    pub network_descriptor: NetworkDescriptor,
    pub prophecy_id: ProphecyId,
}

/// Link between a validator and the foreign-chain account that signs for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthereumBridgeClaim {
    pub cosmos_sender: String,
    pub ethereum_sender: Address,
    pub nonce: BigUint,
}

/// Builds [`Claim`]s from foreign-chain events.
#[derive(Debug, Clone)]
pub struct ClaimBuilder {
    address_prefix: String,
    native_asset_symbol: String,
    symbol_translator: Arc<SymbolTranslator>,
}

impl ClaimBuilder {
    pub fn new(
        address_prefix: impl Into<String>,
        native_asset_symbol: impl Into<String>,
        symbol_translator: Arc<SymbolTranslator>,
    ) -> Self {
        Self {
            address_prefix: address_prefix.into(),
            native_asset_symbol: native_asset_symbol.into().to_lowercase(),
            symbol_translator,
        }
    }

    pub fn build_claim(
        &self,
        validator_address: &str,
        event: &EthereumEvent,
    ) -> Result<Claim, RelayerError> {
        let receiver = self.decode_recipient(&event.to)?;

        let symbol = event.symbol.to_lowercase();
        if symbol == self.native_asset_symbol && !event.token.is_zero() {
            return Err(RelayerError::SpoofedNativeAsset {
                symbol,
                token: to_checksum(&event.token, None),
            });
        }
        let symbol = match event.claim_kind {
            ClaimKind::Lock => symbol,
            ClaimKind::Burn => self.symbol_translator.source_to_destination(&symbol),
        };

        let token_contract_address = to_checksum(&event.token, None);
        let denom_hash = denom_hash(
            event.network_descriptor,
            &token_contract_address,
            event.decimals,
            &event.name,
            &event.symbol,
        );

        let claim = Claim {
            network_descriptor: event.network_descriptor,
            bridge_contract_address: to_checksum(&event.bridge_contract_address, None),
            claim_kind: event.claim_kind,
            nonce: event.nonce,
            sender: to_checksum(&event.from, None),
            receiver,
            validator_address: validator_address.to_string(),
            token_contract_address,
            symbol,
            name: event.name.clone(),
            decimals: event.decimals,
            amount: event.value.clone(),
            denom_hash,
        };
        debug!(?claim, "built claim");
        Ok(claim)
    }

    /// Parses the attributes of a `sign_prophecy` or `prophecy_completed`
    /// event. The prophecy id and a recognized network are required; a
    /// sender, when present, must be a validator operator address.
    pub fn sign_prophecy_claim(
        &self,
        attributes: &[EventAttribute],
    ) -> Result<SignProphecyClaim, RelayerError> {
        let mut cosmos_sender = None;
        let mut network_descriptor = None;
        let mut prophecy_id = None;

        for attribute in attributes {
            match attribute.key.as_str() {
                COSMOS_SENDER_KEY => {
                    cosmos_sender = Some(self.decode_validator_address(&attribute.value)?);
                }
                NETWORK_DESCRIPTOR_KEY => {
                    network_descriptor = Some(parse_network_descriptor(&attribute.value)?);
                }
                PROPHECY_ID_KEY => {
                    prophecy_id = Some(ProphecyId::from(attribute.value.as_str()));
                }
                _ => {}
            }
        }

        match (prophecy_id, network_descriptor) {
            (Some(prophecy_id), Some(network_descriptor)) => Ok(SignProphecyClaim {
                cosmos_sender,
                network_descriptor,
                prophecy_id,
            }),
            (prophecy_id, network_descriptor) => Err(RelayerError::IncompleteMessage {
                found: usize::from(prophecy_id.is_some()) + usize::from(network_descriptor.is_some()),
                required: REQUIRED_MESSAGE_ATTRIBUTES,
            }),
        }
    }

    /// Parses the attributes binding a validator to its foreign-chain
    /// signing account. All three attributes are required.
    pub fn ethereum_bridge_claim(
        &self,
        attributes: &[EventAttribute],
    ) -> Result<EthereumBridgeClaim, RelayerError> {
        let mut cosmos_sender = None;
        let mut ethereum_sender = None;
        let mut nonce = None;

        for attribute in attributes {
            match attribute.key.as_str() {
                COSMOS_SENDER_KEY => {
                    cosmos_sender = Some(self.decode_validator_address(&attribute.value)?);
                }
                ETHEREUM_SENDER_KEY => {
                    ethereum_sender = Some(parse_ethereum_address(&attribute.value)?);
                }
                ETHEREUM_SENDER_NONCE_KEY => {
                    let parsed = BigUint::from_str(attribute.value.trim()).map_err(|e| {
                        RelayerError::Parse {
                            field: ETHEREUM_SENDER_NONCE_KEY.to_string(),
                            reason: format!("{:?} is not a nonce: {e}", attribute.value),
                        }
                    })?;
                    nonce = Some(parsed);
                }
                _ => {}
            }
        }

        match (cosmos_sender, ethereum_sender, nonce) {
            (Some(cosmos_sender), Some(ethereum_sender), Some(nonce)) => Ok(EthereumBridgeClaim {
                cosmos_sender,
                ethereum_sender,
                nonce,
            }),
            (cosmos_sender, ethereum_sender, nonce) => Err(RelayerError::IncompleteMessage {
                found: usize::from(cosmos_sender.is_some())
                    + usize::from(ethereum_sender.is_some())
                    + usize::from(nonce.is_some()),
                required: REQUIRED_BRIDGE_CLAIM_ATTRIBUTES,
            }),
        }
    }

    fn decode_recipient(&self, raw: &[u8]) -> Result<String, RelayerError> {
        let address = String::from_utf8_lossy(raw).into_owned();
        decode_bech32(&address, &self.address_prefix).map_err(|reason| {
            RelayerError::InvalidRecipient {
                address: address.clone(),
                reason,
            }
        })
    }

    fn decode_validator_address(&self, address: &str) -> Result<String, RelayerError> {
        let hrp = format!("{}{}", self.address_prefix, VALIDATOR_ADDRESS_SUFFIX);
        decode_bech32(address, &hrp).map_err(|reason| RelayerError::Parse {
            field: COSMOS_SENDER_KEY.to_string(),
            reason: format!("{address:?}: {reason}"),
        })
    }
}

/// Canonical form of a non-empty bech32 address with human readable part
/// `expected_hrp`.
fn decode_bech32(address: &str, expected_hrp: &str) -> Result<String, String> {
    let (hrp, data, variant) = bech32::decode(address).map_err(|e| e.to_string())?;
    if hrp != expected_hrp {
        return Err(format!("expected prefix {expected_hrp:?}, got {hrp:?}"));
    }
    if variant != Variant::Bech32 {
        return Err("expected bech32, got bech32m".to_string());
    }
    let bytes = Vec::<u8>::from_base32(&data).map_err(|e| e.to_string())?;
    if bytes.is_empty() {
        return Err("empty address".to_string());
    }

    bech32::encode(&hrp, bytes.to_base32(), Variant::Bech32).map_err(|e| e.to_string())
}

fn parse_ethereum_address(value: &str) -> Result<Address, RelayerError> {
    let hex_part = value.strip_prefix("0x").unwrap_or(value);
    let invalid = |reason: &str| RelayerError::Parse {
        field: ETHEREUM_SENDER_KEY.to_string(),
        reason: format!("{value:?} {reason}"),
    };
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("is not a hex address"));
    }
    Address::from_str(hex_part).map_err(|e| invalid(&e.to_string()))
}

/// Content-addressed identifier of a bridged asset.
///
/// Every field is length-prefixed before hashing so that no two distinct
/// tuples share a preimage.
pub fn denom_hash(
    network_descriptor: NetworkDescriptor,
    token_contract_address: &str,
    decimals: u8,
    name: &str,
    symbol: &str,
) -> String {
    let token_contract_address = token_contract_address.to_lowercase();

    let mut preimage = Vec::new();
    preimage.extend_from_slice(&network_descriptor.0.to_be_bytes());
    preimage.push(decimals);
    for field in [token_contract_address.as_str(), name, symbol] {
        preimage.extend_from_slice(&(field.len() as u64).to_be_bytes());
        preimage.extend_from_slice(field.as_bytes());
    }

    format!("{}{}", DENOM_HASH_PREFIX, hex::encode(keccak256(preimage)))
}
