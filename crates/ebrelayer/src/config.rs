use crate::{
    claim::ClaimBuilder,
    event::AttributeEncoding,
    scanner::ScannerConfig,
    submitter::SubmissionLimits,
    subscriber::SubscriberConfig,
    symbol_translator::SymbolTranslator,
    types::{NetworkDescriptor, RelayerError},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs, path::{Path, PathBuf}, sync::Arc, time::Duration};

// Config structures
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Key name of the validator in the node's keyring
    pub name: String,
    /// Operator address (`sifvaloper...`) the attestations are filed under
    pub address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SourceChainConfig {
    pub rpc_url: String,
    #[serde(default)]
    pub attribute_encoding: AttributeEncoding,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DestinationChainConfig {
    pub rest_url: String,
    #[serde(default = "default_address_prefix")]
    pub address_prefix: String,
    #[serde(default = "default_native_asset_symbol")]
    pub native_asset_symbol: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct RelayerConfig {
    pub validator: ValidatorConfig,
    pub source: SourceChainConfig,
    pub destination: DestinationChainConfig,
    pub networks: Vec<NetworkDescriptor>,
    #[serde(default)]
    pub symbol_translator_file: Option<PathBuf>,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default = "default_block_retry_delay_ms")]
    pub block_retry_delay_ms: u64,
    #[serde(default = "default_max_block_retry_delay_ms")]
    pub max_block_retry_delay_ms: u64,
    #[serde(default = "default_max_height_retries")]
    pub max_height_retries: u32,
    #[serde(default = "default_max_tracked_attestations")]
    pub max_tracked_attestations: usize,
    #[serde(default = "default_max_pending_attestations")]
    pub max_pending_attestations: usize,
    #[serde(default = "default_max_submission_attempts")]
    pub max_submission_attempts: u32,
}

fn default_address_prefix() -> String {
    "sif".to_string()
}

fn default_native_asset_symbol() -> String {
    "eth".to_string()
}

fn default_tick_interval_ms() -> u64 {
    5_000
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_max_reconnect_delay_ms() -> u64 {
    60_000
}

fn default_rpc_timeout_ms() -> u64 {
    1_000
}

fn default_block_retry_delay_ms() -> u64 {
    500
}

fn default_max_block_retry_delay_ms() -> u64 {
    5_000
}

fn default_max_height_retries() -> u32 {
    10
}

fn default_max_tracked_attestations() -> usize {
    10_000
}

fn default_max_pending_attestations() -> usize {
    1_000
}

fn default_max_submission_attempts() -> u32 {
    20
}

impl RelayerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .context(format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RelayerError> {
        if self.networks.is_empty() {
            return Err(RelayerError::Config("no networks configured".to_string()));
        }
        let mut seen = HashSet::new();
        for network in &self.networks {
            if !network.is_valid() {
                return Err(RelayerError::Config(format!("network {} is not recognized", network.0)));
            }
            if !seen.insert(network) {
                return Err(RelayerError::Config(format!("network {network} is listed twice")));
            }
        }
        if self.validator.address.trim().is_empty() {
            return Err(RelayerError::Config("validator address is empty".to_string()));
        }
        if self.tick_interval_ms == 0 {
            return Err(RelayerError::Config("tick_interval_ms must be positive".to_string()));
        }
        if self.rpc_timeout_ms == 0 {
            return Err(RelayerError::Config("rpc_timeout_ms must be positive".to_string()));
        }
        if self.max_height_retries == 0 {
            return Err(RelayerError::Config("max_height_retries must be positive".to_string()));
        }
        if self.max_submission_attempts == 0 {
            return Err(RelayerError::Config("max_submission_attempts must be positive".to_string()));
        }
        Ok(())
    }

    pub fn subscriber_config(&self, network: NetworkDescriptor) -> SubscriberConfig {
        SubscriberConfig {
            network,
            validator_name: self.validator.name.clone(),
            validator_address: self.validator.address.clone(),
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_reconnect_delay: Duration::from_millis(self.max_reconnect_delay_ms),
            rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
            submission: SubmissionLimits {
                max_tracked: self.max_tracked_attestations,
                max_pending: self.max_pending_attestations,
                max_attempts: self.max_submission_attempts,
            },
            scanner: ScannerConfig {
                attribute_encoding: self.source.attribute_encoding,
                retry_delay: Duration::from_millis(self.block_retry_delay_ms),
                max_retry_delay: Duration::from_millis(self.max_block_retry_delay_ms),
                max_height_retries: self.max_height_retries,
            },
        }
    }

    pub fn symbol_translator(&self) -> Result<SymbolTranslator> {
        match &self.symbol_translator_file {
            Some(path) => SymbolTranslator::from_file(path),
            None => Ok(SymbolTranslator::default()),
        }
    }

    /// Claim builder for events witnessed on the foreign chain.
    pub fn claim_builder(&self) -> Result<ClaimBuilder> {
        Ok(ClaimBuilder::new(
            self.destination.address_prefix.clone(),
            self.destination.native_asset_symbol.clone(),
            Arc::new(self.symbol_translator()?),
        ))
    }
}
