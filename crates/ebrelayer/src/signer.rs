use crate::types::{ProphecyId, RelayerError};
use ethers::{
    core::types::{Address, H256},
    signers::{LocalWallet, Signer},
    utils::keccak256,
};
use std::{fmt, str::FromStr};

/// Constant prefix every signed prophecy id is bound to.
pub const SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Digest that is actually signed: `keccak256(prefix || prophecy_id)`.
pub fn prefixed_digest(prophecy_id: &ProphecyId) -> H256 {
    let mut message = Vec::with_capacity(SIGNED_MESSAGE_PREFIX.len() + prophecy_id.as_bytes().len());
    message.extend_from_slice(SIGNED_MESSAGE_PREFIX);
    message.extend_from_slice(prophecy_id.as_bytes());
    H256::from(keccak256(message))
}

pub struct ProphecySigner {
    wallet: LocalWallet,
}

impl ProphecySigner {
    /// Accepts a hex-encoded secp256k1 key, with or without `0x`.
    pub fn from_private_key(private_key: &str) -> Result<Self, RelayerError> {
        let wallet = LocalWallet::from_str(private_key.trim())
            .map_err(|e| RelayerError::Signing(format!("unusable private key: {e}")))?;
        Ok(Self { wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Deterministic (RFC 6979) 65-byte `r || s || v` signature.
    pub fn sign(&self, prophecy_id: &ProphecyId) -> Result<Vec<u8>, RelayerError> {
        let signature = self
            .wallet
            .sign_hash(prefixed_digest(prophecy_id))
            .map_err(|e| RelayerError::Signing(e.to_string()))?;
        Ok(signature.to_vec())
    }
}

impl fmt::Debug for ProphecySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProphecySigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::core::types::Signature;

    const PRIVATE_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn signature_recovers_to_signer_address() {
        let signer = ProphecySigner::from_private_key(PRIVATE_KEY).unwrap();
        let prophecy_id = ProphecyId::from("abc123");

        let bytes = signer.sign(&prophecy_id).unwrap();
        assert_eq!(bytes.len(), 65);

        let signature = Signature::try_from(bytes.as_slice()).unwrap();
        let recovered = signature.recover(prefixed_digest(&prophecy_id)).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn signing_is_deterministic() {
        let signer = ProphecySigner::from_private_key(PRIVATE_KEY).unwrap();
        let prophecy_id = ProphecyId::from("abc123");
        assert_eq!(signer.sign(&prophecy_id).unwrap(), signer.sign(&prophecy_id).unwrap());
        assert_ne!(
            signer.sign(&prophecy_id).unwrap(),
            signer.sign(&ProphecyId::from("abc124")).unwrap()
        );
    }

    #[test]
    fn digest_covers_prefix_and_id() {
        let expected = keccak256([SIGNED_MESSAGE_PREFIX, b"abc123".as_slice()].concat());
        assert_eq!(prefixed_digest(&ProphecyId::from("abc123")), H256::from(expected));
    }

    #[test]
    fn key_without_prefix_is_accepted() {
        let with_prefix = ProphecySigner::from_private_key(PRIVATE_KEY).unwrap();
        let without_prefix = ProphecySigner::from_private_key(&PRIVATE_KEY[2..]).unwrap();
        assert_eq!(with_prefix.address(), without_prefix.address());
    }

    #[test]
    fn unusable_key_is_a_signing_error() {
        for key in ["", "0x1234", "not hex at all", "00".repeat(32).as_str()] {
            assert!(matches!(
                ProphecySigner::from_private_key(key),
                Err(RelayerError::Signing(_))
            ));
        }
    }
}
