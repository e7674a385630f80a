use alloy_primitives::{eip191_hash_message, Address, Bytes, B256};
use k256::ecdsa::SigningKey;

use crate::tree::keccak256_bytes;

/// In-process secp256k1 signer producing `r || s || v` signatures with `v` in {27, 28}.
#[derive(Clone)]
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner").field("address", &self.address).finish()
    }
}

impl LocalSigner {
    pub fn new(key: SigningKey) -> Self {
        let point = key.verifying_key().to_encoded_point(false);
        let hash = keccak256_bytes(&point.as_bytes()[1..]);
        let address = Address::from_slice(&hash[12..]);
        Self { key, address }
    }

    /// Deterministic key derived from a label. For tests and local tooling only.
    pub fn from_label(label: &str) -> Self {
        let mut seed = keccak256_bytes(label.as_bytes());
        loop {
            if let Ok(key) = SigningKey::from_slice(seed.as_slice()) {
                return Self::new(key);
            }
            seed = keccak256_bytes(seed.as_slice());
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest as-is.
    pub fn sign_hash(&self, digest: B256) -> Result<Bytes, k256::ecdsa::Error> {
        let (signature, recovery_id) = self.key.sign_prehash_recoverable(digest.as_slice())?;
        let mut sig = Vec::with_capacity(65);
        sig.extend_from_slice(&signature.to_bytes());
        sig.push(27 + recovery_id.to_byte());
        Ok(sig.into())
    }

    /// `eth_sign`: sign the EIP-191 digest of `hash`.
    pub fn sign_eth_message(&self, hash: B256) -> Result<Bytes, k256::ecdsa::Error> {
        self.sign_hash(eip191_hash_message(hash))
    }
}
