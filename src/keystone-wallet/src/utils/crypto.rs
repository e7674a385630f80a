//! Signature recovery for owner, session key and guardian signatures.

use alloy_primitives::{eip191_hash_message, keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

use crate::errors::DecodeError;

/// View `sig` as `r || s || v`.
pub fn signature_bytes(sig: &[u8]) -> Result<&[u8; 65], DecodeError> {
    sig.try_into().map_err(|_| DecodeError::SignatureLength(sig.len()))
}

/// Recover an EOA address from a 32-byte digest and an ECDSA signature.
///
/// Accepts v in {0,1,27,28}; anything else, a high `s` or an off-curve point recovers nothing.
pub fn ecrecover_address(digest: B256, sig: &[u8; 65]) -> Option<Address> {
    let recovery_byte = match sig[64] {
        v @ (27 | 28) => v - 27,
        v @ (0 | 1) => v,
        _ => return None,
    };
    let signature = Signature::from_slice(&sig[..64]).ok()?;
    let recovery_id = RecoveryId::from_byte(recovery_byte)?;
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id).ok()?;
    Some(public_key_address(&key))
}

/// Recover the signer of `eth_sign(hash)`, the form every session key and guardian uses.
pub fn recover_eth_signed(hash: B256, sig: &[u8; 65]) -> Option<Address> {
    ecrecover_address(eip191_hash_message(hash), sig)
}

pub fn public_key_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}
