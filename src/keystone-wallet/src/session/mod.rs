//! Session keys: scoped, time-boxed signing authority delegated by the account owner.
//!
//! A session is a [`SessionLeaf`]: a window, a sub-validator and that sub-validator's config.
//! Managers decide whether a leaf is approved for an account (Merkle root, or enabled digest);
//! sub-validators decide whether a call fits the leaf and name the key allowed to sign it.

pub mod hybrid;
pub mod manager;
pub mod merkle;
pub mod router;
pub mod validators;

use alloy_primitives::{Address, B256};
use keystone_wallet_types::{SessionLeaf, ValidationData};
use tracing::debug;

use crate::errors::ValidationError;
use crate::ledger::Ledger;
use crate::utils::calldata::Call;
use crate::utils::crypto::{recover_eth_signed, signature_bytes};

pub use hybrid::HybridSessionManager;
pub use manager::MerkleSessionManager;
pub use router::BatchedSessionRouter;

/// Approval check the batched router delegates to a session key manager.
pub trait SessionKeyManager {
    /// Succeeds when `leaf` is approved for `account`. The meaning of `proof` is manager-specific.
    fn validate_session_key(
        &self,
        ledger: &mut Ledger,
        this: Address,
        account: Address,
        leaf: &SessionLeaf,
        proof: &[u8],
    ) -> Result<(), ValidationError>;
}

/// Ask the leaf's sub-validator whether `call` is in scope; returns the session key.
pub(crate) fn session_key_for(
    ledger: &Ledger,
    leaf: &SessionLeaf,
    call: &Call,
    call_specific_data: &[u8],
) -> Result<Address, ValidationError> {
    let code = ledger
        .code(leaf.validator)
        .ok_or(ValidationError::UnknownSessionValidator(leaf.validator))?;
    let validator = code
        .as_session_validator()
        .ok_or(ValidationError::UnknownSessionValidator(leaf.validator))?;
    validator.validate_session_params(call, &leaf.config, call_specific_data)
}

/// Final step shared by every session path: the session key must have signed `eth_sign(op_hash)`.
pub(crate) fn authorize(
    op_hash: B256,
    signature: &[u8],
    session_key: Address,
    window: ValidationData,
) -> Result<ValidationData, ValidationError> {
    let signature = signature_bytes(signature)?;
    match recover_eth_signed(op_hash, signature) {
        Some(signer) if signer == session_key => Ok(window),
        signer => {
            debug!(%session_key, ?signer, "operation not signed by session key");
            Ok(ValidationData::failed())
        }
    }
}

pub(crate) fn log_if_unbounded(leaf: &SessionLeaf) {
    if leaf.is_unbounded() {
        debug!(validator = %leaf.validator, "session has no time bounds");
    }
}
