//! Validation modules and envelope dispatch.
//!
//! An account's `signature` is `abi.encode(bytes payload, address handler)`. The account peels
//! that outer layer, checks the handler is one of its enabled modules and hands it the payload.
//! A module that delegates (the recovery module) peels its own layer the same way.

pub mod ownership;

use alloy_primitives::{Address, B256};
use keystone_wallet_types::{SignatureEnvelope, UserOperation, ValidationData};
use tracing::debug;

use crate::account::SmartAccount;
use crate::errors::{DecodeError, ValidationError};
use crate::ledger::Ledger;

pub use ownership::EcdsaOwnershipModule;

/// A module that can authorize operations for accounts that enabled it.
///
/// `this` is the module's own address (its storage namespace); the account is `op.sender`.
/// Signature mismatches return `Ok(ValidationData::failed())`; structural problems and
/// permission denials return an error.
pub trait ValidationModule {
    fn validate_user_op(
        &self,
        ledger: &mut Ledger,
        this: Address,
        op: &UserOperation,
        op_hash: B256,
        signature: &[u8],
    ) -> Result<ValidationData, ValidationError>;

    /// EIP-1271 check on behalf of `account`.
    fn is_valid_signature_for(
        &self,
        _ledger: &mut Ledger,
        _this: Address,
        _account: Address,
        _hash: B256,
        _signature: &[u8],
    ) -> bool {
        false
    }
}

pub fn decode_envelope(signature: &[u8]) -> Result<SignatureEnvelope, DecodeError> {
    SignatureEnvelope::decode(signature).map_err(DecodeError::from)
}

/// Unwrap one envelope layer and validate with the module it names.
pub fn validate_envelope(
    ledger: &mut Ledger,
    account: Address,
    op: &UserOperation,
    op_hash: B256,
    signature: &[u8],
) -> Result<ValidationData, ValidationError> {
    let envelope = decode_envelope(signature)?;
    forward(ledger, account, op, op_hash, &envelope)
}

/// Validate with the handler of an already-decoded envelope.
pub fn forward(
    ledger: &mut Ledger,
    account: Address,
    op: &UserOperation,
    op_hash: B256,
    envelope: &SignatureEnvelope,
) -> Result<ValidationData, ValidationError> {
    let handler = envelope.handler;
    if !SmartAccount::is_module_enabled(ledger, account, handler) {
        return Err(ValidationError::ModuleNotEnabled(handler));
    }
    let code = ledger
        .code(handler)
        .ok_or(ValidationError::NotAValidationModule(handler))?;
    let module = code
        .as_validation_module()
        .ok_or(ValidationError::NotAValidationModule(handler))?;
    debug!(%account, %handler, "dispatching validation");
    module.validate_user_op(ledger, handler, op, op_hash, &envelope.payload)
}

/// EIP-1271 dispatch: same envelope, same enabled-module rule.
pub fn is_valid_signature(ledger: &mut Ledger, account: Address, hash: B256, signature: &[u8]) -> bool {
    let Ok(envelope) = decode_envelope(signature) else {
        return false;
    };
    is_valid_signature_with(ledger, account, hash, &envelope)
}

pub fn is_valid_signature_with(
    ledger: &mut Ledger,
    account: Address,
    hash: B256,
    envelope: &SignatureEnvelope,
) -> bool {
    if !SmartAccount::is_module_enabled(ledger, account, envelope.handler) {
        return false;
    }
    let Some(code) = ledger.code(envelope.handler) else {
        return false;
    };
    match code.as_validation_module() {
        Some(module) => {
            module.is_valid_signature_for(ledger, envelope.handler, account, hash, &envelope.payload)
        }
        None => false,
    }
}
