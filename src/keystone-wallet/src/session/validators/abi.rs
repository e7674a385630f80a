//! ABI permission sessions: one destination, one function, bounded value, argument rules.

use alloy_primitives::{Address, Bytes, U256};
use keystone_wallet_types::{AbiPermission, Condition, ParamRule};

use crate::errors::{DecodeError, Revert, ValidationError};
use crate::ledger::{Contract, Ledger, Msg};
use crate::session::validators::SessionValidator;
use crate::utils::bytes::{
    expect_end, read_address, read_b32, read_selector, read_u128_be, read_u16_be, read_u8,
};
use crate::utils::calldata::Call;

const MAX_RULES_DEFAULT: usize = 64;

#[derive(Clone, Copy, Debug, Default)]
pub struct AbiSessionValidator;

/// Decode a packed permission into its header and bounded rule list.
pub fn decode_permission(bytes: &[u8]) -> Result<AbiPermission, DecodeError> {
    decode_permission_with_limit(bytes, MAX_RULES_DEFAULT)
}

pub fn decode_permission_with_limit(bytes: &[u8], max_rules: usize) -> Result<AbiPermission, DecodeError> {
    let mut i = 0usize;
    let session_key = read_address(bytes, &mut i)?;
    let destination = read_address(bytes, &mut i)?;
    let selector = read_selector(bytes, &mut i)?;
    let value_limit = read_u128_be(bytes, &mut i)?;
    let count = read_u16_be(bytes, &mut i)? as usize;
    if count > max_rules {
        return Err(DecodeError::TooManyRules(count));
    }

    let mut rules = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = read_u16_be(bytes, &mut i)?;
        let raw = read_u8(bytes, &mut i)?;
        let condition = Condition::try_from(raw).map_err(|_| DecodeError::UnknownCondition(raw))?;
        let reference = read_b32(bytes, &mut i)?;
        rules.push(ParamRule {
            offset,
            condition,
            reference,
        });
    }
    expect_end(bytes, i)?;

    Ok(AbiPermission {
        session_key,
        destination,
        selector,
        value_limit,
        rules,
    })
}

/// Evaluate the permission against one call.
pub fn evaluate_permission(permission: &AbiPermission, call: &Call) -> Result<(), ValidationError> {
    if call.destination != permission.destination {
        return Err(ValidationError::CallNotPermitted("destination not allowed"));
    }
    if call.selector() != Some(permission.selector) {
        return Err(ValidationError::CallNotPermitted("function not allowed"));
    }
    if call.value > U256::from(permission.value_limit) {
        return Err(ValidationError::CallNotPermitted("value limit exceeded"));
    }
    for rule in &permission.rules {
        let start = 4 + rule.offset as usize;
        let word = call
            .data
            .get(start..start + 32)
            .ok_or(ValidationError::CallNotPermitted("argument out of bounds"))?;
        let lhs = U256::from_be_slice(word);
        let rhs = U256::from_be_bytes(rule.reference.0);
        if !rule.condition.holds(lhs, rhs) {
            return Err(ValidationError::CallNotPermitted("argument rule failed"));
        }
    }
    Ok(())
}

impl SessionValidator for AbiSessionValidator {
    fn validate_session_params(
        &self,
        call: &Call,
        session_key_data: &[u8],
        _call_specific_data: &[u8],
    ) -> Result<Address, ValidationError> {
        let permission = decode_permission(session_key_data)?;
        evaluate_permission(&permission, call)?;
        Ok(permission.session_key)
    }
}

impl Contract for AbiSessionValidator {
    fn call(&self, _ledger: &mut Ledger, _msg: &Msg) -> Result<Bytes, Revert> {
        Err(Revert::reason_string("session validator has no external calls"))
    }

    fn as_session_validator(&self) -> Option<&dyn SessionValidator> {
        Some(self)
    }
}
