//! Session sub-validators: per-call permission checks.

pub mod abi;
pub mod erc20;

use alloy_primitives::Address;

use crate::errors::ValidationError;
use crate::utils::calldata::Call;

pub use abi::AbiSessionValidator;
pub use erc20::Erc20SessionValidator;

pub trait SessionValidator {
    /// Check one call against `session_key_data` and return the session key allowed to sign it.
    fn validate_session_params(
        &self,
        call: &Call,
        session_key_data: &[u8],
        call_specific_data: &[u8],
    ) -> Result<Address, ValidationError>;
}
