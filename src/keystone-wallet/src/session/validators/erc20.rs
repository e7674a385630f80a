//! ERC-20 transfer sessions: one token, one recipient, capped amount.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolValue};

use crate::errors::{DecodeError, Revert, ValidationError};
use crate::interfaces::IERC20;
use crate::ledger::{Contract, Ledger, Msg};
use crate::session::validators::SessionValidator;
use crate::utils::calldata::Call;

/// Config: `abi.encode(address sessionKey, address token, address recipient, uint256 maxAmount)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Erc20SessionValidator;

pub fn encode_config(session_key: Address, token: Address, recipient: Address, max_amount: U256) -> Bytes {
    (session_key, token, recipient, max_amount)
        .abi_encode_params()
        .into()
}

impl SessionValidator for Erc20SessionValidator {
    fn validate_session_params(
        &self,
        call: &Call,
        session_key_data: &[u8],
        _call_specific_data: &[u8],
    ) -> Result<Address, ValidationError> {
        let (session_key, token, recipient, max_amount) =
            <(Address, Address, Address, U256)>::abi_decode_params(session_key_data, true)
                .map_err(DecodeError::from)?;
        if call.destination != token {
            return Err(ValidationError::CallNotPermitted("wrong token"));
        }
        if !call.value.is_zero() {
            return Err(ValidationError::CallNotPermitted("non-zero call value"));
        }
        let transfer = IERC20::transferCall::abi_decode(&call.data, true)
            .map_err(|_| ValidationError::CallNotPermitted("not an ERC-20 transfer"))?;
        if transfer.to != recipient {
            return Err(ValidationError::CallNotPermitted("wrong recipient"));
        }
        if transfer.amount > max_amount {
            return Err(ValidationError::CallNotPermitted("max amount exceeded"));
        }
        Ok(session_key)
    }
}

impl Contract for Erc20SessionValidator {
    fn call(&self, _ledger: &mut Ledger, _msg: &Msg) -> Result<Bytes, Revert> {
        Err(Revert::reason_string("session validator has no external calls"))
    }

    fn as_session_validator(&self) -> Option<&dyn SessionValidator> {
        Some(self)
    }
}
