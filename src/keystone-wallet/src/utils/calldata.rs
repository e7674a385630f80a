//! Decoding of the account's own execution calldata.
//!
//! Session validators judge the calls an operation will make, so validation has to see through
//! `execute` / `executeBatch` to the individual `(destination, value, data)` triples.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;

use crate::errors::DecodeError;
use crate::interfaces::ISmartAccount;

/// One call the account will make during execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub destination: Address,
    pub value: U256,
    pub data: Bytes,
}

impl Call {
    pub fn selector(&self) -> Option<[u8; 4]> {
        selector_of(&self.data)
    }
}

pub fn selector_of(data: &[u8]) -> Option<[u8; 4]> {
    data.get(..4).and_then(|s| s.try_into().ok())
}

fn expect_selector(data: &[u8], expected: [u8; 4]) -> Result<(), DecodeError> {
    let selector = selector_of(data).ok_or(DecodeError::Truncated)?;
    if selector != expected {
        return Err(DecodeError::UnexpectedSelector(selector));
    }
    Ok(())
}

/// `execute(dest, value, func)` as a single call.
pub fn decode_execute(call_data: &[u8]) -> Result<Call, DecodeError> {
    expect_selector(call_data, ISmartAccount::executeCall::SELECTOR)?;
    let call = ISmartAccount::executeCall::abi_decode(call_data, true)?;
    Ok(Call {
        destination: call.dest,
        value: call.value,
        data: call.func,
    })
}

/// `executeBatch(dest[], value[], func[])` as positional calls.
///
/// An empty `value` array means every call carries zero value.
pub fn decode_execute_batch(call_data: &[u8]) -> Result<Vec<Call>, DecodeError> {
    expect_selector(call_data, ISmartAccount::executeBatchCall::SELECTOR)?;
    let batch = ISmartAccount::executeBatchCall::abi_decode(call_data, true)?;
    batch_calls(batch.dest, batch.value, batch.func)
}

pub(crate) fn batch_calls(
    dest: Vec<Address>,
    value: Vec<U256>,
    func: Vec<Bytes>,
) -> Result<Vec<Call>, DecodeError> {
    if dest.len() != func.len() || !(value.is_empty() || value.len() == func.len()) {
        return Err(DecodeError::BatchShape);
    }
    let values = value.into_iter().chain(std::iter::repeat(U256::ZERO));
    Ok(dest
        .into_iter()
        .zip(values)
        .zip(func)
        .map(|((destination, value), data)| Call {
            destination,
            value,
            data,
        })
        .collect())
}
