//! Signature envelope: one delegation hop of the recursive signature format.
//!
//! Wire layout: `abi.encode(bytes payload, address handler)`. The outermost `userOp.signature`
//! is always exactly one envelope; `handler` names the module that must interpret `payload`.
//! A module that delegates further treats its own payload as another envelope.

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolValue;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureEnvelope {
    pub payload: Bytes,
    pub handler: Address,
}

impl SignatureEnvelope {
    pub fn new(payload: impl Into<Bytes>, handler: Address) -> Self {
        Self {
            payload: payload.into(),
            handler,
        }
    }

    pub fn encode(&self) -> Bytes {
        (self.payload.clone(), self.handler).abi_encode_params().into()
    }

    /// Decode one envelope layer. Never panics on arbitrary input.
    pub fn decode(data: &[u8]) -> Result<Self, alloy_sol_types::Error> {
        let (payload, handler) = <(Bytes, Address)>::abi_decode_params(data, true)?;
        Ok(Self { payload, handler })
    }
}
