//! Contract storage keyed by `(contract, associated account, slot)`.
//!
//! Modules keep per-account state. Recording the associated account in the key lets the
//! validation tracer tell an account's own state apart from anyone else's.

use std::collections::BTreeMap;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub contract: Address,
    pub account: Address,
    pub slot: B256,
}

impl SlotKey {
    pub const fn new(contract: Address, account: Address, slot: B256) -> Self {
        Self {
            contract,
            account,
            slot,
        }
    }
}

/// Named slot: `keccak256(label)`.
pub fn slot(label: &str) -> B256 {
    keccak256(label.as_bytes())
}

/// Mapping entry: `keccak256(label || key)`.
pub fn mapping_slot(label: &str, key: impl AsRef<[u8]>) -> B256 {
    let key = key.as_ref();
    let mut buf = Vec::with_capacity(label.len() + key.len());
    buf.extend_from_slice(label.as_bytes());
    buf.extend_from_slice(key);
    keccak256(buf)
}

/// Everything a snapshot has to capture.
#[derive(Clone, Debug, Default)]
pub(crate) struct State {
    pub storage: BTreeMap<SlotKey, Bytes>,
    pub balances: BTreeMap<Address, U256>,
}
