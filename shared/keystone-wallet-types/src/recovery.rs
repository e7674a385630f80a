//! Guardian identities and the account-bound control message.

use alloy_primitives::{keccak256, Address, B256};

/// Signed by every guardian (together with the account address) to approve a recovery.
pub const CONTROL_MESSAGE: &str = "ACCOUNT RECOVERY GUARDIAN SECURE MESSAGE";

/// `keccak256(abi.encodePacked(CONTROL_MESSAGE, account))`.
///
/// Binding the account into the message keeps a guardian's approval for one account from
/// counting toward another account that shares the same guardian.
pub fn control_message_hash(account: Address) -> B256 {
    let mut buf = Vec::with_capacity(CONTROL_MESSAGE.len() + 20);
    buf.extend_from_slice(CONTROL_MESSAGE.as_bytes());
    buf.extend_from_slice(account.as_slice());
    keccak256(buf)
}

/// Guardians are stored by the hash of their address, not the address itself.
pub fn guardian_id(guardian: Address) -> B256 {
    keccak256(guardian)
}
