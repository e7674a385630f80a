//! Magic values shared with the ERC-4337 / EIP-1271 ecosystem.

use alloy_primitives::{fixed_bytes, FixedBytes};

/// `bytes4(keccak256("isValidSignature(bytes32,bytes)"))`.
pub const EIP1271_MAGIC_VALUE: FixedBytes<4> = fixed_bytes!("1626ba7e");
pub const EIP1271_INVALID: FixedBytes<4> = fixed_bytes!("ffffffff");

/// Maximum nesting of contract calls on the ledger.
pub const MAX_CALL_DEPTH: usize = 1024;

/// Guardian counts and thresholds are stored as `uint8`.
pub const MAX_GUARDIANS: usize = u8::MAX as usize;
