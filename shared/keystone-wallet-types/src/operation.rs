//! ERC-4337 user operation and its canonical hash.
//!
//! The hash is what every validation module authenticates. It covers every field except
//! `signature`, then binds the result to one entry point on one chain so a signature cannot be
//! replayed against another dispatcher or another network.
//!
//! Layout (entry point v0.6):
//! - `pack = abi.encode(sender, nonce, keccak(initCode), keccak(callData), callGasLimit,
//!   verificationGasLimit, preVerificationGas, maxFeePerGas, maxPriorityFeePerGas,
//!   keccak(paymasterAndData))`
//! - `hash = keccak256(abi.encode(keccak(pack), entryPoint, chainId))`
//!
//! Changing this layout invalidates every signature produced under it.

use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::{sol, SolValue};

sol! {
    /// ERC-4337 (entry point v0.6) user operation.
    #[derive(Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct UserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        uint256 callGasLimit;
        uint256 verificationGasLimit;
        uint256 preVerificationGas;
        uint256 maxFeePerGas;
        uint256 maxPriorityFeePerGas;
        bytes paymasterAndData;
        bytes signature;
    }
}

/// Number of low nonce bits holding the per-key sequence number.
pub const NONCE_SEQUENCE_BITS: usize = 64;

/// Build a 2-D nonce from a stream key (upper 192 bits) and its sequence number.
pub fn compose_nonce(key: U256, sequence: u64) -> U256 {
    (key << NONCE_SEQUENCE_BITS) | U256::from(sequence)
}

impl UserOperation {
    /// Stream key of the 2-D nonce.
    pub fn nonce_key(&self) -> U256 {
        self.nonce >> NONCE_SEQUENCE_BITS
    }

    /// Sequence number within the nonce key's stream.
    pub fn nonce_sequence(&self) -> u64 {
        self.nonce.as_limbs()[0]
    }

    /// ABI encoding of every field except `signature` (dynamic fields pre-hashed).
    pub fn pack_for_hash(&self) -> Vec<u8> {
        (
            self.sender,
            self.nonce,
            keccak256(&self.initCode),
            keccak256(&self.callData),
            self.callGasLimit,
            self.verificationGasLimit,
            self.preVerificationGas,
            self.maxFeePerGas,
            self.maxPriorityFeePerGas,
            keccak256(&self.paymasterAndData),
        )
            .abi_encode_params()
    }

    /// Operation identity over the given dispatcher and chain.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let inner = keccak256(self.pack_for_hash());
        keccak256((inner, entry_point, U256::from(chain_id)).abi_encode_params())
    }
}
