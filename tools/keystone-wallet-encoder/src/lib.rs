//! Off-ledger payload builders for Keystone wallet modules.
//!
//! Everything here produces bytes the on-ledger modules decode: session trees and proofs,
//! signature envelopes, session and recovery payloads, and deterministic test signers.

pub mod encoder;
pub mod signer;
pub mod tree;
pub mod types;

pub use encoder::{
    encode_abi_permission, encode_batched_session_use, encode_enable_and_use, encode_enable_proof,
    encode_envelope, encode_guardian_approval, encode_pre_enabled_use, encode_session_enable_data,
    encode_session_key_use, merkle_proof_bytes, pre_enabled_proof, EncodeError,
};
pub use signer::LocalSigner;
pub use tree::SessionTree;
pub use types::BatchedSessionInput;
