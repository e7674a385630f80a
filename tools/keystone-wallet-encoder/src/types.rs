use alloy_primitives::Bytes;
use keystone_wallet_types::SessionLeaf;

/// One positional session of a batched router payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchedSessionInput {
    pub leaf: SessionLeaf,
    /// Manager-specific approval: [`crate::merkle_proof_bytes`] for the Merkle manager,
    /// [`crate::pre_enabled_proof`] or [`crate::encode_enable_proof`] for the hybrid manager.
    pub proof: Bytes,
    pub call_specific_data: Bytes,
}
