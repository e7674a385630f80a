//! Sorted-pair Merkle proofs, compatible with OpenZeppelin `MerkleProof`.

use alloy_primitives::{keccak256, B256};

/// Parent of two nodes: the pair is ordered before hashing, so proofs carry no direction bits.
pub fn hash_pair(a: B256, b: B256) -> B256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(lo.as_slice());
    buf[32..].copy_from_slice(hi.as_slice());
    keccak256(buf)
}

pub fn process_proof(proof: &[B256], leaf: B256) -> B256 {
    proof.iter().fold(leaf, |node, sibling| hash_pair(node, *sibling))
}

pub fn verify(proof: &[B256], root: B256, leaf: B256) -> bool {
    process_proof(proof, leaf) == root
}
