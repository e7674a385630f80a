//! Session Merkle trees with sorted-pair hashing.
//!
//! Layers are built bottom-up; an odd node at the end of a layer is promoted unchanged, so its
//! proof simply skips that level.

use alloy_primitives::B256;
use keystone_wallet_types::SessionLeaf;
use sha3::{Digest, Keccak256};

pub(crate) fn keccak256_bytes(bytes: &[u8]) -> B256 {
    let mut h = Keccak256::new();
    h.update(bytes);
    B256::from_slice(h.finalize().as_slice())
}

pub fn hash_pair(a: B256, b: B256) -> B256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(lo.as_slice());
    buf[32..].copy_from_slice(hi.as_slice());
    keccak256_bytes(&buf)
}

#[derive(Clone, Debug, Default)]
pub struct SessionTree {
    layers: Vec<Vec<B256>>,
}

impl SessionTree {
    pub fn from_leaves(leaves: &[SessionLeaf]) -> Self {
        Self::from_digests(leaves.iter().map(SessionLeaf::digest).collect())
    }

    pub fn from_digests(leaves: Vec<B256>) -> Self {
        let mut layers = vec![leaves];
        while let Some(layer) = layers.last().filter(|layer| layer.len() > 1) {
            let next = layer
                .chunks(2)
                .map(|pair| match pair {
                    [a, b] => hash_pair(*a, *b),
                    [a] => *a,
                    _ => B256::ZERO,
                })
                .collect();
            layers.push(next);
        }
        Self { layers }
    }

    pub fn len(&self) -> usize {
        self.layers.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Root of the tree; zero for an empty tree.
    pub fn root(&self) -> B256 {
        self.layers
            .last()
            .and_then(|layer| layer.first())
            .copied()
            .unwrap_or_default()
    }

    pub fn leaf(&self, index: usize) -> Option<B256> {
        self.layers.first()?.get(index).copied()
    }

    /// Sibling path from leaf `index` to the root.
    pub fn proof(&self, index: usize) -> Option<Vec<B256>> {
        if index >= self.len() {
            return None;
        }
        let mut proof = Vec::new();
        let mut position = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            if let Some(sibling) = layer.get(position ^ 1) {
                proof.push(*sibling);
            }
            position /= 2;
        }
        Some(proof)
    }

    pub fn verify(proof: &[B256], root: B256, leaf: B256) -> bool {
        proof.iter().fold(leaf, |node, sibling| hash_pair(node, *sibling)) == root
    }
}
