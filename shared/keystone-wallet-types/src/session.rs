//! Session leaves and owner-approved session batches.

use alloy_primitives::aliases::U48;
use alloy_primitives::{keccak256, Address, Bytes, B256};
use thiserror::Error;

use crate::validation::{ValidationData, MAX_UINT48};

/// A session time bound that does not fit the 48-bit wire field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("session bound {0} does not fit in 48 bits")]
pub struct BoundOutOfRange(pub u64);

/// One scoped permission in a session tree.
///
/// The leaf hash doubles as the session digest used by the hybrid manager:
/// `keccak256(abi.encodePacked(uint48 validUntil, uint48 validAfter, address validator, bytes config))`.
/// Both bounds always fit in 48 bits, so the digest and the validation window describe the same leaf.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionLeaf {
    valid_until: u64,
    valid_after: u64,
    /// Sub-validator that judges the calls made under this session.
    pub validator: Address,
    /// Sub-validator configuration (session key, targets, limits).
    pub config: Bytes,
}

impl SessionLeaf {
    pub fn new(
        valid_until: u64,
        valid_after: u64,
        validator: Address,
        config: impl Into<Bytes>,
    ) -> Result<Self, BoundOutOfRange> {
        for bound in [valid_until, valid_after] {
            if bound > MAX_UINT48 {
                return Err(BoundOutOfRange(bound));
            }
        }
        Ok(Self {
            valid_until,
            valid_after,
            validator,
            config: config.into(),
        })
    }

    /// Leaf from ABI-decoded `uint48` bounds, which are in range by construction.
    pub fn from_wire(valid_until: U48, valid_after: U48, validator: Address, config: Bytes) -> Self {
        Self {
            valid_until: valid_until.to::<u64>(),
            valid_after: valid_after.to::<u64>(),
            validator,
            config,
        }
    }

    pub fn valid_until(&self) -> u64 {
        self.valid_until
    }

    pub fn valid_after(&self) -> u64 {
        self.valid_after
    }

    /// Bounds as the `uint48` values the payload structs carry.
    pub fn wire_bounds(&self) -> (U48, U48) {
        (U48::from(self.valid_until), U48::from(self.valid_after))
    }

    pub fn encode_packed(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(6 + 6 + 20 + self.config.len());
        buf.extend_from_slice(&uint48_be(self.valid_until));
        buf.extend_from_slice(&uint48_be(self.valid_after));
        buf.extend_from_slice(self.validator.as_slice());
        buf.extend_from_slice(&self.config);
        buf
    }

    pub fn digest(&self) -> B256 {
        keccak256(self.encode_packed())
    }

    pub fn validation_data(&self) -> ValidationData {
        ValidationData::window(self.valid_until, self.valid_after)
    }

    /// An all-zero window: valid at any ledger time. Easy to build by accident.
    pub fn is_unbounded(&self) -> bool {
        self.valid_until == 0 && self.valid_after == 0
    }
}

fn uint48_be(value: u64) -> [u8; 6] {
    let be = value.to_be_bytes();
    let mut out = [0u8; 6];
    out.copy_from_slice(&be[2..8]);
    out
}

/// Maximum number of sessions in one approval batch (`uint8 count`).
pub const MAX_SESSIONS_PER_BATCH: usize = u8::MAX as usize;

/// One entry of an owner-approved session batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionApproval {
    /// Chain the session may be enabled on.
    pub chain_id: u64,
    pub digest: B256,
}

/// Ordered list of sessions the owner approves in one signature.
///
/// Wire layout (packed): `uint8 count || uint64[count] chainIds || bytes32[count] digests`.
/// The owner signs `keccak256` of those bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionEnableBatch {
    pub entries: Vec<SessionApproval>,
}

impl SessionEnableBatch {
    pub fn encoded_len(count: usize) -> usize {
        1 + count * 8 + count * 32
    }
}
