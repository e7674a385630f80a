//! Module-level signature payloads (the `payload` half of an envelope).
//!
//! Every struct is carried as `abi.encode(field1, field2, ...)`, i.e. the parameter-list
//! encoding (`abi_encode_params` / `abi_decode_params`). The hybrid manager additionally prefixes
//! its payload with a one-byte mode.

use alloy_primitives::aliases::U48;
use alloy_primitives::{Address, Bytes};
use alloy_sol_types::sol;

use crate::session::SessionLeaf;

sol! {
    /// Flat session key manager: session fields, proof against the stored root, session key signature.
    #[derive(Debug, PartialEq, Eq)]
    struct SessionKeyUse {
        uint48 validUntil;
        uint48 validAfter;
        address sessionValidationModule;
        bytes sessionKeyData;
        bytes32[] merkleProof;
        bytes sessionKeySignature;
    }

    /// Hybrid manager, mode `0x00`: the session digest must already be enabled.
    #[derive(Debug, PartialEq, Eq)]
    struct PreEnabledSessionUse {
        uint48 validUntil;
        uint48 validAfter;
        address sessionValidationModule;
        bytes sessionKeyData;
        bytes sessionKeySignature;
    }

    /// Owner approval of a session: position in the signed batch plus the batch and its signature.
    #[derive(Debug, PartialEq, Eq)]
    struct SessionEnableProof {
        uint8 sessionIndex;
        bytes sessionEnableData;
        bytes sessionEnableSignature;
    }

    /// Hybrid manager, mode `0x01`: enable the session from the owner's batch and use it at once.
    #[derive(Debug, PartialEq, Eq)]
    struct SessionEnableUse {
        uint48 validUntil;
        uint48 validAfter;
        address sessionValidationModule;
        bytes sessionKeyData;
        SessionEnableProof enableProof;
        bytes sessionKeySignature;
    }

    /// One positional entry of a batched session payload.
    ///
    /// `proof` is interpreted by the session key manager named in the batch: a Merkle proof for
    /// the flat manager, a mode-prefixed enable proof for the hybrid manager.
    #[derive(Debug, PartialEq, Eq)]
    struct BatchedSession {
        uint48 validUntil;
        uint48 validAfter;
        address sessionValidationModule;
        bytes sessionKeyData;
        bytes proof;
        bytes callSpecificData;
    }

    /// Batched session router payload: one session per call, one signature for the whole batch.
    #[derive(Debug, PartialEq, Eq)]
    struct BatchedSessionUse {
        address sessionKeyManager;
        BatchedSession[] sessions;
        bytes sessionKeySignature;
    }

    /// Recovery submission: the first guardian's operation signature plus every control signature.
    #[derive(Debug, PartialEq, Eq)]
    struct GuardianApproval {
        bytes userOpSignature;
        bytes[] controlSignatures;
    }
}

/// Hybrid payload mode: session digest enabled by an earlier transaction.
pub const MODE_PRE_ENABLED: u8 = 0x00;
/// Hybrid payload mode: session enabled inline from an owner-signed batch.
pub const MODE_ENABLE_AND_USE: u8 = 0x01;

fn leaf(valid_until: U48, valid_after: U48, validator: Address, config: &Bytes) -> SessionLeaf {
    SessionLeaf::from_wire(valid_until, valid_after, validator, config.clone())
}

impl SessionKeyUse {
    pub fn leaf(&self) -> SessionLeaf {
        leaf(self.validUntil, self.validAfter, self.sessionValidationModule, &self.sessionKeyData)
    }
}

impl PreEnabledSessionUse {
    pub fn leaf(&self) -> SessionLeaf {
        leaf(self.validUntil, self.validAfter, self.sessionValidationModule, &self.sessionKeyData)
    }
}

impl SessionEnableUse {
    pub fn leaf(&self) -> SessionLeaf {
        leaf(self.validUntil, self.validAfter, self.sessionValidationModule, &self.sessionKeyData)
    }
}

impl BatchedSession {
    pub fn leaf(&self) -> SessionLeaf {
        leaf(self.validUntil, self.validAfter, self.sessionValidationModule, &self.sessionKeyData)
    }
}
