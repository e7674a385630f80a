//! Shared types for Keystone wallet validation.
//!
//! Everything in here is consumed by both sides of the wire: the validation modules that decode
//! and check payloads, and the off-ledger tooling that builds and signs them. Keeping the layouts
//! in one crate is what keeps the two sides byte-compatible.

pub mod envelope;
pub mod operation;
pub mod payloads;
pub mod recovery;
pub mod rules;
pub mod session;
pub mod validation;

pub use envelope::SignatureEnvelope;
pub use operation::{compose_nonce, UserOperation};
pub use payloads::{
    BatchedSession, BatchedSessionUse, GuardianApproval, PreEnabledSessionUse, SessionEnableProof,
    SessionEnableUse, SessionKeyUse,
};
pub use recovery::{control_message_hash, guardian_id, CONTROL_MESSAGE};
pub use rules::{AbiPermission, Condition, ParamRule};
pub use session::{BoundOutOfRange, SessionApproval, SessionEnableBatch, SessionLeaf};
pub use validation::{ValidationData, MAX_UINT48};
