use std::fmt;

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolError;
use thiserror::Error;

/// Errors while decoding a signature payload, calldata, or packed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload truncated")]
    Truncated,
    #[error("invalid ABI encoding")]
    InvalidAbi,
    #[error("trailing bytes after payload")]
    TrailingBytes,
    #[error("unexpected call selector 0x{}", hex::encode(.0))]
    UnexpectedSelector([u8; 4]),
    #[error("batch arrays disagree in length")]
    BatchShape,
    #[error("signature must be 65 bytes, got {0}")]
    SignatureLength(usize),
    #[error("{0} argument rules exceed the limit")]
    TooManyRules(usize),
    #[error("unknown rule condition {0}")]
    UnknownCondition(u8),
    #[error("unknown session mode {0}")]
    UnknownMode(u8),
}

impl From<alloy_sol_types::Error> for DecodeError {
    fn from(_: alloy_sol_types::Error) -> Self {
        DecodeError::InvalidAbi
    }
}

/// Reasons a validation module denies an operation.
///
/// These are outcomes, not faults: the dispatcher turns them into a per-operation rejection and
/// carries on with the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] DecodeError),
    #[error("caller {0} is not the entry point")]
    CallerNotEntryPoint(Address),
    #[error("validation module {0} is not enabled on the account")]
    ModuleNotEnabled(Address),
    #[error("{0} is not a validation module")]
    NotAValidationModule(Address),
    #[error("module {0} cannot delegate to itself")]
    SelfDelegation(Address),
    #[error("account is not initialized for this module")]
    NotInitialized,

    #[error("session not approved")]
    SessionNotApproved,
    #[error("{0} is not a session validator")]
    UnknownSessionValidator(Address),
    #[error("{0} is not a session key manager")]
    NotASessionKeyManager(Address),
    #[error("call not permitted by session: {0}")]
    CallNotPermitted(&'static str),
    #[error("sessions in one batch resolve to different session keys")]
    InconsistentSessionKeys,
    #[error("batch has {calls} calls but {sessions} sessions")]
    BatchLengthMismatch { calls: usize, sessions: usize },
    #[error("session index {index} out of range for {count} approved sessions")]
    SessionIndexOutOfRange { index: usize, count: usize },
    #[error("session approved for chain {approved}, ledger chain is {actual}")]
    ChainMismatch { approved: u64, actual: u64 },
    #[error("session digest does not match the approved batch")]
    SessionDigestMismatch,
    #[error("account rejected the session enable signature")]
    InvalidEnableSignature,
    #[error("session was disabled by the account")]
    SessionRevoked,

    #[error("only {valid} of {threshold} required guardians signed")]
    InsufficientGuardians { valid: usize, threshold: usize },
    #[error("guardian {0} signed more than once")]
    DuplicateGuardian(Address),
    #[error("{0} is not a guardian of the account")]
    NotAGuardian(Address),
    #[error("guardian control signature is not recoverable")]
    InvalidGuardianSignature,
    #[error("no recoveries left for the account")]
    NoRecoveriesLeft,
}

impl From<alloy_sol_types::Error> for ValidationError {
    fn from(err: alloy_sol_types::Error) -> Self {
        ValidationError::Malformed(err.into())
    }
}

impl ValidationError {
    /// Malformed payloads are denied like any other failure but carry no recoverable intent.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ValidationError::Malformed(_))
    }
}

/// Execution-phase revert carrying ABI-encoded revert data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revert {
    pub data: Bytes,
}

impl Revert {
    /// Solidity `Error(string)` revert.
    pub fn reason_string(reason: impl Into<String>) -> Self {
        let error = alloy_sol_types::Revert {
            reason: reason.into(),
        };
        Self {
            data: error.abi_encode().into(),
        }
    }

    /// Custom `sol!` error revert.
    pub fn custom<E: SolError>(error: E) -> Self {
        Self {
            data: error.abi_encode().into(),
        }
    }

    /// Decode the revert data as a specific custom error.
    pub fn decode<E: SolError>(&self) -> Option<E> {
        E::abi_decode(&self.data, true).ok()
    }

    /// Human-readable reason: the `Error(string)` message, or the raw data in hex.
    pub fn reason(&self) -> String {
        match alloy_sol_types::Revert::abi_decode(&self.data, true) {
            Ok(revert) => revert.reason,
            Err(_) => format!("0x{}", hex::encode(&self.data)),
        }
    }
}

impl fmt::Display for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execution reverted: {}", self.reason())
    }
}

impl std::error::Error for Revert {}
