//! ERC-4337 entry point (v0.6 semantics, no gas accounting).
//!
//! Each operation is handled on its own: nonce, account validation and the window check run
//! inside a snapshot that is discarded on rejection, so one bad operation never affects the others
//! in the same bundle. Execution is a separate frame; an execution revert undoes the calls but
//! keeps the consumed nonce and any validation-phase state changes.

pub mod nonce;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolError, SolInterface, SolValue};
use keystone_wallet_types::{compose_nonce, UserOperation, ValidationData};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::errors::{Revert, ValidationError};
use crate::interfaces::IEntryPoint::{self, IEntryPointCalls};
use crate::ledger::{Contract, Ledger, Msg};
use crate::simulation::RuleViolation;

pub use nonce::NonceCheck;

/// Why an operation was rejected before execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    AccountNotDeployed,
    AlreadyDeployed,
    InvalidNonce,
    /// The validation module denied the operation.
    Denied,
    /// The signature payload could not be decoded.
    Malformed,
    /// The module returned a signature failure.
    SignatureFailed,
    OutOfTimeRange,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("FailedOp({op_index}, {reason})")]
pub struct FailedOp {
    pub op_index: usize,
    pub reason: String,
    pub kind: FailureKind,
}

impl FailedOp {
    fn new(op_index: usize, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            op_index,
            reason: reason.into(),
            kind,
        }
    }

    fn from_validation(op_index: usize, err: &ValidationError) -> Self {
        let kind = if err.is_malformed() {
            FailureKind::Malformed
        } else {
            FailureKind::Denied
        };
        Self::new(op_index, kind, format!("AA23 reverted: {err}"))
    }

    /// `FailedOp(uint256 opIndex, string reason)` revert data.
    pub fn revert_data(&self) -> Bytes {
        IEntryPoint::FailedOp {
            opIndex: U256::from(self.op_index),
            reason: self.reason.clone(),
        }
        .abi_encode()
        .into()
    }
}

/// Result of the validation phase for an accepted operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidatedOp {
    pub user_op_hash: B256,
    pub validation: ValidationData,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpOutcome {
    Executed {
        user_op_hash: B256,
        success: bool,
        revert_reason: Option<String>,
    },
    Rejected(FailedOp),
}

impl OpOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, OpOutcome::Executed { success: true, .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulationResult {
    pub outcome: Result<ValidatedOp, FailedOp>,
    pub violations: Vec<RuleViolation>,
}

#[derive(Clone, Copy, Debug)]
pub struct EntryPoint {
    address: Address,
}

impl EntryPoint {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn get_user_op_hash(&self, ledger: &Ledger, op: &UserOperation) -> B256 {
        op.hash(self.address, ledger.chain_id())
    }

    /// Full nonce (`key || sequence`) the next operation under `key` must use.
    pub fn get_nonce(&self, ledger: &Ledger, sender: Address, key: U256) -> U256 {
        compose_nonce(key, nonce::sequence(ledger, self.address, sender, key))
    }

    /// Process a bundle, one independent outcome per operation.
    pub fn handle_ops(&self, ledger: &mut Ledger, ops: &[UserOperation]) -> Vec<OpOutcome> {
        ops.iter()
            .enumerate()
            .map(|(index, op)| self.handle_op(ledger, index, op))
            .collect()
    }

    fn handle_op(&self, ledger: &mut Ledger, index: usize, op: &UserOperation) -> OpOutcome {
        let snapshot = ledger.snapshot();
        let validated = self
            .validate_op(ledger, index, op, NonceCheck::Exact)
            .and_then(|validated| self.check_window(ledger, index, validated));
        let validated = match validated {
            Ok(validated) => validated,
            Err(failed) => {
                ledger.restore(snapshot);
                warn!(sender = %op.sender, op_index = index, reason = %failed.reason, "operation rejected");
                return OpOutcome::Rejected(failed);
            }
        };

        let user_op_hash = validated.user_op_hash;
        if op.callData.is_empty() {
            return OpOutcome::Executed {
                user_op_hash,
                success: true,
                revert_reason: None,
            };
        }
        match ledger.call(Msg::new(self.address, op.sender, op.callData.clone())) {
            Ok(_) => {
                info!(sender = %op.sender, %user_op_hash, "operation executed");
                OpOutcome::Executed {
                    user_op_hash,
                    success: true,
                    revert_reason: None,
                }
            }
            Err(revert) => {
                warn!(sender = %op.sender, %user_op_hash, reason = %revert.reason(), "operation execution reverted");
                OpOutcome::Executed {
                    user_op_hash,
                    success: false,
                    revert_reason: Some(revert.reason()),
                }
            }
        }
    }

    /// Validation phase only, traced and rolled back.
    pub fn simulate_validation(&self, ledger: &mut Ledger, op: &UserOperation) -> SimulationResult {
        let snapshot = ledger.snapshot();
        ledger.start_validation_trace(op.sender);
        let outcome = self.validate_op(ledger, 0, op, NonceCheck::AtLeast);
        let violations = ledger.finish_validation_trace();
        ledger.restore(snapshot);
        SimulationResult {
            outcome,
            violations,
        }
    }

    fn validate_op(
        &self,
        ledger: &mut Ledger,
        index: usize,
        op: &UserOperation,
        check: NonceCheck,
    ) -> Result<ValidatedOp, FailedOp> {
        let user_op_hash = self.get_user_op_hash(ledger, op);
        let code = ledger
            .code(op.sender)
            .ok_or_else(|| FailedOp::new(index, FailureKind::AccountNotDeployed, "AA20 account not deployed"))?;
        let account = code
            .as_account()
            .ok_or_else(|| FailedOp::new(index, FailureKind::AccountNotDeployed, "AA20 account not deployed"))?;
        if !op.initCode.is_empty() {
            return Err(FailedOp::new(index, FailureKind::AlreadyDeployed, "AA10 sender already constructed"));
        }
        if !nonce::validate_and_update(ledger, self.address, op.sender, op.nonce_key(), op.nonce_sequence(), check) {
            return Err(FailedOp::new(index, FailureKind::InvalidNonce, "AA25 invalid account nonce"));
        }
        let validation = account
            .validate_user_op(ledger, op.sender, self.address, op, user_op_hash)
            .map_err(|err| FailedOp::from_validation(index, &err))?;
        if validation.sig_failed {
            return Err(FailedOp::new(index, FailureKind::SignatureFailed, "AA24 signature error"));
        }
        Ok(ValidatedOp {
            user_op_hash,
            validation,
        })
    }

    fn check_window(&self, ledger: &Ledger, index: usize, validated: ValidatedOp) -> Result<ValidatedOp, FailedOp> {
        if validated.validation.is_active_at(ledger.env().timestamp) {
            Ok(validated)
        } else {
            Err(FailedOp::new(index, FailureKind::OutOfTimeRange, "AA22 expired or not due"))
        }
    }
}

impl Contract for EntryPoint {
    fn call(&self, ledger: &mut Ledger, msg: &Msg) -> Result<Bytes, Revert> {
        let call = IEntryPointCalls::abi_decode(&msg.data, true)
            .map_err(|_| Revert::reason_string("entry point: unknown call"))?;
        match call {
            IEntryPointCalls::getNonce(get) => {
                let key = U256::from_be_slice(&get.key.to_be_bytes::<24>());
                Ok(self.get_nonce(ledger, get.sender, key).abi_encode().into())
            }
        }
    }
}
