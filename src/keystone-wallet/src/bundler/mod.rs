//! Bundler front end: admission checks, an ordered mempool, and bundle submission.
//!
//! Admission simulates validation against the current ledger with the access rules traced. An
//! accepted operation waits in the mempool ordered by `(sender, nonce key, sequence)`, which is
//! also the order it is bundled in.

pub mod config;
pub mod rpc;

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use keystone_wallet_types::UserOperation;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::entrypoint::{nonce, EntryPoint, FailureKind, OpOutcome};
use crate::ledger::Ledger;

pub use config::BundlerConfig;
pub use rpc::{MempoolEntry, RpcError, RpcErrorCode, SubmitReceipt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct MempoolKey {
    sender: Address,
    nonce_key: U256,
    sequence: u64,
}

impl MempoolKey {
    fn of(op: &UserOperation) -> Self {
        Self {
            sender: op.sender,
            nonce_key: op.nonce_key(),
            sequence: op.nonce_sequence(),
        }
    }
}

pub struct Bundler {
    config: BundlerConfig,
    entry_point: EntryPoint,
    mempool: BTreeMap<MempoolKey, MempoolEntry>,
}

impl Bundler {
    pub fn new(mut config: BundlerConfig, entry_point: EntryPoint) -> Self {
        if config.entry_points.is_empty() {
            config.entry_points.push(entry_point.address());
        }
        Self {
            config,
            entry_point,
            mempool: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &BundlerConfig {
        &self.config
    }

    pub fn supported_entry_points(&self) -> &[Address] {
        &self.config.entry_points
    }

    /// `eth_sendUserOperation`.
    pub fn submit_operation(
        &mut self,
        ledger: &mut Ledger,
        op: UserOperation,
        entry_point: Address,
    ) -> Result<SubmitReceipt, RpcError> {
        if entry_point != self.entry_point.address() || !self.config.entry_points.contains(&entry_point) {
            return Err(RpcError::new(
                RpcErrorCode::InvalidParams,
                format!("unsupported entry point {entry_point}"),
            ));
        }
        self.check_nonce(ledger, &op)?;

        let simulation = self.entry_point.simulate_validation(ledger, &op);
        if self.config.enforce_validation_rules && !simulation.violations.is_empty() {
            let message = simulation
                .violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            warn!(sender = %op.sender, %message, "operation breaks validation rules");
            return Err(RpcError::new(RpcErrorCode::BannedOpcodeOrStorage, message)
                .with_data(json!({ "violations": simulation.violations })));
        }

        let validated = simulation.outcome.map_err(|failed| {
            let code = match failed.kind {
                FailureKind::SignatureFailed => RpcErrorCode::InvalidSignature,
                FailureKind::InvalidNonce => RpcErrorCode::InvalidParams,
                _ => RpcErrorCode::RejectedByValidation,
            };
            debug!(sender = %op.sender, reason = %failed.reason, "operation failed simulation");
            RpcError::new(code, failed.reason)
        })?;

        let now = ledger.env().timestamp;
        let window = validated.validation;
        if !window.is_active_at(now) {
            return Err(RpcError::new(RpcErrorCode::OutOfTimeRange, "operation is expired or not due")
                .with_data(json!({ "validUntil": window.valid_until, "validAfter": window.valid_after })));
        }
        if window.expires_before(now.saturating_add(self.config.validity_margin_secs)) {
            return Err(RpcError::new(RpcErrorCode::OutOfTimeRange, "operation expires too soon")
                .with_data(json!({ "validUntil": window.valid_until, "validAfter": window.valid_after })));
        }

        let user_op_hash = validated.user_op_hash;
        info!(sender = %op.sender, %user_op_hash, "operation accepted");
        self.mempool.insert(
            MempoolKey::of(&op),
            MempoolEntry {
                user_op_hash,
                user_operation: op,
            },
        );
        Ok(SubmitReceipt { user_op_hash })
    }

    /// Stale, duplicate, gapped and over-quota nonces are refused before simulation.
    fn check_nonce(&self, ledger: &Ledger, op: &UserOperation) -> Result<(), RpcError> {
        let key = MempoolKey::of(op);
        let on_ledger = nonce::sequence(ledger, self.entry_point.address(), op.sender, key.nonce_key);
        if key.sequence < on_ledger {
            return Err(RpcError::new(RpcErrorCode::InvalidParams, "AA25 invalid account nonce"));
        }
        if self.mempool.contains_key(&key) {
            return Err(RpcError::new(
                RpcErrorCode::InvalidParams,
                "operation with this nonce already in mempool",
            ));
        }
        let queued = (on_ledger..key.sequence).all(|sequence| {
            self.mempool
                .contains_key(&MempoolKey { sequence, ..key })
        });
        if !queued {
            return Err(RpcError::new(RpcErrorCode::InvalidParams, "nonce gap in mempool"));
        }
        let from_sender = self
            .mempool
            .keys()
            .filter(|k| k.sender == op.sender)
            .count();
        if from_sender >= self.config.max_ops_per_sender {
            return Err(RpcError::new(
                RpcErrorCode::InvalidParams,
                "too many pending operations for sender",
            ));
        }
        Ok(())
    }

    /// Bundle everything in the mempool, in order, and clear it.
    pub fn send_bundle_now(&mut self, ledger: &mut Ledger) -> Vec<OpOutcome> {
        let ops: Vec<UserOperation> = std::mem::take(&mut self.mempool)
            .into_values()
            .map(|entry| entry.user_operation)
            .collect();
        if ops.is_empty() {
            return Vec::new();
        }
        let outcomes = self.entry_point.handle_ops(ledger, &ops);
        let executed = outcomes.iter().filter(|o| o.is_success()).count();
        info!(ops = ops.len(), executed, "bundle sent");
        outcomes
    }

    /// `debug_bundler_clearState`.
    pub fn debug_clear_state(&mut self) {
        self.mempool.clear();
    }

    /// `debug_bundler_dumpMempool`.
    pub fn debug_dump_mempool(&self) -> Vec<MempoolEntry> {
        self.mempool.values().cloned().collect()
    }
}
