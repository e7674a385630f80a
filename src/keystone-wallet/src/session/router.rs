//! Batched session router: one session per call of an `executeBatch`, one session key signature.
//!
//! Each positional session is approved by the session key manager named in the payload and judged
//! by its own sub-validator. Every sub-validator must name the same session key, and the returned
//! window is the intersection of every session's window.

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::SolValue;
use keystone_wallet_types::{BatchedSessionUse, UserOperation, ValidationData};
use tracing::debug;

use crate::account::SmartAccount;
use crate::errors::{DecodeError, Revert, ValidationError};
use crate::ledger::{Contract, Ledger, Msg};
use crate::modules::ValidationModule;
use crate::session::{authorize, log_if_unbounded, session_key_for};
use crate::utils::calldata::decode_execute_batch;

#[derive(Clone, Copy, Debug, Default)]
pub struct BatchedSessionRouter;

impl Contract for BatchedSessionRouter {
    fn call(&self, _ledger: &mut Ledger, _msg: &Msg) -> Result<Bytes, Revert> {
        Err(Revert::reason_string("session router has no external calls"))
    }

    fn as_validation_module(&self) -> Option<&dyn ValidationModule> {
        Some(self)
    }
}

impl ValidationModule for BatchedSessionRouter {
    fn validate_user_op(
        &self,
        ledger: &mut Ledger,
        _this: Address,
        op: &UserOperation,
        op_hash: B256,
        signature: &[u8],
    ) -> Result<ValidationData, ValidationError> {
        let payload = BatchedSessionUse::abi_decode_params(signature, true).map_err(DecodeError::from)?;
        let account = op.sender;
        let manager_address = payload.sessionKeyManager;
        if !SmartAccount::is_module_enabled(ledger, account, manager_address) {
            return Err(ValidationError::ModuleNotEnabled(manager_address));
        }
        let code = ledger
            .code(manager_address)
            .ok_or(ValidationError::NotASessionKeyManager(manager_address))?;
        let manager = code
            .as_session_key_manager()
            .ok_or(ValidationError::NotASessionKeyManager(manager_address))?;

        let calls = decode_execute_batch(&op.callData)?;
        if calls.is_empty() || calls.len() != payload.sessions.len() {
            return Err(ValidationError::BatchLengthMismatch {
                calls: calls.len(),
                sessions: payload.sessions.len(),
            });
        }

        let mut session_key: Option<Address> = None;
        let mut window = ValidationData::SUCCESS;
        for (index, (call, session)) in calls.iter().zip(&payload.sessions).enumerate() {
            let leaf = session.leaf();
            manager.validate_session_key(ledger, manager_address, account, &leaf, &session.proof)?;
            log_if_unbounded(&leaf);
            let key = session_key_for(ledger, &leaf, call, &session.callSpecificData)?;
            match session_key {
                None => session_key = Some(key),
                Some(expected) if expected != key => {
                    debug!(index, %expected, found = %key, "session key differs within batch");
                    return Err(ValidationError::InconsistentSessionKeys);
                }
                Some(_) => {}
            }
            window = window.intersect(leaf.validation_data());
        }

        let session_key = session_key.ok_or(ValidationError::BatchLengthMismatch {
            calls: 0,
            sessions: 0,
        })?;
        authorize(op_hash, &payload.sessionKeySignature, session_key, window)
    }
}
