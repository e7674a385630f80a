//! Guardian-based account recovery with a security delay.
//!
//! Three validation paths, chosen by the operation's calldata:
//! 1. `keccak256(callData)` equals the pending request: the request is consumed and the
//!    operation becomes valid at `executeAfter`.
//! 2. `execute(thisModule, 0, submitRecoveryRequest(bytes))`: guardians approve. The payload is a
//!    [`GuardianApproval`]; every control signature must come from a distinct guardian, at least
//!    `threshold` of them, and the first of them must also have signed the operation.
//! 3. Anything else: the payload is an inner envelope for another enabled module.
//!
//! Executing the submission stores the request for `now + securityDelay` and spends one of the
//! account's allowed recoveries.

pub mod state;

use std::collections::HashSet;

use alloy_primitives::aliases::U48;
use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::{SolCall, SolInterface, SolValue};
use keystone_wallet_types::{
    control_message_hash, guardian_id, GuardianApproval, UserOperation, ValidationData, MAX_UINT48,
};
use tracing::{debug, info, warn};

use crate::constants::MAX_GUARDIANS;
use crate::errors::{DecodeError, Revert, ValidationError};
use crate::interfaces::IAccountRecoveryModule::{self, IAccountRecoveryModuleCalls};
use crate::interfaces::{RecoveryRequest, RecoverySettings, TimeFrame};
use crate::ledger::{Contract, Ledger, Msg};
use crate::modules::{self, ValidationModule};
use crate::utils::calldata::decode_execute;
use crate::utils::crypto::{recover_eth_signed, signature_bytes};

pub use state::RecoveryState;
use state::RecoveryStore;

#[derive(Clone, Copy, Debug, Default)]
pub struct AccountRecoveryModule;

impl AccountRecoveryModule {
    pub fn settings(ledger: &Ledger, this: Address, account: Address) -> Option<RecoverySettings> {
        RecoveryStore::new(this, account).settings(ledger)
    }

    pub fn guardian(ledger: &Ledger, this: Address, account: Address, guardian: B256) -> Option<TimeFrame> {
        RecoveryStore::new(this, account).guardian(ledger, guardian)
    }

    pub fn recovery_state(ledger: &Ledger, this: Address, account: Address) -> RecoveryState {
        RecoveryStore::new(this, account).request(ledger)
    }

    /// True for `execute(this, 0, submitRecoveryRequest(..))`.
    fn is_submission(this: Address, call_data: &[u8]) -> bool {
        let Ok(call) = decode_execute(call_data) else {
            return false;
        };
        call.destination == this
            && call.value.is_zero()
            && IAccountRecoveryModule::submitRecoveryRequestCall::abi_decode(&call.data, true).is_ok()
    }

    fn validate_guardians(
        ledger: &Ledger,
        this: Address,
        account: Address,
        op_hash: B256,
        signature: &[u8],
    ) -> Result<ValidationData, ValidationError> {
        let store = RecoveryStore::new(this, account);
        let settings = store.settings(ledger).ok_or(ValidationError::NotInitialized)?;
        if settings.recoveriesLeft == 0 {
            return Err(ValidationError::NoRecoveriesLeft);
        }
        let approval = GuardianApproval::abi_decode_params(signature, true).map_err(DecodeError::from)?;
        let threshold = settings.recoveryThreshold as usize;
        if approval.controlSignatures.len() < threshold {
            return Err(ValidationError::InsufficientGuardians {
                valid: approval.controlSignatures.len(),
                threshold,
            });
        }

        let control_hash = control_message_hash(account);
        let mut seen = HashSet::new();
        let mut first_guardian = None;
        let mut window = ValidationData::SUCCESS;
        for control in &approval.controlSignatures {
            let guardian = recover_eth_signed(control_hash, signature_bytes(control)?)
                .ok_or(ValidationError::InvalidGuardianSignature)?;
            let id = guardian_id(guardian);
            if !seen.insert(id) {
                return Err(ValidationError::DuplicateGuardian(guardian));
            }
            let frame = store
                .guardian(ledger, id)
                .ok_or(ValidationError::NotAGuardian(guardian))?;
            let frame = ValidationData::window(frame.validUntil.to::<u64>(), frame.validAfter.to::<u64>());
            window = window.intersect(frame);
            first_guardian.get_or_insert(guardian);
        }
        if seen.len() < threshold {
            return Err(ValidationError::InsufficientGuardians {
                valid: seen.len(),
                threshold,
            });
        }

        let op_signer = recover_eth_signed(op_hash, signature_bytes(&approval.userOpSignature)?);
        if op_signer.is_none() || op_signer != first_guardian {
            debug!(%account, ?op_signer, ?first_guardian, "operation not signed by first guardian");
            return Ok(ValidationData::failed());
        }
        info!(%account, guardians = seen.len(), "recovery submission approved");
        Ok(window)
    }

    fn initialized(ledger: &Ledger, store: &RecoveryStore, account: Address) -> Result<RecoverySettings, Revert> {
        store.settings(ledger).ok_or_else(|| {
            Revert::custom(IAccountRecoveryModule::NotInitializedForSmartAccount {
                smartAccount: account,
            })
        })
    }

    fn check_frame(valid_until: U48, valid_after: U48) -> Result<TimeFrame, Revert> {
        if !valid_until.is_zero() && valid_until <= valid_after {
            return Err(Revert::custom(IAccountRecoveryModule::InvalidTimeFrame {
                validUntil: valid_until,
                validAfter: valid_after,
            }));
        }
        Ok(TimeFrame {
            validUntil: valid_until,
            validAfter: valid_after,
        })
    }

    fn check_new_guardian(ledger: &Ledger, store: &RecoveryStore, id: B256) -> Result<(), Revert> {
        if id.is_zero() {
            return Err(Revert::custom(IAccountRecoveryModule::ZeroGuardian {}));
        }
        if store.guardian(ledger, id).is_some() {
            return Err(Revert::custom(IAccountRecoveryModule::GuardianAlreadySet { guardian: id }));
        }
        Ok(())
    }

    fn check_existing_guardian(ledger: &Ledger, store: &RecoveryStore, id: B256) -> Result<(), Revert> {
        if store.guardian(ledger, id).is_none() {
            return Err(Revert::custom(IAccountRecoveryModule::GuardianNotSet { guardian: id }));
        }
        Ok(())
    }

    fn check_threshold(threshold: u8, guardians: u8) -> Result<(), Revert> {
        if threshold == 0 {
            return Err(Revert::custom(IAccountRecoveryModule::ZeroThreshold {}));
        }
        if threshold > guardians {
            return Err(Revert::custom(IAccountRecoveryModule::ThresholdTooHigh {
                threshold,
                guardiansCount: guardians,
            }));
        }
        Ok(())
    }

    /// Any change to who can recover invalidates an in-flight request.
    fn clear_pending(ledger: &mut Ledger, store: &RecoveryStore, account: Address) {
        if store.request(ledger).is_pending() {
            warn!(%account, "guardian configuration changed, pending recovery cleared");
            store.clear_request(ledger);
        }
    }

    fn init(
        ledger: &mut Ledger,
        store: &RecoveryStore,
        account: Address,
        init: IAccountRecoveryModule::initForSmartAccountCall,
    ) -> Result<(), Revert> {
        if store.settings(ledger).is_some() {
            return Err(Revert::custom(IAccountRecoveryModule::AlreadyInitedForSmartAccount {
                smartAccount: account,
            }));
        }
        if init.guardians.len() != init.timeFrames.len() {
            return Err(Revert::custom(IAccountRecoveryModule::InvalidAmountOfGuardianParams {}));
        }
        if init.guardians.len() > MAX_GUARDIANS {
            return Err(Revert::custom(IAccountRecoveryModule::TooManyGuardians {}));
        }
        let count = init.guardians.len() as u8;
        Self::check_threshold(init.recoveryThreshold, count)?;
        for (id, frame) in init.guardians.iter().zip(&init.timeFrames) {
            Self::check_new_guardian(ledger, store, *id)?;
            let frame = Self::check_frame(frame.validUntil, frame.validAfter)?;
            store.set_guardian(ledger, *id, &frame);
        }
        store.set_settings(
            ledger,
            &RecoverySettings {
                guardiansCount: count,
                recoveryThreshold: init.recoveryThreshold,
                securityDelay: init.securityDelay,
                recoveriesLeft: init.recoveriesAllowed,
            },
        );
        info!(%account, guardians = count, threshold = init.recoveryThreshold, "recovery initialized");
        Ok(())
    }

    fn submit(ledger: &mut Ledger, store: &RecoveryStore, account: Address, call_data: &Bytes) -> Result<(), Revert> {
        let mut settings = Self::initialized(ledger, store, account)?;
        if settings.recoveriesLeft == 0 {
            return Err(Revert::custom(IAccountRecoveryModule::NoRecoveriesLeft {}));
        }
        if call_data.is_empty() {
            return Err(Revert::custom(IAccountRecoveryModule::EmptyRecoveryCallData {}));
        }
        let execute_after = ledger
            .timestamp()
            .saturating_add(settings.securityDelay.to::<u64>())
            .min(MAX_UINT48);
        store.set_request(ledger, keccak256(call_data), execute_after);
        settings.recoveriesLeft -= 1;
        store.set_settings(ledger, &settings);
        info!(%account, execute_after, recoveries_left = settings.recoveriesLeft, "recovery request submitted");
        Ok(())
    }
}

impl Contract for AccountRecoveryModule {
    fn call(&self, ledger: &mut Ledger, msg: &Msg) -> Result<Bytes, Revert> {
        use IAccountRecoveryModuleCalls as Calls;

        let call = Calls::abi_decode(&msg.data, true)
            .map_err(|_| Revert::reason_string("recovery: unknown call"))?;
        let this = msg.to;
        let account = msg.sender;
        let store = RecoveryStore::new(this, account);
        match call {
            Calls::initForSmartAccount(init) => {
                Self::init(ledger, &store, account, init)?;
                return Ok(this.abi_encode().into());
            }
            Calls::submitRecoveryRequest(submit) => {
                Self::submit(ledger, &store, account, &submit.recoveryCallData)?;
            }
            Calls::addGuardian(add) => {
                let mut settings = Self::initialized(ledger, &store, account)?;
                if settings.guardiansCount as usize >= MAX_GUARDIANS {
                    return Err(Revert::custom(IAccountRecoveryModule::TooManyGuardians {}));
                }
                Self::check_new_guardian(ledger, &store, add.guardian)?;
                let frame = Self::check_frame(add.validUntil, add.validAfter)?;
                store.set_guardian(ledger, add.guardian, &frame);
                settings.guardiansCount += 1;
                store.set_settings(ledger, &settings);
                Self::clear_pending(ledger, &store, account);
                info!(%account, guardian = %add.guardian, "guardian added");
            }
            Calls::removeGuardian(remove) => {
                let mut settings = Self::initialized(ledger, &store, account)?;
                Self::check_existing_guardian(ledger, &store, remove.guardian)?;
                Self::check_threshold(settings.recoveryThreshold, settings.guardiansCount - 1)?;
                store.remove_guardian(ledger, remove.guardian);
                settings.guardiansCount -= 1;
                store.set_settings(ledger, &settings);
                Self::clear_pending(ledger, &store, account);
                info!(%account, guardian = %remove.guardian, "guardian removed");
            }
            Calls::replaceGuardian(replace) => {
                Self::initialized(ledger, &store, account)?;
                Self::check_existing_guardian(ledger, &store, replace.guardian)?;
                Self::check_new_guardian(ledger, &store, replace.newGuardian)?;
                let frame = Self::check_frame(replace.validUntil, replace.validAfter)?;
                store.remove_guardian(ledger, replace.guardian);
                store.set_guardian(ledger, replace.newGuardian, &frame);
                Self::clear_pending(ledger, &store, account);
                info!(%account, old = %replace.guardian, new = %replace.newGuardian, "guardian replaced");
            }
            Calls::changeGuardianParams(change) => {
                Self::initialized(ledger, &store, account)?;
                Self::check_existing_guardian(ledger, &store, change.guardian)?;
                let frame = Self::check_frame(change.validUntil, change.validAfter)?;
                store.set_guardian(ledger, change.guardian, &frame);
                Self::clear_pending(ledger, &store, account);
            }
            Calls::setThreshold(set) => {
                let mut settings = Self::initialized(ledger, &store, account)?;
                Self::check_threshold(set.newThreshold, settings.guardiansCount)?;
                settings.recoveryThreshold = set.newThreshold;
                store.set_settings(ledger, &settings);
                Self::clear_pending(ledger, &store, account);
            }
            Calls::setSecurityDelay(set) => {
                let mut settings = Self::initialized(ledger, &store, account)?;
                settings.securityDelay = set.newSecurityDelay;
                store.set_settings(ledger, &settings);
            }
            Calls::setAllowedRecoveries(set) => {
                let mut settings = Self::initialized(ledger, &store, account)?;
                settings.recoveriesLeft = set.allowedRecoveries;
                store.set_settings(ledger, &settings);
            }
            Calls::getGuardianParams(get) => {
                let frame = Self::guardian(ledger, this, get.smartAccount, get.guardian).unwrap_or(TimeFrame {
                    validUntil: U48::ZERO,
                    validAfter: U48::ZERO,
                });
                return Ok(frame.abi_encode().into());
            }
            Calls::getSmartAccountSettings(get) => {
                let target = RecoveryStore::new(this, get.smartAccount);
                let settings = Self::initialized(ledger, &target, get.smartAccount)?;
                return Ok(settings.abi_encode().into());
            }
            Calls::getRecoveryRequest(get) => {
                let request: RecoveryRequest = Self::recovery_state(ledger, this, get.smartAccount).into();
                return Ok(request.abi_encode().into());
            }
        }
        Ok(Bytes::new())
    }

    fn as_validation_module(&self) -> Option<&dyn ValidationModule> {
        Some(self)
    }
}

impl ValidationModule for AccountRecoveryModule {
    fn validate_user_op(
        &self,
        ledger: &mut Ledger,
        this: Address,
        op: &UserOperation,
        op_hash: B256,
        signature: &[u8],
    ) -> Result<ValidationData, ValidationError> {
        let account = op.sender;
        let store = RecoveryStore::new(this, account);
        if let RecoveryState::Pending {
            call_data_hash,
            execute_after,
        } = store.request(ledger)
        {
            if keccak256(&op.callData) == call_data_hash {
                store.clear_request(ledger);
                info!(%account, execute_after, "executing pending recovery");
                return Ok(ValidationData::window(0, execute_after));
            }
        }

        if Self::is_submission(this, &op.callData) {
            return Self::validate_guardians(ledger, this, account, op_hash, signature);
        }

        let envelope = modules::decode_envelope(signature)?;
        if envelope.handler == this {
            return Err(ValidationError::SelfDelegation(this));
        }
        modules::forward(ledger, account, op, op_hash, &envelope)
    }

    fn is_valid_signature_for(
        &self,
        ledger: &mut Ledger,
        this: Address,
        account: Address,
        hash: B256,
        signature: &[u8],
    ) -> bool {
        match modules::decode_envelope(signature) {
            Ok(envelope) if envelope.handler != this => {
                modules::is_valid_signature_with(ledger, account, hash, &envelope)
            }
            _ => false,
        }
    }
}
