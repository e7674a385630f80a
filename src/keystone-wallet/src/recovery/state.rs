//! Per-account recovery storage: settings, guardians and the pending request.

use alloy_primitives::aliases::U48;
use alloy_primitives::{Address, B256};

use crate::interfaces::{RecoveryRequest, RecoverySettings, TimeFrame};
use crate::ledger::{mapping_slot, slot, Ledger, SlotKey};

const SETTINGS: &str = "recovery.settings";
const GUARDIAN: &str = "recovery.guardian";
const REQUEST: &str = "recovery.request";

/// Stored recovery request, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryState {
    Empty,
    Pending { call_data_hash: B256, execute_after: u64 },
}

impl RecoveryState {
    pub fn is_pending(&self) -> bool {
        matches!(self, RecoveryState::Pending { .. })
    }
}

impl From<RecoveryState> for RecoveryRequest {
    fn from(state: RecoveryState) -> Self {
        match state {
            RecoveryState::Empty => RecoveryRequest {
                callDataHash: B256::ZERO,
                executeAfter: U48::ZERO,
            },
            RecoveryState::Pending {
                call_data_hash,
                execute_after,
            } => RecoveryRequest {
                callDataHash: call_data_hash,
                executeAfter: U48::from(execute_after),
            },
        }
    }
}

/// Typed access to one module instance's storage for one account.
pub(crate) struct RecoveryStore {
    this: Address,
    account: Address,
}

impl RecoveryStore {
    pub fn new(this: Address, account: Address) -> Self {
        Self { this, account }
    }

    fn key(&self, slot: B256) -> SlotKey {
        SlotKey::new(self.this, self.account, slot)
    }

    pub fn settings(&self, ledger: &Ledger) -> Option<RecoverySettings> {
        ledger.sload(self.key(slot(SETTINGS)))
    }

    pub fn set_settings(&self, ledger: &mut Ledger, settings: &RecoverySettings) {
        ledger.sstore(self.key(slot(SETTINGS)), settings);
    }

    pub fn guardian(&self, ledger: &Ledger, id: B256) -> Option<TimeFrame> {
        ledger.sload(self.key(mapping_slot(GUARDIAN, id)))
    }

    pub fn set_guardian(&self, ledger: &mut Ledger, id: B256, frame: &TimeFrame) {
        ledger.sstore(self.key(mapping_slot(GUARDIAN, id)), frame);
    }

    pub fn remove_guardian(&self, ledger: &mut Ledger, id: B256) {
        ledger.sdelete(self.key(mapping_slot(GUARDIAN, id)));
    }

    pub fn request(&self, ledger: &Ledger) -> RecoveryState {
        match ledger.sload::<RecoveryRequest>(self.key(slot(REQUEST))) {
            Some(request) => RecoveryState::Pending {
                call_data_hash: request.callDataHash,
                execute_after: request.executeAfter.to::<u64>(),
            },
            None => RecoveryState::Empty,
        }
    }

    pub fn set_request(&self, ledger: &mut Ledger, call_data_hash: B256, execute_after: u64) {
        let request = RecoveryRequest {
            callDataHash: call_data_hash,
            executeAfter: U48::from(execute_after),
        };
        ledger.sstore(self.key(slot(REQUEST)), &request);
    }

    pub fn clear_request(&self, ledger: &mut Ledger) {
        ledger.sdelete(self.key(slot(REQUEST)));
    }
}
