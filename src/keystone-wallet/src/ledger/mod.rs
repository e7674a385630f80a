//! In-memory ledger: deployed contracts, their storage and native balances.
//!
//! Contracts are immutable code (`Arc<dyn Contract>`); all mutable state lives in the ledger's
//! storage map. A call takes a snapshot first and restores it when the callee reverts, which
//! gives every frame the all-or-nothing semantics of the EVM.

pub mod storage;

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolValue;
use tracing::trace;

use crate::account::SmartAccount;
use crate::constants::MAX_CALL_DEPTH;
use crate::errors::Revert;
use crate::modules::ValidationModule;
use crate::session::validators::SessionValidator;
use crate::session::SessionKeyManager;
use crate::simulation::{Opcode, ValidationTracer};

pub use storage::{mapping_slot, slot, SlotKey};
use storage::State;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockEnv {
    pub number: u64,
    pub timestamp: u64,
    pub chain_id: u64,
}

/// A message call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Msg {
    pub sender: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl Msg {
    pub fn new(sender: Address, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            sender,
            to,
            value: U256::ZERO,
            data: data.into(),
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Code deployed at an address.
///
/// `call` is the external ABI surface. The `as_*` accessors expose the typed interfaces the
/// validation pipeline needs without going through ABI encoding.
pub trait Contract: Send + Sync {
    fn call(&self, ledger: &mut Ledger, msg: &Msg) -> Result<Bytes, Revert>;

    fn as_account(&self) -> Option<&SmartAccount> {
        None
    }

    fn as_validation_module(&self) -> Option<&dyn ValidationModule> {
        None
    }

    fn as_session_validator(&self) -> Option<&dyn SessionValidator> {
        None
    }

    fn as_session_key_manager(&self) -> Option<&dyn SessionKeyManager> {
        None
    }
}

/// Saved ledger state, restored with [`Ledger::restore`].
#[derive(Debug)]
pub struct Snapshot(State);

pub struct Ledger {
    block: BlockEnv,
    code: HashMap<Address, Arc<dyn Contract>>,
    state: State,
    depth: usize,
    tracer: RefCell<Option<ValidationTracer>>,
}

impl Ledger {
    pub fn new(chain_id: u64, timestamp: u64) -> Self {
        Self {
            block: BlockEnv {
                number: 1,
                timestamp,
                chain_id,
            },
            code: HashMap::new(),
            state: State::default(),
            depth: 0,
            tracer: RefCell::new(None),
        }
    }

    /// Install code at `address`. Fails if code is already there.
    pub fn deploy(&mut self, address: Address, contract: Arc<dyn Contract>) -> Result<(), Revert> {
        if self.code.contains_key(&address) {
            return Err(Revert::reason_string(format!("code already deployed at {address}")));
        }
        trace!(%address, "deploy");
        self.code.insert(address, contract);
        Ok(())
    }

    pub fn code(&self, address: Address) -> Option<Arc<dyn Contract>> {
        self.code.get(&address).cloned()
    }

    pub fn has_code(&self, address: Address) -> bool {
        self.code.contains_key(&address)
    }

    /// Block environment, read without tracing. For the entry point and the bundler.
    pub fn env(&self) -> BlockEnv {
        self.block
    }

    pub fn chain_id(&self) -> u64 {
        self.block.chain_id
    }

    /// `TIMESTAMP`. Banned inside traced validation.
    pub fn timestamp(&self) -> u64 {
        self.trace(|t| t.on_opcode(Opcode::Timestamp));
        self.block.timestamp
    }

    /// `NUMBER`. Banned inside traced validation.
    pub fn block_number(&self) -> u64 {
        self.trace(|t| t.on_opcode(Opcode::Number));
        self.block.number
    }

    /// Move ledger time forward, mining one block.
    pub fn advance_time(&mut self, seconds: u64) {
        self.set_timestamp(self.block.timestamp.saturating_add(seconds));
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.block.timestamp = timestamp;
        self.block.number += 1;
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.state.balances.get(&address).copied().unwrap_or_default()
    }

    pub fn set_balance(&mut self, address: Address, amount: U256) {
        self.state.balances.insert(address, amount);
    }

    pub fn sload<T: SolValue>(&self, key: SlotKey) -> Option<T>
    where
        T: From<<T::SolType as alloy_sol_types::SolType>::RustType>,
    {
        self.trace(|t| t.on_storage(key));
        let raw = self.state.storage.get(&key)?;
        T::abi_decode(raw, false).ok()
    }

    pub fn sstore<T: SolValue>(&mut self, key: SlotKey, value: &T) {
        self.trace(|t| t.on_storage(key));
        self.state.storage.insert(key, value.abi_encode().into());
    }

    pub fn sdelete(&mut self, key: SlotKey) {
        self.trace(|t| t.on_storage(key));
        self.state.storage.remove(&key);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.state.clone())
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.state = snapshot.0;
    }

    /// Message call. Reverts roll back everything the callee did, including the value transfer.
    ///
    /// A call to an address without code succeeds with empty return data.
    pub fn call(&mut self, msg: Msg) -> Result<Bytes, Revert> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Revert::reason_string("call depth exceeded"));
        }
        let snapshot = self.snapshot();
        let result = self.enter(&msg);
        if let Err(revert) = &result {
            trace!(to = %msg.to, reason = %revert.reason(), "call reverted");
            self.restore(snapshot);
        }
        result
    }

    fn enter(&mut self, msg: &Msg) -> Result<Bytes, Revert> {
        self.transfer(msg.sender, msg.to, msg.value)?;
        let Some(code) = self.code(msg.to) else {
            return Ok(Bytes::new());
        };
        self.depth += 1;
        let result = code.call(self, msg);
        self.depth -= 1;
        result
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), Revert> {
        if value.is_zero() {
            return Ok(());
        }
        let from_balance = self.balance(from);
        if from_balance < value {
            return Err(Revert::reason_string("insufficient balance"));
        }
        self.set_balance(from, from_balance - value);
        let to_balance = self.balance(to);
        self.set_balance(to, to_balance + value);
        Ok(())
    }

    /// Start recording validation-rule violations for an operation from `sender`.
    pub fn start_validation_trace(&self, sender: Address) {
        *self.tracer.borrow_mut() = Some(ValidationTracer::new(sender));
    }

    /// Stop recording and return what was seen.
    pub fn finish_validation_trace(&self) -> Vec<crate::simulation::RuleViolation> {
        self.tracer
            .borrow_mut()
            .take()
            .map(ValidationTracer::finish)
            .unwrap_or_default()
    }

    fn trace(&self, f: impl FnOnce(&mut ValidationTracer)) {
        if let Some(tracer) = self.tracer.borrow_mut().as_mut() {
            f(tracer);
        }
    }
}
