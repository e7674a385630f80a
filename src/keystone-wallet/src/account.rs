//! The smart account: module registry, execution, EIP-1271 and operation validation.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolInterface, SolValue};
use keystone_wallet_types::{UserOperation, ValidationData};
use tracing::{debug, info};

use crate::constants::{EIP1271_INVALID, EIP1271_MAGIC_VALUE};
use crate::errors::{Revert, ValidationError};
use crate::interfaces::ISmartAccount::{self, ISmartAccountCalls};
use crate::ledger::{mapping_slot, Contract, Ledger, Msg, SlotKey};
use crate::modules;
use crate::utils::calldata::{batch_calls, Call};

const MODULES: &str = "account.modules";

#[derive(Clone, Copy, Debug)]
pub struct SmartAccount {
    entry_point: Address,
}

impl SmartAccount {
    pub fn new(entry_point: Address) -> Self {
        Self { entry_point }
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    /// Deploy an account at `address` and set up its first validation module.
    ///
    /// `setup_data` is sent to `module` with the new account as sender, typically the module's
    /// `initForSmartAccount` call.
    pub fn deploy(
        ledger: &mut Ledger,
        address: Address,
        entry_point: Address,
        module: Address,
        setup_data: impl Into<Bytes>,
    ) -> Result<(), Revert> {
        let snapshot = ledger.snapshot();
        let result = ledger
            .call(Msg::new(address, module, setup_data))
            .and_then(|_| ledger.deploy(address, Arc::new(Self::new(entry_point))));
        match result {
            Ok(()) => {
                Self::set_module(ledger, address, module, true);
                info!(account = %address, %module, "account deployed");
                Ok(())
            }
            Err(revert) => {
                ledger.restore(snapshot);
                Err(revert)
            }
        }
    }

    fn module_key(account: Address, module: Address) -> SlotKey {
        SlotKey::new(account, account, mapping_slot(MODULES, module))
    }

    pub fn is_module_enabled(ledger: &Ledger, account: Address, module: Address) -> bool {
        ledger
            .sload::<bool>(Self::module_key(account, module))
            .unwrap_or(false)
    }

    fn set_module(ledger: &mut Ledger, account: Address, module: Address, enabled: bool) {
        let key = Self::module_key(account, module);
        if enabled {
            ledger.sstore(key, &true);
        } else {
            ledger.sdelete(key);
        }
    }

    /// Entry-point only. Unwraps the outer envelope and asks the named module.
    pub fn validate_user_op(
        &self,
        ledger: &mut Ledger,
        this: Address,
        caller: Address,
        op: &UserOperation,
        op_hash: B256,
    ) -> Result<ValidationData, ValidationError> {
        if caller != self.entry_point {
            return Err(ValidationError::CallerNotEntryPoint(caller));
        }
        modules::validate_envelope(ledger, this, op, op_hash, &op.signature)
    }

    fn only_entry_point_or_self(&self, this: Address, caller: Address) -> Result<(), Revert> {
        if caller == self.entry_point || caller == this {
            Ok(())
        } else {
            Err(Revert::custom(ISmartAccount::CallerIsNotEntryPointOrSelf { caller }))
        }
    }

    fn only_self(this: Address, caller: Address) -> Result<(), Revert> {
        if caller == this {
            Ok(())
        } else {
            Err(Revert::custom(ISmartAccount::CallerIsNotSelf { caller }))
        }
    }

    fn execute(ledger: &mut Ledger, this: Address, call: Call) -> Result<Bytes, Revert> {
        debug!(account = %this, to = %call.destination, value = %call.value, "execute");
        ledger.call(Msg::new(this, call.destination, call.data).with_value(call.value))
    }

    fn enable_module(ledger: &mut Ledger, this: Address, module: Address) -> Result<(), Revert> {
        if module.is_zero() {
            return Err(Revert::custom(ISmartAccount::InvalidModule { module }));
        }
        if Self::is_module_enabled(ledger, this, module) {
            return Err(Revert::custom(ISmartAccount::ModuleAlreadyEnabled { module }));
        }
        Self::set_module(ledger, this, module, true);
        info!(account = %this, %module, "module enabled");
        Ok(())
    }
}

impl Contract for SmartAccount {
    fn call(&self, ledger: &mut Ledger, msg: &Msg) -> Result<Bytes, Revert> {
        let this = msg.to;
        let call = ISmartAccountCalls::abi_decode(&msg.data, true)
            .map_err(|_| Revert::reason_string("account: unknown call"))?;
        match call {
            ISmartAccountCalls::execute(exec) => {
                self.only_entry_point_or_self(this, msg.sender)?;
                let call = Call {
                    destination: exec.dest,
                    value: exec.value,
                    data: exec.func,
                };
                Self::execute(ledger, this, call)?;
                Ok(Bytes::new())
            }
            ISmartAccountCalls::executeBatch(batch) => {
                self.only_entry_point_or_self(this, msg.sender)?;
                let (dest_len, value_len, func_len) =
                    (batch.dest.len(), batch.value.len(), batch.func.len());
                let calls = batch_calls(batch.dest, batch.value, batch.func).map_err(|_| {
                    Revert::custom(ISmartAccount::WrongBatchProvided {
                        destLength: U256::from(dest_len),
                        valueLength: U256::from(value_len),
                        funcLength: U256::from(func_len),
                    })
                })?;
                for call in calls {
                    Self::execute(ledger, this, call)?;
                }
                Ok(Bytes::new())
            }
            ISmartAccountCalls::enableModule(enable) => {
                Self::only_self(this, msg.sender)?;
                Self::enable_module(ledger, this, enable.module)?;
                Ok(Bytes::new())
            }
            ISmartAccountCalls::disableModule(disable) => {
                Self::only_self(this, msg.sender)?;
                if !Self::is_module_enabled(ledger, this, disable.module) {
                    return Err(Revert::custom(ISmartAccount::ModuleNotEnabled {
                        module: disable.module,
                    }));
                }
                Self::set_module(ledger, this, disable.module, false);
                info!(account = %this, module = %disable.module, "module disabled");
                Ok(Bytes::new())
            }
            ISmartAccountCalls::setupAndEnableModule(setup) => {
                Self::only_self(this, msg.sender)?;
                ledger.call(Msg::new(this, setup.setupContract, setup.setupData))?;
                Self::enable_module(ledger, this, setup.setupContract)?;
                Ok(setup.setupContract.abi_encode().into())
            }
            ISmartAccountCalls::isModuleEnabled(query) => {
                Ok(Self::is_module_enabled(ledger, this, query.module)
                    .abi_encode()
                    .into())
            }
            ISmartAccountCalls::isValidSignature(check) => {
                let magic = if modules::is_valid_signature(ledger, this, check.dataHash, &check.signature) {
                    EIP1271_MAGIC_VALUE
                } else {
                    EIP1271_INVALID
                };
                Ok(magic.abi_encode().into())
            }
        }
    }

    fn as_account(&self) -> Option<&SmartAccount> {
        Some(self)
    }
}
