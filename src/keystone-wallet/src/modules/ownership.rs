//! ECDSA ownership module: one EOA owner per account.

use alloy_primitives::{eip191_hash_message, Address, Bytes, B256};
use alloy_sol_types::{SolInterface, SolValue};
use keystone_wallet_types::{UserOperation, ValidationData};
use tracing::{debug, info};

use crate::errors::{Revert, ValidationError};
use crate::interfaces::IOwnershipModule::{self, IOwnershipModuleCalls};
use crate::ledger::{slot, Contract, Ledger, Msg, SlotKey};
use crate::modules::ValidationModule;
use crate::utils::crypto::{ecrecover_address, signature_bytes};

const OWNER: &str = "ownership.owner";

#[derive(Clone, Copy, Debug, Default)]
pub struct EcdsaOwnershipModule;

impl EcdsaOwnershipModule {
    fn owner_key(this: Address, account: Address) -> SlotKey {
        SlotKey::new(this, account, slot(OWNER))
    }

    pub fn owner_of(ledger: &Ledger, this: Address, account: Address) -> Option<Address> {
        ledger.sload(Self::owner_key(this, account))
    }

    fn check_owner(ledger: &Ledger, owner: Address) -> Result<(), Revert> {
        if owner.is_zero() {
            return Err(Revert::custom(IOwnershipModule::ZeroAddressNotAllowedAsOwner {}));
        }
        if ledger.has_code(owner) {
            return Err(Revert::custom(IOwnershipModule::NotEOA { account: owner }));
        }
        Ok(())
    }

    /// Accepts a signature over the `eth_sign` digest of `hash` or over `hash` itself.
    fn signed_by_owner(owner: Address, hash: B256, signature: &[u8; 65]) -> bool {
        ecrecover_address(eip191_hash_message(hash), signature) == Some(owner)
            || ecrecover_address(hash, signature) == Some(owner)
    }
}

impl Contract for EcdsaOwnershipModule {
    fn call(&self, ledger: &mut Ledger, msg: &Msg) -> Result<Bytes, Revert> {
        let call = IOwnershipModuleCalls::abi_decode(&msg.data, true)
            .map_err(|_| Revert::reason_string("ownership: unknown call"))?;
        let account = msg.sender;
        match call {
            IOwnershipModuleCalls::initForSmartAccount(init) => {
                if Self::owner_of(ledger, msg.to, account).is_some() {
                    return Err(Revert::custom(IOwnershipModule::AlreadyInitedForSmartAccount {
                        smartAccount: account,
                    }));
                }
                Self::check_owner(ledger, init.eoaOwner)?;
                ledger.sstore(Self::owner_key(msg.to, account), &init.eoaOwner);
                info!(%account, owner = %init.eoaOwner, "ownership initialized");
                Ok(msg.to.abi_encode().into())
            }
            IOwnershipModuleCalls::transferOwnership(transfer) => {
                let previous = Self::owner_of(ledger, msg.to, account).ok_or_else(|| {
                    Revert::custom(IOwnershipModule::NoOwnerRegisteredForSmartAccount {
                        smartAccount: account,
                    })
                })?;
                Self::check_owner(ledger, transfer.owner)?;
                ledger.sstore(Self::owner_key(msg.to, account), &transfer.owner);
                info!(%account, %previous, owner = %transfer.owner, "ownership transferred");
                Ok(Bytes::new())
            }
            IOwnershipModuleCalls::getOwner(get) => {
                let owner = Self::owner_of(ledger, msg.to, get.smartAccount).ok_or_else(|| {
                    Revert::custom(IOwnershipModule::NoOwnerRegisteredForSmartAccount {
                        smartAccount: get.smartAccount,
                    })
                })?;
                Ok(owner.abi_encode().into())
            }
        }
    }

    fn as_validation_module(&self) -> Option<&dyn ValidationModule> {
        Some(self)
    }
}

impl ValidationModule for EcdsaOwnershipModule {
    fn validate_user_op(
        &self,
        ledger: &mut Ledger,
        this: Address,
        op: &UserOperation,
        op_hash: B256,
        signature: &[u8],
    ) -> Result<ValidationData, ValidationError> {
        let signature = signature_bytes(signature)?;
        let owner = Self::owner_of(ledger, this, op.sender).ok_or(ValidationError::NotInitialized)?;
        if Self::signed_by_owner(owner, op_hash, signature) {
            Ok(ValidationData::SUCCESS)
        } else {
            debug!(account = %op.sender, %owner, "operation not signed by owner");
            Ok(ValidationData::failed())
        }
    }

    fn is_valid_signature_for(
        &self,
        ledger: &mut Ledger,
        this: Address,
        account: Address,
        hash: B256,
        signature: &[u8],
    ) -> bool {
        let Ok(signature) = signature_bytes(signature) else {
            return false;
        };
        Self::owner_of(ledger, this, account)
            .is_some_and(|owner| Self::signed_by_owner(owner, hash, signature))
    }
}
