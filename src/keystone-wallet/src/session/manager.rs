//! Flat session key manager: one Merkle root of approved sessions per account.

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::{SolInterface, SolValue};
use keystone_wallet_types::{SessionKeyUse, SessionLeaf, UserOperation, ValidationData};
use tracing::{debug, info};

use crate::errors::{DecodeError, Revert, ValidationError};
use crate::interfaces::ISessionKeyManager::ISessionKeyManagerCalls;
use crate::ledger::{slot, Contract, Ledger, Msg, SlotKey};
use crate::modules::ValidationModule;
use crate::session::{authorize, merkle, session_key_for, log_if_unbounded, SessionKeyManager};
use crate::utils::calldata::decode_execute;

const MERKLE_ROOT: &str = "session.merkle_root";

#[derive(Clone, Copy, Debug, Default)]
pub struct MerkleSessionManager;

impl MerkleSessionManager {
    fn root_key(this: Address, account: Address) -> SlotKey {
        SlotKey::new(this, account, slot(MERKLE_ROOT))
    }

    /// Current root for `account`; zero when none was set.
    pub fn merkle_root(ledger: &Ledger, this: Address, account: Address) -> B256 {
        ledger.sload(Self::root_key(this, account)).unwrap_or_default()
    }

    fn check_leaf(
        ledger: &Ledger,
        this: Address,
        account: Address,
        leaf: &SessionLeaf,
        proof: &[B256],
    ) -> Result<(), ValidationError> {
        let root = Self::merkle_root(ledger, this, account);
        if root.is_zero() || !merkle::verify(proof, root, leaf.digest()) {
            debug!(%account, "session leaf not under stored root");
            return Err(ValidationError::SessionNotApproved);
        }
        log_if_unbounded(leaf);
        Ok(())
    }
}

impl Contract for MerkleSessionManager {
    fn call(&self, ledger: &mut Ledger, msg: &Msg) -> Result<Bytes, Revert> {
        let call = ISessionKeyManagerCalls::abi_decode(&msg.data, true)
            .map_err(|_| Revert::reason_string("session manager: unknown call"))?;
        match call {
            ISessionKeyManagerCalls::setMerkleRoot(set) => {
                ledger.sstore(Self::root_key(msg.to, msg.sender), &set.merkleRoot);
                info!(account = %msg.sender, root = %set.merkleRoot, "session root updated");
                Ok(Bytes::new())
            }
            ISessionKeyManagerCalls::getSessionKeys(get) => {
                Ok(Self::merkle_root(ledger, msg.to, get.smartAccount)
                    .abi_encode()
                    .into())
            }
        }
    }

    fn as_validation_module(&self) -> Option<&dyn ValidationModule> {
        Some(self)
    }

    fn as_session_key_manager(&self) -> Option<&dyn SessionKeyManager> {
        Some(self)
    }
}

impl ValidationModule for MerkleSessionManager {
    fn validate_user_op(
        &self,
        ledger: &mut Ledger,
        this: Address,
        op: &UserOperation,
        op_hash: B256,
        signature: &[u8],
    ) -> Result<ValidationData, ValidationError> {
        let payload = SessionKeyUse::abi_decode_params(signature, true).map_err(DecodeError::from)?;
        let leaf = payload.leaf();
        Self::check_leaf(ledger, this, op.sender, &leaf, &payload.merkleProof)?;
        let call = decode_execute(&op.callData)?;
        let session_key = session_key_for(ledger, &leaf, &call, &[])?;
        authorize(op_hash, &payload.sessionKeySignature, session_key, leaf.validation_data())
    }
}

impl SessionKeyManager for MerkleSessionManager {
    /// `proof` is `abi.encode(bytes32[])`.
    fn validate_session_key(
        &self,
        ledger: &mut Ledger,
        this: Address,
        account: Address,
        leaf: &SessionLeaf,
        proof: &[u8],
    ) -> Result<(), ValidationError> {
        let proof = Vec::<B256>::abi_decode(proof, true).map_err(DecodeError::from)?;
        Self::check_leaf(ledger, this, account, leaf, &proof)
    }
}
