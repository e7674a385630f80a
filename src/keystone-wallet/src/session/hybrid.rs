//! Hybrid session key manager: enabled session digests, plus enable-and-use from an owner-signed
//! batch of approvals.
//!
//! Payload is `mode || abi.encode(...)`:
//! - `0x00` [`PreEnabledSessionUse`]: the leaf's digest must already be enabled.
//! - `0x01` [`SessionEnableUse`]: the owner signed `keccak256(sessionEnableData)`, a packed list
//!   of `(chainId, digest)` pairs. The entry at `sessionIndex` must name this chain and this leaf;
//!   the digest is enabled and used in the same operation.
//!
//! The owner signature is checked through the account's own `isValidSignature`, so whatever
//! module owns the account decides.
//!
//! `disableSession` also marks the digest revoked. A signed approval batch stays valid forever, so
//! a revoked digest can only come back through an explicit `enableSession` from the account.

use alloy_primitives::{keccak256, Address, Bytes, FixedBytes, B256};
use alloy_sol_types::{SolCall, SolInterface, SolValue};
use keystone_wallet_types::payloads::{MODE_ENABLE_AND_USE, MODE_PRE_ENABLED};
use keystone_wallet_types::{
    PreEnabledSessionUse, SessionApproval, SessionEnableBatch, SessionEnableProof, SessionEnableUse,
    SessionLeaf, UserOperation, ValidationData,
};
use tracing::{debug, info};

use crate::constants::EIP1271_MAGIC_VALUE;
use crate::errors::{DecodeError, Revert, ValidationError};
use crate::interfaces::ISessionKeyManagerHybrid::ISessionKeyManagerHybridCalls;
use crate::interfaces::ISmartAccount;
use crate::ledger::{mapping_slot, Contract, Ledger, Msg, SlotKey};
use crate::modules::ValidationModule;
use crate::session::{authorize, log_if_unbounded, session_key_for, SessionKeyManager};
use crate::utils::bytes::{expect_end, read_b32, read_u64_be, read_u8};
use crate::utils::calldata::decode_execute;

const ENABLED: &str = "hybrid.enabled";
const REVOKED: &str = "hybrid.revoked";

#[derive(Clone, Copy, Debug, Default)]
pub struct HybridSessionManager;

/// Decode `uint8 count || uint64[count] chainIds || bytes32[count] digests`.
pub fn decode_session_enable_data(data: &[u8]) -> Result<SessionEnableBatch, DecodeError> {
    let mut i = 0usize;
    let count = read_u8(data, &mut i)? as usize;
    let chain_ids = (0..count)
        .map(|_| read_u64_be(data, &mut i))
        .collect::<Result<Vec<_>, _>>()?;
    let digests = (0..count)
        .map(|_| read_b32(data, &mut i))
        .collect::<Result<Vec<_>, _>>()?;
    expect_end(data, i)?;
    Ok(SessionEnableBatch {
        entries: chain_ids
            .into_iter()
            .zip(digests)
            .map(|(chain_id, digest)| SessionApproval { chain_id, digest })
            .collect(),
    })
}

impl HybridSessionManager {
    fn enabled_key(this: Address, account: Address, digest: B256) -> SlotKey {
        SlotKey::new(this, account, mapping_slot(ENABLED, digest))
    }

    pub fn is_session_enabled(ledger: &Ledger, this: Address, account: Address, digest: B256) -> bool {
        ledger
            .sload::<bool>(Self::enabled_key(this, account, digest))
            .unwrap_or(false)
    }

    fn revoked_key(this: Address, account: Address, digest: B256) -> SlotKey {
        SlotKey::new(this, account, mapping_slot(REVOKED, digest))
    }

    pub fn is_session_revoked(ledger: &Ledger, this: Address, account: Address, digest: B256) -> bool {
        ledger
            .sload::<bool>(Self::revoked_key(this, account, digest))
            .unwrap_or(false)
    }

    fn enable(ledger: &mut Ledger, this: Address, account: Address, digest: B256) {
        ledger.sstore(Self::enabled_key(this, account, digest), &true);
        info!(%account, %digest, "session enabled");
    }

    fn disable(ledger: &mut Ledger, this: Address, account: Address, digest: B256) {
        ledger.sdelete(Self::enabled_key(this, account, digest));
        ledger.sstore(Self::revoked_key(this, account, digest), &true);
        info!(%account, %digest, "session disabled");
    }

    fn require_enabled(
        ledger: &Ledger,
        this: Address,
        account: Address,
        leaf: &SessionLeaf,
    ) -> Result<(), ValidationError> {
        if !Self::is_session_enabled(ledger, this, account, leaf.digest()) {
            debug!(%account, digest = %leaf.digest(), "session digest not enabled");
            return Err(ValidationError::SessionNotApproved);
        }
        Ok(())
    }

    /// Check the owner's approval of `leaf` on this chain and enable its digest.
    fn enable_from_proof(
        ledger: &mut Ledger,
        this: Address,
        account: Address,
        leaf: &SessionLeaf,
        proof: &SessionEnableProof,
    ) -> Result<(), ValidationError> {
        let batch = decode_session_enable_data(&proof.sessionEnableData)?;
        let index = proof.sessionIndex as usize;
        let entry = batch
            .entries
            .get(index)
            .ok_or(ValidationError::SessionIndexOutOfRange {
                index,
                count: batch.entries.len(),
            })?;
        let chain_id = ledger.chain_id();
        if entry.chain_id != chain_id {
            return Err(ValidationError::ChainMismatch {
                approved: entry.chain_id,
                actual: chain_id,
            });
        }
        let digest = leaf.digest();
        if entry.digest != digest {
            return Err(ValidationError::SessionDigestMismatch);
        }
        if Self::is_session_revoked(ledger, this, account, digest) {
            debug!(%account, %digest, "approval replayed for a revoked session");
            return Err(ValidationError::SessionRevoked);
        }
        let approval = keccak256(&proof.sessionEnableData);
        if !account_approves(ledger, this, account, approval, &proof.sessionEnableSignature) {
            return Err(ValidationError::InvalidEnableSignature);
        }
        Self::enable(ledger, this, account, digest);
        Ok(())
    }
}

/// EIP-1271 call back into the account.
fn account_approves(
    ledger: &mut Ledger,
    this: Address,
    account: Address,
    hash: B256,
    signature: &Bytes,
) -> bool {
    let call = ISmartAccount::isValidSignatureCall {
        dataHash: hash,
        signature: signature.clone(),
    };
    match ledger.call(Msg::new(this, account, call.abi_encode())) {
        Ok(out) => FixedBytes::<4>::abi_decode(&out, true).is_ok_and(|magic| magic == EIP1271_MAGIC_VALUE),
        Err(_) => false,
    }
}

impl Contract for HybridSessionManager {
    fn call(&self, ledger: &mut Ledger, msg: &Msg) -> Result<Bytes, Revert> {
        let call = ISessionKeyManagerHybridCalls::abi_decode(&msg.data, true)
            .map_err(|_| Revert::reason_string("hybrid session manager: unknown call"))?;
        let account = msg.sender;
        match call {
            ISessionKeyManagerHybridCalls::enableSession(enable) => {
                let leaf = SessionLeaf::from_wire(
                    enable.validUntil,
                    enable.validAfter,
                    enable.sessionValidationModule,
                    enable.sessionKeyData,
                );
                let digest = leaf.digest();
                ledger.sdelete(Self::revoked_key(msg.to, account, digest));
                Self::enable(ledger, msg.to, account, digest);
                Ok(Bytes::new())
            }
            ISessionKeyManagerHybridCalls::disableSession(disable) => {
                Self::disable(ledger, msg.to, account, disable.sessionDataDigest);
                Ok(Bytes::new())
            }
            ISessionKeyManagerHybridCalls::isSessionEnabled(query) => Ok(Self::is_session_enabled(
                ledger,
                msg.to,
                query.smartAccount,
                query.sessionDataDigest,
            )
            .abi_encode()
            .into()),
        }
    }

    fn as_validation_module(&self) -> Option<&dyn ValidationModule> {
        Some(self)
    }

    fn as_session_key_manager(&self) -> Option<&dyn SessionKeyManager> {
        Some(self)
    }
}

impl ValidationModule for HybridSessionManager {
    fn validate_user_op(
        &self,
        ledger: &mut Ledger,
        this: Address,
        op: &UserOperation,
        op_hash: B256,
        signature: &[u8],
    ) -> Result<ValidationData, ValidationError> {
        let (&mode, body) = signature.split_first().ok_or(DecodeError::Truncated)?;
        let (leaf, session_signature) = match mode {
            MODE_PRE_ENABLED => {
                let payload = PreEnabledSessionUse::abi_decode_params(body, true).map_err(DecodeError::from)?;
                let leaf = payload.leaf();
                Self::require_enabled(ledger, this, op.sender, &leaf)?;
                (leaf, payload.sessionKeySignature)
            }
            MODE_ENABLE_AND_USE => {
                let payload = SessionEnableUse::abi_decode_params(body, true).map_err(DecodeError::from)?;
                let leaf = payload.leaf();
                Self::enable_from_proof(ledger, this, op.sender, &leaf, &payload.enableProof)?;
                (leaf, payload.sessionKeySignature)
            }
            other => return Err(DecodeError::UnknownMode(other).into()),
        };
        log_if_unbounded(&leaf);
        let call = decode_execute(&op.callData)?;
        let session_key = session_key_for(ledger, &leaf, &call, &[])?;
        authorize(op_hash, &session_signature, session_key, leaf.validation_data())
    }
}

impl SessionKeyManager for HybridSessionManager {
    /// `proof` is `0x00` for a pre-enabled session, or `0x01 || abi.encode(SessionEnableProof)`.
    fn validate_session_key(
        &self,
        ledger: &mut Ledger,
        this: Address,
        account: Address,
        leaf: &SessionLeaf,
        proof: &[u8],
    ) -> Result<(), ValidationError> {
        let (&mode, body) = proof.split_first().ok_or(DecodeError::Truncated)?;
        match mode {
            MODE_PRE_ENABLED if !body.is_empty() => Err(DecodeError::TrailingBytes.into()),
            MODE_PRE_ENABLED => Self::require_enabled(ledger, this, account, leaf),
            MODE_ENABLE_AND_USE => {
                let enable = SessionEnableProof::abi_decode_params(body, true).map_err(DecodeError::from)?;
                Self::enable_from_proof(ledger, this, account, leaf, &enable)
            }
            other => Err(DecodeError::UnknownMode(other).into()),
        }
    }
}
