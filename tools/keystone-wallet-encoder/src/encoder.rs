use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::SolValue;
use keystone_wallet_types::{
    payloads::{MODE_ENABLE_AND_USE, MODE_PRE_ENABLED},
    rules::{PARAM_RULE_LEN, PERMISSION_HEADER_LEN},
    session::MAX_SESSIONS_PER_BATCH,
    AbiPermission, BatchedSession, BatchedSessionUse, GuardianApproval, PreEnabledSessionUse,
    SessionApproval, SessionEnableBatch, SessionEnableProof, SessionEnableUse, SessionKeyUse,
    SessionLeaf, SignatureEnvelope,
};

use crate::types::BatchedSessionInput;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("session batch holds {0} entries, at most {max} fit", max = MAX_SESSIONS_PER_BATCH)]
    TooManySessions(usize),
    #[error("permission holds {0} rules, at most {max} fit", max = u16::MAX)]
    TooManyRules(usize),
}

/// `abi.encode(bytes payload, address handler)`.
pub fn encode_envelope(payload: impl Into<Bytes>, handler: Address) -> Bytes {
    SignatureEnvelope::new(payload, handler).encode()
}

pub fn encode_session_key_use(leaf: &SessionLeaf, proof: &[B256], signature: impl Into<Bytes>) -> Bytes {
    let (valid_until, valid_after) = leaf.wire_bounds();
    SessionKeyUse {
        validUntil: valid_until,
        validAfter: valid_after,
        sessionValidationModule: leaf.validator,
        sessionKeyData: leaf.config.clone(),
        merkleProof: proof.to_vec(),
        sessionKeySignature: signature.into(),
    }
    .abi_encode_params()
    .into()
}

fn with_mode(mode: u8, body: Vec<u8>) -> Bytes {
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(mode);
    out.extend_from_slice(&body);
    out.into()
}

/// Hybrid manager payload for a session enabled earlier.
pub fn encode_pre_enabled_use(leaf: &SessionLeaf, signature: impl Into<Bytes>) -> Bytes {
    let (valid_until, valid_after) = leaf.wire_bounds();
    let body = PreEnabledSessionUse {
        validUntil: valid_until,
        validAfter: valid_after,
        sessionValidationModule: leaf.validator,
        sessionKeyData: leaf.config.clone(),
        sessionKeySignature: signature.into(),
    }
    .abi_encode_params();
    with_mode(MODE_PRE_ENABLED, body)
}

/// Hybrid manager payload that enables the session from an owner-signed batch and uses it.
///
/// `enable_signature` is an account signature (an envelope) over `keccak256(enable_data)`.
pub fn encode_enable_and_use(
    leaf: &SessionLeaf,
    session_index: u8,
    enable_data: impl Into<Bytes>,
    enable_signature: impl Into<Bytes>,
    signature: impl Into<Bytes>,
) -> Bytes {
    let (valid_until, valid_after) = leaf.wire_bounds();
    let body = SessionEnableUse {
        validUntil: valid_until,
        validAfter: valid_after,
        sessionValidationModule: leaf.validator,
        sessionKeyData: leaf.config.clone(),
        enableProof: SessionEnableProof {
            sessionIndex: session_index,
            sessionEnableData: enable_data.into(),
            sessionEnableSignature: enable_signature.into(),
        },
        sessionKeySignature: signature.into(),
    }
    .abi_encode_params();
    with_mode(MODE_ENABLE_AND_USE, body)
}

/// Packs `uint8 count || uint64[count] chainIds || bytes32[count] digests`.
pub fn encode_session_enable_data(approvals: &[SessionApproval]) -> Result<Bytes, EncodeError> {
    if approvals.len() > MAX_SESSIONS_PER_BATCH {
        return Err(EncodeError::TooManySessions(approvals.len()));
    }
    let mut out = Vec::with_capacity(SessionEnableBatch::encoded_len(approvals.len()));
    out.push(approvals.len() as u8);
    for approval in approvals {
        out.extend_from_slice(&approval.chain_id.to_be_bytes());
    }
    for approval in approvals {
        out.extend_from_slice(approval.digest.as_slice());
    }
    Ok(out.into())
}

/// Merkle manager proof as carried inside a batched session entry.
pub fn merkle_proof_bytes(proof: &[B256]) -> Bytes {
    proof.to_vec().abi_encode().into()
}

/// Hybrid manager proof inside a batched session entry: the session is already enabled.
pub fn pre_enabled_proof() -> Bytes {
    Bytes::from(vec![MODE_PRE_ENABLED])
}

/// Hybrid manager proof inside a batched session entry: enable from an owner-signed batch.
pub fn encode_enable_proof(
    session_index: u8,
    enable_data: impl Into<Bytes>,
    enable_signature: impl Into<Bytes>,
) -> Bytes {
    let body = SessionEnableProof {
        sessionIndex: session_index,
        sessionEnableData: enable_data.into(),
        sessionEnableSignature: enable_signature.into(),
    }
    .abi_encode_params();
    with_mode(MODE_ENABLE_AND_USE, body)
}

pub fn encode_batched_session_use(
    manager: Address,
    sessions: &[BatchedSessionInput],
    signature: impl Into<Bytes>,
) -> Bytes {
    BatchedSessionUse {
        sessionKeyManager: manager,
        sessions: sessions
            .iter()
            .map(|input| {
                let (valid_until, valid_after) = input.leaf.wire_bounds();
                BatchedSession {
                    validUntil: valid_until,
                    validAfter: valid_after,
                    sessionValidationModule: input.leaf.validator,
                    sessionKeyData: input.leaf.config.clone(),
                    proof: input.proof.clone(),
                    callSpecificData: input.call_specific_data.clone(),
                }
            })
            .collect(),
        sessionKeySignature: signature.into(),
    }
    .abi_encode_params()
    .into()
}

/// Recovery submission payload. `user_op_signature` comes from the first guardian in
/// `control_signatures`; every control signature signs the account's control message.
pub fn encode_guardian_approval(user_op_signature: impl Into<Bytes>, control_signatures: &[Bytes]) -> Bytes {
    GuardianApproval {
        userOpSignature: user_op_signature.into(),
        controlSignatures: control_signatures.to_vec(),
    }
    .abi_encode_params()
    .into()
}

/// Packed configuration for the ABI permission sub-validator.
pub fn encode_abi_permission(permission: &AbiPermission) -> Result<Bytes, EncodeError> {
    let count = u16::try_from(permission.rules.len())
        .map_err(|_| EncodeError::TooManyRules(permission.rules.len()))?;
    let mut out = Vec::with_capacity(PERMISSION_HEADER_LEN + permission.rules.len() * PARAM_RULE_LEN);
    out.extend_from_slice(permission.session_key.as_slice());
    out.extend_from_slice(permission.destination.as_slice());
    out.extend_from_slice(&permission.selector);
    out.extend_from_slice(&permission.value_limit.to_be_bytes());
    out.extend_from_slice(&count.to_be_bytes());
    for rule in &permission.rules {
        out.extend_from_slice(&rule.offset.to_be_bytes());
        out.push(rule.condition as u8);
        out.extend_from_slice(rule.reference.as_slice());
    }
    Ok(out.into())
}
