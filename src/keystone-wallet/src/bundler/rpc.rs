//! JSON-RPC shaped results and errors of the bundler surface.

use alloy_primitives::B256;
use keystone_wallet_types::UserOperation;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// ERC-4337 bundler error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcErrorCode {
    InvalidParams,
    RejectedByValidation,
    BannedOpcodeOrStorage,
    OutOfTimeRange,
    InvalidSignature,
}

impl RpcErrorCode {
    pub const fn code(self) -> i64 {
        match self {
            RpcErrorCode::InvalidParams => -32602,
            RpcErrorCode::RejectedByValidation => -32500,
            RpcErrorCode::BannedOpcodeOrStorage => -32502,
            RpcErrorCode::OutOfTimeRange => -32503,
            RpcErrorCode::InvalidSignature => -32507,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Error)]
#[error("{message} ({code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub user_op_hash: B256,
}

/// One mempool entry as returned by `debug_dump_mempool`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolEntry {
    pub user_op_hash: B256,
    pub user_operation: UserOperation,
}
