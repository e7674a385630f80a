//! Keystone smart account authorization core.
//!
//! An in-memory ledger hosts the account, its validation modules and an ERC-4337 entry point.
//! Validation is layered: the account unwraps a signature envelope and dispatches to a module,
//! which may dispatch further (recovery delegating to ownership, the batched router asking a
//! session key manager, session managers asking sub-validators).
//!
//! Modules:
//! - [`modules::EcdsaOwnershipModule`]: single EOA owner.
//! - [`session::MerkleSessionManager`]: sessions approved by a Merkle root.
//! - [`session::HybridSessionManager`]: sessions enabled per digest, or inline from an owner-signed batch.
//! - [`session::BatchedSessionRouter`]: one session per call of a batch.
//! - [`recovery::AccountRecoveryModule`]: guardian threshold with a security delay.

pub mod account;
pub mod bundler;
pub mod constants;
pub mod entrypoint;
pub mod errors;
pub mod interfaces;
pub mod ledger;
pub mod modules;
pub mod recovery;
pub mod session;
pub mod simulation;
pub mod utils;

pub use keystone_wallet_types as types;

pub use account::SmartAccount;
pub use bundler::{Bundler, BundlerConfig, RpcError, RpcErrorCode};
pub use entrypoint::{EntryPoint, FailedOp, FailureKind, OpOutcome};
pub use errors::{DecodeError, Revert, ValidationError};
pub use ledger::{Contract, Ledger, Msg};
pub use modules::{EcdsaOwnershipModule, ValidationModule};
pub use recovery::{AccountRecoveryModule, RecoveryState};
pub use session::validators::{AbiSessionValidator, Erc20SessionValidator, SessionValidator};
pub use session::{BatchedSessionRouter, HybridSessionManager, MerkleSessionManager, SessionKeyManager};
