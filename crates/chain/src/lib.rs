//! Sui ledger interaction layer for the keeper.
//!
//! This crate provides:
//! - Address, object reference and Move type tag types with BCS and JSON forms
//! - Programmable call batches and the transaction envelope they are encoded into
//! - A JSON-RPC client for a Sui full node
//! - The keeper's Ed25519 signing identity
//! - The [`Ledger`] trait and its node-backed implementation

mod batch;
mod error;
mod ledger;
mod rpc;
mod signer;
mod types;

pub use batch::{
    Argument, BatchInput, CallArg, CallBatch, Command, MoveTarget, ObjectArg,
    ProgrammableMoveCall, ProgrammableTransaction, TransactionKind,
};
pub use error::ChainError;
pub use ledger::{
    explorer_url, BalanceChange, CallOutput, DryRun, ExecutionStatus, Ledger, Simulation,
    Submission, SuiLedger, SuiLedgerBuilder, DEFAULT_GAS_BUDGET, SUI_COIN_TYPE,
};
pub use rpc::{BigInt, ObjectData, Owner, SuiRpcClient};
pub use signer::KeeperSigner;
pub use types::{ObjectDigest, ObjectId, ObjectRef, StructTag, SuiAddress, TypeTag, ADDRESS_LENGTH};
