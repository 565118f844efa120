//! Keeper error taxonomy.

use keeper_chain::{ChainError, SuiAddress};
use thiserror::Error;

/// A declared output slot could not be decoded.
///
/// Never fatal: the codec records it and keeps decoding the remaining slots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("slot {slot:?}: call {call} produced no value at index {index}")]
    MissingOutput {
        slot: String,
        call: usize,
        index: usize,
    },

    #[error("slot {slot:?}: malformed output: {reason}")]
    Malformed { slot: String, reason: String },
}

/// Errors that end a workflow cycle.
#[derive(Debug, Error)]
pub enum KeeperError {
    /// Any rejected or timed-out ledger request.
    #[error("network error: {0}")]
    Network(#[from] ChainError),

    /// Building a batch needed an off-chain payload that could not be fetched.
    #[error("oracle error: {0:#}")]
    Oracle(anyhow::Error),

    /// A sub-builder appended a different number of calls than it declares.
    #[error("{builder} appended {actual} calls, declared {declared}")]
    BatchLayout {
        builder: &'static str,
        declared: usize,
        actual: usize,
    },

    /// Decoding a value the cycle cannot proceed without.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Market state read at startup was unusable.
    #[error("market {market}: {reason}")]
    Market { market: String, reason: String },

    /// A cycle failed after its candidate addresses were known.
    #[error("{source} (addresses: {})", join_addresses(.addresses))]
    Cycle {
        addresses: Vec<SuiAddress>,
        #[source]
        source: Box<KeeperError>,
    },
}

impl KeeperError {
    /// Attach the addresses a cycle was working on. An error already
    /// carrying addresses keeps its own.
    pub fn with_addresses(self, addresses: &[SuiAddress]) -> Self {
        match self {
            KeeperError::Cycle { .. } => self,
            other => KeeperError::Cycle {
                addresses: addresses.to_vec(),
                source: Box::new(other),
            },
        }
    }

    pub fn addresses(&self) -> &[SuiAddress] {
        match self {
            KeeperError::Cycle { addresses, .. } => addresses,
            _ => &[],
        }
    }

    /// The underlying error, past any address context.
    pub fn root(&self) -> &KeeperError {
        match self {
            KeeperError::Cycle { source, .. } => source.root(),
            other => other,
        }
    }
}

fn join_addresses(addresses: &[SuiAddress]) -> String {
    addresses.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

pub type KeeperResult<T> = Result<T, KeeperError>;
