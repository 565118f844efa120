use thiserror::Error;

use crate::types::ObjectId;

/// Errors raised while talking to the ledger or encoding payloads for it.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("rpc {method} failed with code {code}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response from {method}: {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("object {0} not found")]
    ObjectNotFound(ObjectId),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid object digest: {0}")]
    InvalidDigest(String),

    #[error("invalid type tag {input:?}: {reason}")]
    InvalidTypeTag { input: String, reason: String },

    #[error("invalid signing key: {0}")]
    Signing(String),

    #[error("bcs encoding failed: {0}")]
    Encoding(#[from] bcs::Error),

    #[error("no gas coins owned by {0}")]
    NoGasCoins(ObjectId),
}

impl ChainError {
    pub(crate) fn invalid_response(method: &str, reason: impl Into<String>) -> Self {
        ChainError::InvalidResponse {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}
