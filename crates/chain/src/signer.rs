//! Keeper signing identity.
//!
//! Ed25519 keys only. The address is `blake2b256(0x00 || pubkey)` and
//! transactions are signed over `blake2b256(intent || bcs(tx_data))`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signer, SigningKey};

use crate::error::ChainError;
use crate::types::SuiAddress;

type Blake2b256 = Blake2b<U32>;

/// Signature scheme flag for Ed25519.
const ED25519_FLAG: u8 = 0x00;

/// Intent prefix for transaction data: (TransactionData, V0, Sui).
const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];

/// Holds the keeper's signing key and derived address.
pub struct KeeperSigner {
    key: SigningKey,
    address: SuiAddress,
}

impl std::fmt::Debug for KeeperSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeeperSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl KeeperSigner {
    /// Parse a 32-byte hex secret key (with or without `0x`).
    pub fn from_hex(secret: &str) -> Result<Self, ChainError> {
        let trimmed = secret.trim();
        let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(raw).map_err(|e| ChainError::Signing(e.to_string()))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| ChainError::Signing(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self::from_seed(seed))
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        let key = SigningKey::from_bytes(&seed);
        let address = derive_address(key.verifying_key().as_bytes());
        Self { key, address }
    }

    pub fn address(&self) -> SuiAddress {
        self.address
    }

    /// Sign BCS transaction bytes, returning the base64 serialized signature.
    pub fn sign_transaction(&self, tx_bytes: &[u8]) -> String {
        let mut hasher = Blake2b256::new();
        hasher.update(TRANSACTION_INTENT);
        hasher.update(tx_bytes);
        let digest = hasher.finalize();

        let signature = self.key.sign(&digest);
        let mut serialized = Vec::with_capacity(1 + 64 + 32);
        serialized.push(ED25519_FLAG);
        serialized.extend_from_slice(&signature.to_bytes());
        serialized.extend_from_slice(self.key.verifying_key().as_bytes());
        BASE64.encode(serialized)
    }
}

fn derive_address(public_key: &[u8; 32]) -> SuiAddress {
    let mut hasher = Blake2b256::new();
    hasher.update([ED25519_FLAG]);
    hasher.update(public_key);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    SuiAddress::new(hash)
}
