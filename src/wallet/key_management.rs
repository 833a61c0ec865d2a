// src/wallet/key_management.rs
//! Cryptographic key management for the node's wallet.
//!
//! Provides the message-signing capability the QR issuer depends on, and the
//! operator key that signs ledger writes. Uses:
//! - secp256k1 keys (via `k256`)
//! - EIP-191 personal-message signing (via `ethers` `LocalWallet`)

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature};
use ethers::utils::hex;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::generic_array::GenericArray;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// The key holder refused to sign.
    #[error("signature request was declined")]
    Declined,

    #[error("signing failed: {0}")]
    Failed(String),
}

/// Wallet signing capability.
///
/// Implementations may suspend for as long as the key holder takes to
/// approve; callers impose no timeout.
#[async_trait]
pub trait MessageSigner: Send + Sync {
    /// Address whose key produces the signatures.
    fn address(&self) -> Address;

    /// Signs `message` as an EIP-191 personal message.
    async fn sign_message(&self, message: &str) -> Result<Signature, SignerError>;
}

/// Key manager holding a single local secp256k1 key.
///
/// This struct provides:
/// - Key import from a hex private key
/// - Random key generation
/// - Message signing without user interaction (the node owns the key)
#[derive(Clone)]
pub struct KeyManager {
    /// Local wallet wrapping the secret key
    wallet: LocalWallet,
}

#[derive(Debug, Error)]
pub enum KeyImportError {
    #[error("private key is not valid hex: {0}")]
    InvalidHex(String),

    #[error("private key must be 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("private key is not a valid secp256k1 scalar")]
    InvalidScalar,
}

impl KeyManager {
    /// Generates a KeyManager with a fresh random key.
    pub fn random() -> Self {
        KeyManager {
            wallet: LocalWallet::new(&mut rand::thread_rng()),
        }
    }

    /// Imports a hex-encoded private key (with or without `0x`).
    ///
    /// # Errors
    /// Returns [`KeyImportError`] if the text is not 32 bytes of hex or is
    /// not a valid curve scalar.
    pub fn from_private_key(private_key: &str) -> Result<Self, KeyImportError> {
        let trimmed = private_key.trim();
        let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|e| KeyImportError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(KeyImportError::InvalidLength(bytes.len()));
        }

        let signing_key = SigningKey::from_bytes(GenericArray::from_slice(&bytes))
            .map_err(|_| KeyImportError::InvalidScalar)?;

        Ok(KeyManager {
            wallet: LocalWallet::from(signing_key),
        })
    }

    /// The wallet, for wiring into a signing middleware.
    pub fn wallet(&self) -> LocalWallet {
        self.wallet.clone()
    }
}

#[async_trait]
impl MessageSigner for KeyManager {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_message(&self, message: &str) -> Result<Signature, SignerError> {
        self.wallet
            .sign_message(message)
            .await
            .map_err(|e| SignerError::Failed(e.to_string()))
    }
}
