// src/utils/crypto.rs
//! Signed-login message construction and signer recovery.
//!
//! Credentials are signed with the Ethereum personal-message scheme (EIP-191):
//! the wallet prefixes the message with `"\x19Ethereum Signed Message:\n" + len`,
//! hashes it with Keccak-256 and produces a 65-byte recoverable signature.
//! Recovery therefore needs nothing but the message text and the signature.

use ethers::types::{Address, Signature};
use std::str::FromStr;
use thiserror::Error;

/// Fixed prefix of every gate login message.
pub const LOGIN_PREFIX: &str = "LOGIN_REQ";

/// Errors produced while recovering the signer of a login message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("signature is not a 65-byte hex string: {0}")]
    InvalidSignature(String),

    #[error("signer could not be recovered: {0}")]
    Unrecoverable(String),
}

/// Builds the exact text a holder signs for a given event and issuance time.
///
/// # Arguments
/// * `target_context` - Event contract address, exactly as it will travel in the QR payload
/// * `issued_at_millis` - Issuance timestamp in Unix milliseconds
///
/// The result must be byte-identical on both sides of the handshake; the
/// address is embedded verbatim, so a change of casing breaks recovery.
pub fn login_message(target_context: &str, issued_at_millis: i64) -> String {
    format!("{}|{}|{}", LOGIN_PREFIX, target_context, issued_at_millis)
}

/// Renders a signature the way browser wallets return it: `0x` + 130 hex chars.
pub fn format_signature(signature: &Signature) -> String {
    format!("0x{}", signature)
}

/// Recovers the address that produced `signature` over `message`.
///
/// # Arguments
/// * `message` - The plain (unprefixed) message text
/// * `signature` - Hex signature, with or without `0x`
///
/// # Errors
/// Returns [`RecoveryError`] if the signature does not parse or no public key
/// can be recovered from it.
pub fn recover_signer(message: &str, signature: &str) -> Result<Address, RecoveryError> {
    let signature = Signature::from_str(signature)
        .map_err(|e| RecoveryError::InvalidSignature(e.to_string()))?;

    signature
        .recover(message)
        .map_err(|e| RecoveryError::Unrecoverable(e.to_string()))
}

/// Case-insensitive comparison of a recovered address against a claimed one.
pub fn address_matches(recovered: &Address, claimed: &str) -> bool {
    format!("{:?}", recovered).eq_ignore_ascii_case(claimed.trim())
}
