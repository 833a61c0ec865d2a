// src/models/credential.rs
//! Gate credential data model.
//!
//! A gate credential is the short-lived, signed proof of wallet ownership a
//! ticket holder shows at the door as a QR code. It is never persisted: the
//! holder's device creates one per display cycle and the gate consumes it once.

use crate::utils::crypto::login_message;
use serde::{Deserialize, Serialize};

/// Signed, time-bound proof that `subject_address` controls its wallet,
/// scoped to a single event contract.
///
/// # Wire names
/// Field names are shortened on the wire to keep the QR code small:
/// `addr` (event), `usr` (holder), `sig`, `ts`.
///
/// # Validity
/// A credential is only meaningful when `signature` was produced by
/// `subject_address` over [`GateCredential::message`] and the verifier sees it
/// within its acceptance window. Neither property is checked here.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GateCredential {
    /// Event contract address the credential grants entry to.
    #[serde(rename = "addr")]
    pub target_context: String,

    /// Wallet address claiming ticket ownership.
    #[serde(rename = "usr")]
    pub subject_address: String,

    /// Hex-encoded 65-byte recoverable signature.
    #[serde(rename = "sig")]
    pub signature: String,

    /// Issuance time, Unix milliseconds.
    #[serde(rename = "ts")]
    pub issued_at_millis: i64,
}

impl GateCredential {
    /// The exact message the holder signed.
    pub fn message(&self) -> String {
        login_message(&self.target_context, self.issued_at_millis)
    }

    /// Milliseconds elapsed between issuance and `now_millis`.
    ///
    /// Negative when the issuer's clock runs ahead of the verifier's.
    /// Saturates at the `i64` bounds for out-of-range timestamps.
    pub fn age_millis(&self, now_millis: i64) -> i64 {
        now_millis.saturating_sub(self.issued_at_millis)
    }
}
