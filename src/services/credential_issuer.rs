// src/services/credential_issuer.rs
//! Holder-side QR credential issuer.
//!
//! The issuer asks the holder's wallet to sign a login message for one
//! event, encodes the result as a QR payload and keeps it on display for a
//! fixed refresh period. When the countdown runs out the credential is
//! expired and a new one is only produced on an explicit `issue` call, so the
//! holder never sees more than one signing prompt per display cycle.

use crate::models::credential::GateCredential;
use crate::utils::clock::Clock;
use crate::utils::crypto::{format_signature, login_message};
use crate::utils::serialization::{encode_credential, CodecError};
use crate::wallet::key_management::{MessageSigner, SignerError};
use ethers::utils::to_checksum;
use log::{debug, info};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default display period of one QR code.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(30);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IssuerError {
    #[error("signature request was declined")]
    SignatureDeclined,

    #[error("a signature request is already pending")]
    SigningInProgress,

    #[error("wallet failed to sign: {0}")]
    SigningFailed(String),

    /// `close` was called while the wallet was signing.
    #[error("display was closed before signing finished")]
    Closed,

    #[error(transparent)]
    Encoding(#[from] CodecError),
}

/// A credential on display together with its QR text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedQr {
    pub credential: GateCredential,
    /// Exact text to render into the QR code.
    pub payload: String,
    pub expires_at_millis: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IssuerState {
    Idle,
    Signing { target_context: String },
    Displaying { qr: IssuedQr },
    Expired { target_context: String },
}

/// State shared with the countdown task.
struct Shared {
    state: watch::Sender<IssuerState>,
    remaining: watch::Sender<u64>,
    /// Bumped on every claim and close; stale signing results and countdowns compare against it.
    cycle: AtomicU64,
}

/// Produces and displays signed gate credentials.
pub struct CredentialIssuer {
    signer: Arc<dyn MessageSigner>,
    clock: Arc<dyn Clock>,
    refresh: Duration,
    shared: Arc<Shared>,
    countdown: Mutex<Option<JoinHandle<()>>>,
}

impl CredentialIssuer {
    /// Creates an idle issuer.
    ///
    /// # Arguments
    /// * `signer` - Holder's wallet
    /// * `clock` - Source of the issuance timestamp
    /// * `refresh` - How long each QR code stays on display (rounded to whole seconds, at least one)
    pub fn new(signer: Arc<dyn MessageSigner>, clock: Arc<dyn Clock>, refresh: Duration) -> Self {
        let (state, _) = watch::channel(IssuerState::Idle);
        let (remaining, _) = watch::channel(0);
        Self {
            signer,
            clock,
            refresh: Duration::from_secs(refresh.as_secs().max(1)),
            shared: Arc::new(Shared {
                state,
                remaining,
                cycle: AtomicU64::new(0),
            }),
            countdown: Mutex::new(None),
        }
    }

    pub fn state(&self) -> IssuerState {
        self.shared.state.borrow().clone()
    }

    /// Whole seconds left on the current display, 0 when nothing is shown.
    pub fn remaining_secs(&self) -> u64 {
        *self.shared.remaining.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<IssuerState> {
        self.shared.state.subscribe()
    }

    /// Requests a fresh signature for `target_context` and puts it on display.
    ///
    /// Replaces any credential currently shown and restarts the countdown.
    /// Suspends for as long as the wallet takes to answer.
    ///
    /// # Errors
    /// - `SigningInProgress` if another request is still waiting on the wallet
    /// - `SignatureDeclined` if the holder refused; the issuer returns to idle
    /// - `Closed` if [`close`](Self::close) was called while waiting
    pub async fn issue(&self, target_context: &str) -> Result<IssuedQr, IssuerError> {
        let cycle = self.claim(target_context)?;
        let mut pending = PendingCycle { issuer: self, cycle, shown: false };
        self.stop_countdown();
        self.shared.remaining.send_replace(0);

        let issued_at_millis = self.clock.now_millis();
        let message = login_message(target_context, issued_at_millis);
        debug!("requesting signature for {}", message);

        let signature = match self.signer.sign_message(&message).await {
            Ok(signature) => signature,
            Err(e) => {
                return Err(match e {
                    SignerError::Declined => {
                        info!("holder declined to sign QR credential");
                        IssuerError::SignatureDeclined
                    }
                    SignerError::Failed(reason) => IssuerError::SigningFailed(reason),
                });
            }
        };

        let credential = GateCredential {
            target_context: target_context.to_string(),
            subject_address: to_checksum(&self.signer.address(), None),
            signature: format_signature(&signature),
            issued_at_millis,
        };
        let payload = encode_credential(&credential)?;
        let qr = IssuedQr {
            credential,
            payload,
            expires_at_millis: issued_at_millis + self.refresh.as_millis() as i64,
        };

        let shared = &self.shared;
        let shown = shared.state.send_if_modified(|state| {
            if shared.cycle.load(Ordering::SeqCst) != cycle || !matches!(state, IssuerState::Signing { .. }) {
                return false;
            }
            *state = IssuerState::Displaying { qr: qr.clone() };
            true
        });
        if !shown {
            debug!("signature arrived after the display was closed, discarding");
            return Err(IssuerError::Closed);
        }
        pending.shown = true;

        self.start_countdown(cycle);
        info!("QR credential issued for {}", target_context);
        Ok(qr)
    }

    /// Discards whatever is displayed or pending and stops the countdown.
    ///
    /// A pending wallet prompt is not withdrawn; its answer is ignored.
    pub fn close(&self) {
        let shared = &self.shared;
        shared.state.send_modify(|state| {
            shared.cycle.fetch_add(1, Ordering::SeqCst);
            *state = IssuerState::Idle;
        });
        self.stop_countdown();
        shared.remaining.send_replace(0);
    }

    /// Moves to `Signing` unless a request is already outstanding.
    fn claim(&self, target_context: &str) -> Result<u64, IssuerError> {
        let shared = &self.shared;
        let mut cycle = 0;
        let claimed = shared.state.send_if_modified(|state| {
            if matches!(state, IssuerState::Signing { .. }) {
                return false;
            }
            cycle = shared.cycle.fetch_add(1, Ordering::SeqCst) + 1;
            *state = IssuerState::Signing {
                target_context: target_context.to_string(),
            };
            true
        });

        if claimed {
            Ok(cycle)
        } else {
            Err(IssuerError::SigningInProgress)
        }
    }

    /// Returns a failed request to `Idle` if nothing superseded it.
    fn release(&self, cycle: u64) {
        let shared = &self.shared;
        shared.state.send_if_modified(|state| {
            if shared.cycle.load(Ordering::SeqCst) != cycle || !matches!(state, IssuerState::Signing { .. }) {
                return false;
            }
            *state = IssuerState::Idle;
            true
        });
    }

    fn start_countdown(&self, cycle: u64) {
        let shared = self.shared.clone();
        let total = self.refresh.as_secs();
        shared.remaining.send_replace(total);

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            for elapsed in 1..=total {
                tokio::time::sleep_until(started + Duration::from_secs(elapsed)).await;
                shared.remaining.send_replace(total - elapsed);
            }

            let expired = shared.state.send_if_modified(|state| {
                if shared.cycle.load(Ordering::SeqCst) != cycle {
                    return false;
                }
                match state {
                    IssuerState::Displaying { qr } => {
                        let target_context = qr.credential.target_context.clone();
                        *state = IssuerState::Expired { target_context };
                        true
                    }
                    _ => false,
                }
            });
            if expired {
                info!("QR credential expired, waiting for reissue");
            }
        });

        let previous = self
            .countdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn stop_countdown(&self) {
        if let Some(handle) = self
            .countdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

/// Releases a claimed cycle that never reached the display, including when
/// the `issue` future is dropped while the wallet is still prompting.
struct PendingCycle<'a> {
    issuer: &'a CredentialIssuer,
    cycle: u64,
    shown: bool,
}

impl Drop for PendingCycle<'_> {
    fn drop(&mut self) {
        if !self.shown {
            self.issuer.release(self.cycle);
        }
    }
}

impl Drop for CredentialIssuer {
    fn drop(&mut self) {
        self.stop_countdown();
    }
}
