// src/services/verifier.rs
//! Gate-side ticket verification.
//!
//! The [`TicketVerifier`] takes the raw text of a scanned QR code, proves that
//! it was signed by the wallet it names and is fresh, checks ticket
//! eligibility on the ledger and finally consumes the ticket with a one-time
//! `useTicket` transaction. Only one scan is processed at a time.

use crate::blockchain::ledger::{LedgerError, TicketLedger};
use crate::models::credential::GateCredential;
use crate::utils::clock::Clock;
use crate::utils::crypto::{address_matches, recover_signer};
use crate::utils::serialization::decode_credential;
use async_trait::async_trait;
use ethers::types::{Address, TxHash};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Default acceptance window for credential age.
pub const DEFAULT_WINDOW_MS: i64 = 60_000;

/// Why a scan was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("QR code is not a valid ticket credential: {detail}")]
    InvalidFormat { detail: String },

    /// `age_millis` is negative when the code claims to be issued in the future.
    #[error("QR code is outside its validity window (age {age_millis} ms), ask for a fresh one")]
    Expired { age_millis: i64 },

    /// The signature does not belong to the claimed wallet. Possible forgery.
    #[error("signature does not match the claimed wallet")]
    SignatureMismatch {
        claimed: String,
        recovered: Option<Address>,
    },

    #[error("wallet holds no ticket for this event")]
    NoTicket,

    #[error("ticket has already been used")]
    AlreadyUsed,

    #[error("gate wallet is not the organizer of this event: {reason}")]
    NotOrganizer { reason: String },

    #[error("event has been cancelled")]
    EventCancelled,

    #[error("ledger unavailable: {detail}")]
    LedgerUnavailable { detail: String },

    #[error("transaction failed: {reason}")]
    TransactionFailed { reason: String },
}

impl RejectionReason {
    /// Security-relevant rejections, shown apart from ordinary errors.
    pub fn is_forgery_signal(&self) -> bool {
        matches!(self, RejectionReason::SignatureMismatch { .. })
    }
}

/// A refused scan, with the message shown to gate staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    #[serde(flatten)]
    pub reason: RejectionReason,
    pub message: String,
    pub forgery: bool,
}

impl From<RejectionReason> for Rejection {
    fn from(reason: RejectionReason) -> Self {
        Self {
            message: reason.to_string(),
            forgery: reason.is_forgery_signal(),
            reason,
        }
    }
}

/// A successfully consumed ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub event: Address,
    pub holder: Address,
    /// `None` when the name lookup after consumption failed.
    pub event_name: Option<String>,
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

/// Where the verifier currently is in its scan cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum VerifierState {
    Idle,
    Decoding,
    SignatureCheck,
    EligibilityCheck,
    AwaitingConfirmation,
    Submitting,
    Confirming,
    Success(Admission),
    Failure(Rejection),
}

impl VerifierState {
    fn in_flight(&self) -> bool {
        !matches!(
            self,
            VerifierState::Idle | VerifierState::Success(_) | VerifierState::Failure(_)
        )
    }
}

/// Result of handing one scanned code to [`TicketVerifier::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Another scan is in flight or a result is still on screen.
    Ignored,
    Admitted(Admission),
    Rejected(Rejection),
    /// The operator declined the consumption transaction.
    Cancelled,
}

/// What the operator is asked to approve before the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumptionRequest {
    pub event: Address,
    pub holder: Address,
}

/// Verifier-side wallet consent for the consumption transaction.
#[async_trait]
pub trait OperatorApproval: Send + Sync {
    /// Returns `false` when the operator declines. May suspend indefinitely.
    async fn approve(&self, request: &ConsumptionRequest) -> bool;
}

/// Approval policy for an unattended node that owns its signing key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl OperatorApproval for AutoApprove {
    async fn approve(&self, _request: &ConsumptionRequest) -> bool {
        true
    }
}

enum Halt {
    Rejected(RejectionReason),
    Declined,
}

impl From<RejectionReason> for Halt {
    fn from(reason: RejectionReason) -> Self {
        Halt::Rejected(reason)
    }
}

/// Maps a failed `useTicket` submission or receipt to a rejection.
///
/// The Event contract reverts with Turkish messages; the known ones are
/// turned into their business-rule rejection, anything else is kept verbatim.
pub fn classify_revert(reason: &str) -> RejectionReason {
    let lower = reason.to_lowercase();
    if lower.contains("kullanilmis") || lower.contains("kullanılmış") {
        RejectionReason::AlreadyUsed
    } else if lower.contains("bileti yok") {
        RejectionReason::NoTicket
    } else if lower.contains("organizator") || lower.contains("organizatör") {
        RejectionReason::NotOrganizer { reason: reason.to_string() }
    } else if lower.contains("iptal") {
        RejectionReason::EventCancelled
    } else {
        RejectionReason::TransactionFailed { reason: reason.to_string() }
    }
}

fn write_failure(error: LedgerError) -> Halt {
    match error {
        LedgerError::Declined => Halt::Declined,
        LedgerError::TransactionFailed { reason } => Halt::Rejected(classify_revert(&reason)),
        other => Halt::Rejected(RejectionReason::TransactionFailed { reason: other.to_string() }),
    }
}

fn read_failure(error: LedgerError) -> RejectionReason {
    RejectionReason::LedgerUnavailable { detail: error.to_string() }
}

/// Single-scan-at-a-time ticket verifier.
///
/// Every failure is terminal for the attempt and shown until [`reset`](Self::reset);
/// nothing is retried.
pub struct TicketVerifier {
    ledger: Arc<dyn TicketLedger>,
    approval: Arc<dyn OperatorApproval>,
    clock: Arc<dyn Clock>,
    window_ms: i64,
    busy: AtomicBool,
    state: watch::Sender<VerifierState>,
}

/// Releases the busy gate when a scan ends, including when its future is
/// dropped mid-flight. An abandoned scan leaves the verifier idle.
struct BusyGuard<'a> {
    verifier: &'a TicketVerifier,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.verifier.state.send_if_modified(|state| {
            if state.in_flight() {
                debug!("scan abandoned in state {:?}", state);
                *state = VerifierState::Idle;
                true
            } else {
                false
            }
        });
        self.verifier.busy.store(false, Ordering::Release);
    }
}

impl TicketVerifier {
    /// Creates a verifier.
    ///
    /// # Arguments
    /// * `ledger` - Ticket reads and the `useTicket` write
    /// * `approval` - Operator consent hook for the write
    /// * `clock` - Time source for freshness checks
    /// * `window_ms` - Maximum accepted credential age
    pub fn new(
        ledger: Arc<dyn TicketLedger>,
        approval: Arc<dyn OperatorApproval>,
        clock: Arc<dyn Clock>,
        window_ms: i64,
    ) -> Self {
        let (state, _) = watch::channel(VerifierState::Idle);
        Self {
            ledger,
            approval,
            clock,
            window_ms,
            busy: AtomicBool::new(false),
            state,
        }
    }

    pub fn state(&self) -> VerifierState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<VerifierState> {
        self.state.subscribe()
    }

    /// Returns a finished scan to `Idle`.
    ///
    /// Returns `false` and does nothing while a scan is in flight.
    pub fn reset(&self) -> bool {
        if self.busy.load(Ordering::Acquire) {
            return false;
        }
        self.state.send_replace(VerifierState::Idle);
        true
    }

    /// Processes one scanned code.
    ///
    /// Ignored unless the verifier is idle and not busy, so duplicate camera
    /// frames of the same code are dropped.
    pub async fn scan(&self, raw: &str) -> ScanOutcome {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("scan ignored: verification in progress");
            return ScanOutcome::Ignored;
        }
        let _guard = BusyGuard { verifier: self };

        if *self.state.borrow() != VerifierState::Idle {
            debug!("scan ignored: previous result not reset");
            return ScanOutcome::Ignored;
        }

        match self.verify(raw).await {
            Ok(admission) => {
                info!(
                    "ticket admitted: holder {:?} event {:?} tx {:?}",
                    admission.holder, admission.event, admission.tx_hash
                );
                self.state.send_replace(VerifierState::Success(admission.clone()));
                ScanOutcome::Admitted(admission)
            }
            Err(Halt::Rejected(reason)) => {
                if reason.is_forgery_signal() {
                    warn!("possible forgery: {:?}", reason);
                } else {
                    warn!("ticket rejected: {}", reason);
                }
                let rejection = Rejection::from(reason);
                self.state.send_replace(VerifierState::Failure(rejection.clone()));
                ScanOutcome::Rejected(rejection)
            }
            Err(Halt::Declined) => {
                info!("ticket consumption declined by operator");
                self.state.send_replace(VerifierState::Idle);
                ScanOutcome::Cancelled
            }
        }
    }

    fn enter(&self, next: VerifierState) {
        debug!("verifier -> {:?}", next);
        self.state.send_replace(next);
    }

    async fn verify(&self, raw: &str) -> Result<Admission, Halt> {
        self.enter(VerifierState::Decoding);
        let credential = decode_credential(raw).map_err(|e| RejectionReason::InvalidFormat {
            detail: e.to_string(),
        })?;

        // Forgeries are reported as such even when stale.
        self.enter(VerifierState::SignatureCheck);
        let holder = self.authenticate(&credential)?;
        let age_millis = credential.age_millis(self.clock.now_millis());
        // The window applies on both sides of the issue time.
        if age_millis > self.window_ms || age_millis < -self.window_ms {
            return Err(RejectionReason::Expired { age_millis }.into());
        }
        let event: Address = credential
            .target_context
            .parse()
            .map_err(|_| RejectionReason::InvalidFormat {
                detail: format!("`{}` is not an event address", credential.target_context),
            })?;

        self.enter(VerifierState::EligibilityCheck);
        if !self.ledger.has_ticket(event, holder).await.map_err(read_failure)? {
            return Err(RejectionReason::NoTicket.into());
        }
        if self.ledger.is_ticket_used(event, holder).await.map_err(read_failure)? {
            return Err(RejectionReason::AlreadyUsed.into());
        }

        self.enter(VerifierState::AwaitingConfirmation);
        if !self.approval.approve(&ConsumptionRequest { event, holder }).await {
            return Err(Halt::Declined);
        }

        self.enter(VerifierState::Submitting);
        let tx_hash = self.ledger.use_ticket(event, holder).await.map_err(write_failure)?;

        self.enter(VerifierState::Confirming);
        let receipt = self.ledger.wait_for_receipt(tx_hash).await.map_err(write_failure)?;

        let event_name = match self.ledger.event_name(event).await {
            Ok(name) => Some(name),
            Err(e) => {
                warn!("ticket consumed but event name lookup failed: {}", e);
                None
            }
        };

        Ok(Admission {
            event,
            holder,
            event_name,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
        })
    }

    /// Recovers the signer and checks it against the claimed holder.
    fn authenticate(&self, credential: &GateCredential) -> Result<Address, RejectionReason> {
        let mismatch = |recovered| RejectionReason::SignatureMismatch {
            claimed: credential.subject_address.clone(),
            recovered,
        };

        match recover_signer(&credential.message(), &credential.signature) {
            Ok(recovered) if address_matches(&recovered, &credential.subject_address) => Ok(recovered),
            Ok(recovered) => Err(mismatch(Some(recovered))),
            Err(e) => {
                debug!("signature unrecoverable: {}", e);
                Err(mismatch(None))
            }
        }
    }
}
