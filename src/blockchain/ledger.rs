// src/blockchain/ledger.rs
//! Ledger ports.
//!
//! Services talk to the chain only through these traits. The production
//! adapter is [`EthClient`](crate::blockchain::eth_client::EthClient); tests
//! plug in in-memory doubles.

use crate::models::event::{EventListing, ValidatedEvent};
use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use serde::Serialize;
use thiserror::Error;

/// Failures surfaced by any ledger interaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// RPC endpoint unreachable or returned a transport error.
    #[error("network error: {0}")]
    Network(String),

    /// A view call reverted or returned undecodable data.
    #[error("contract read failed: {0}")]
    ContractRead(String),

    /// The signing wallet refused to sign or send.
    #[error("request was declined by the wallet")]
    Declined,

    /// A write reverted, was dropped, or could not be broadcast.
    #[error("transaction failed: {reason}")]
    TransactionFailed { reason: String },
}

/// A mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedTransaction {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

/// Per-event ticket reads and the one-time ticket consumption write.
#[async_trait]
pub trait TicketLedger: Send + Sync {
    async fn has_ticket(&self, event: Address, holder: Address) -> Result<bool, LedgerError>;

    async fn is_ticket_used(&self, event: Address, holder: Address) -> Result<bool, LedgerError>;

    /// Human-readable event name.
    async fn event_name(&self, event: Address) -> Result<String, LedgerError>;

    /// Submits `useTicket(holder)` from the operator wallet; resolves once broadcast.
    async fn use_ticket(&self, event: Address, holder: Address) -> Result<TxHash, LedgerError>;

    /// Suspends until `tx_hash` is mined.
    ///
    /// # Errors
    /// `TransactionFailed` if it reverted or was dropped.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<ConfirmedTransaction, LedgerError>;
}

/// Factory enumeration, event details and the remaining event writes.
#[async_trait]
pub trait EventDirectory: Send + Sync {
    async fn deployed_events(&self) -> Result<Vec<Address>, LedgerError>;

    async fn event_listing(&self, event: Address) -> Result<EventListing, LedgerError>;

    /// Native balance held by the event contract (uncollected revenue).
    async fn event_balance(&self, event: Address) -> Result<U256, LedgerError>;

    async fn has_ticket(&self, event: Address, holder: Address) -> Result<bool, LedgerError>;

    async fn is_ticket_used(&self, event: Address, holder: Address) -> Result<bool, LedgerError>;

    async fn create_event(&self, event: &ValidatedEvent) -> Result<TxHash, LedgerError>;

    /// `buyTicket()` paying exactly `price`.
    async fn buy_ticket(&self, event: Address, price: U256) -> Result<TxHash, LedgerError>;

    async fn request_refund(&self, event: Address) -> Result<TxHash, LedgerError>;

    async fn withdraw_revenue(&self, event: Address) -> Result<TxHash, LedgerError>;

    async fn cancel_event(&self, event: Address) -> Result<TxHash, LedgerError>;

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<ConfirmedTransaction, LedgerError>;

    /// Address of the wallet that signs writes.
    fn operator(&self) -> Address;
}

/// Polled view of the connected chain, used for change subscriptions.
#[async_trait]
pub trait ChainProbe: Send + Sync {
    async fn chain_id(&self) -> Result<u64, LedgerError>;

    async fn active_account(&self) -> Result<Option<Address>, LedgerError>;

    /// Whether the active account can change while this source is alive.
    /// Watchers skip the account poll when it cannot.
    fn account_can_change(&self) -> bool {
        true
    }
}

/// Heuristic wallet-rejection detection on provider error text.
pub(crate) fn is_user_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("user rejected") || lower.contains("user denied") || lower.contains("rejected by user")
}
