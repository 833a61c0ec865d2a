// src/wallet/ticket_wallet.rs
//! Holder's view of owned tickets.
//!
//! Provides an in-memory snapshot of every ticket a wallet holds across all
//! factory deployments, split into the active and past tabs the holder sees,
//! plus the one holder-side write: refunding a cancelled event.

use crate::blockchain::ledger::{ConfirmedTransaction, EventDirectory, LedgerError};
use crate::models::event::EventListing;
use crate::services::event_catalog::{load_listings, CatalogError};
use ethers::types::Address;
use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketTab {
    #[default]
    Active,
    Past,
}

/// Display status of a ticket, highest precedence first.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Cancelled,
    Used,
    Past,
    Active,
}

/// What the holder can do with a ticket.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketAction {
    Refund,
    Details,
    ShowQr,
}

/// One ticket held by the wallet.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct OwnedTicket {
    pub event: EventListing,
    pub is_used: bool,
    pub status: TicketStatus,
    pub tab: TicketTab,
    pub action: TicketAction,
}

impl OwnedTicket {
    /// Classifies a held ticket at `now_secs`.
    pub fn classify(event: EventListing, is_used: bool, now_secs: i64) -> Self {
        let past = event.has_started(now_secs);

        let tab = if past || event.is_cancelled {
            TicketTab::Past
        } else {
            TicketTab::Active
        };
        let status = if event.is_cancelled {
            TicketStatus::Cancelled
        } else if is_used {
            TicketStatus::Used
        } else if past {
            TicketStatus::Past
        } else {
            TicketStatus::Active
        };
        let action = if event.is_cancelled {
            TicketAction::Refund
        } else if tab == TicketTab::Past {
            TicketAction::Details
        } else {
            TicketAction::ShowQr
        };

        Self { event, is_used, status, tab, action }
    }
}

/// Tickets held by one wallet, keyed by event address.
pub struct TicketWallet {
    holder: Address,
    tickets: BTreeMap<Address, OwnedTicket>,
}

impl TicketWallet {
    /// Loads every ticket `holder` owns.
    ///
    /// # Arguments
    /// * `directory` - Ledger to read events and ownership from
    /// * `holder` - Wallet whose tickets are listed
    /// * `now_secs` - Time used to split active from past tickets
    ///
    /// Events whose ownership cannot be read are left out.
    pub async fn load(
        directory: &dyn EventDirectory,
        holder: Address,
        now_secs: i64,
    ) -> Result<Self, CatalogError> {
        let listings = load_listings(directory).await?;

        let ownership = join_all(
            listings
                .iter()
                .map(|listing| ticket_usage(directory, listing.address, holder)),
        )
        .await;

        let mut tickets = BTreeMap::new();
        for (listing, owned) in listings.into_iter().zip(ownership) {
            match owned {
                Ok(Some(is_used)) => {
                    tickets.insert(listing.address, OwnedTicket::classify(listing, is_used, now_secs));
                }
                Ok(None) => {}
                Err(e) => warn!("skipping ticket check for {:?}: {}", listing.address, e),
            }
        }

        Ok(TicketWallet { holder, tickets })
    }

    pub fn holder(&self) -> Address {
        self.holder
    }

    pub fn count_tickets(&self) -> usize {
        self.tickets.len()
    }

    /// Tickets shown under `tab`, soonest event first.
    pub fn in_tab(&self, tab: TicketTab) -> Vec<&OwnedTicket> {
        let mut tickets: Vec<_> = self.tickets.values().filter(|t| t.tab == tab).collect();
        tickets.sort_by_key(|t| t.event.event_timestamp);
        tickets
    }
}

/// `None` when `holder` has no ticket, otherwise whether it was used.
async fn ticket_usage(
    directory: &dyn EventDirectory,
    event: Address,
    holder: Address,
) -> Result<Option<bool>, LedgerError> {
    if !directory.has_ticket(event, holder).await? {
        return Ok(None);
    }
    directory.is_ticket_used(event, holder).await.map(Some)
}

/// Refunds the node wallet's ticket for a cancelled event.
///
/// # Errors
/// `RefundNotAvailable` unless the event is cancelled and the node wallet
/// still holds a ticket for it.
pub async fn request_refund(
    directory: &dyn EventDirectory,
    event: Address,
) -> Result<ConfirmedTransaction, CatalogError> {
    let listing = directory.event_listing(event).await?;
    let holds = directory.has_ticket(event, directory.operator()).await?;
    if !listing.is_cancelled || !holds {
        return Err(CatalogError::RefundNotAvailable);
    }

    let tx_hash = directory.request_refund(event).await?;
    let receipt = directory.wait_for_receipt(tx_hash).await?;
    info!("refunded ticket for {} ({:?})", listing.name, receipt.tx_hash);
    Ok(receipt)
}
