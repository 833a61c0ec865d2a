// src/services/organizer.rs
//! Organizer dashboard and organizer-only writes.

use crate::blockchain::ledger::{ConfirmedTransaction, EventDirectory};
use crate::models::event::EventListing;
use crate::services::event_catalog::{load_listings, CatalogError};
use crate::utils::clock::Clock;
use crate::utils::format::format_eth;
use ethers::types::{Address, U256};
use futures::future::join_all;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

/// One of the organizer's events with its revenue state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizerEvent {
    pub listing: EventListing,
    /// Uncollected revenue held by the event contract, in wei.
    pub balance: U256,
    pub balance_eth: String,
    pub sell_through_percent: u64,
    pub can_withdraw: bool,
    pub can_cancel: bool,
}

impl OrganizerEvent {
    pub fn new(listing: EventListing, balance: U256, now_secs: i64) -> Self {
        let started = listing.has_started(now_secs);
        Self {
            balance_eth: format_eth(balance),
            sell_through_percent: listing.sell_through_percent(),
            can_withdraw: !balance.is_zero() && !listing.is_cancelled && started,
            can_cancel: !listing.is_cancelled && !started,
            listing,
            balance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub organizer: Address,
    pub events: Vec<OrganizerEvent>,
    /// Sum of balances of non-cancelled events.
    pub total_revenue: U256,
    pub total_revenue_eth: String,
    /// Tickets sold across non-cancelled events.
    pub tickets_sold: u64,
}

/// Organizer-facing view of the factory's events.
pub struct OrganizerDesk {
    directory: Arc<dyn EventDirectory>,
    clock: Arc<dyn Clock>,
}

impl OrganizerDesk {
    pub fn new(directory: Arc<dyn EventDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self { directory, clock }
    }

    /// Every event organized by `organizer`, with balances and totals.
    ///
    /// Events whose balance cannot be read are left out.
    pub async fn dashboard(&self, organizer: Address) -> Result<Dashboard, CatalogError> {
        let now = self.clock.now_secs();
        let owned: Vec<EventListing> = load_listings(self.directory.as_ref())
            .await?
            .into_iter()
            .filter(|listing| listing.organizer == organizer)
            .collect();

        let balances = join_all(owned.iter().map(|l| self.directory.event_balance(l.address))).await;

        let events: Vec<OrganizerEvent> = owned
            .into_iter()
            .zip(balances)
            .filter_map(|(listing, balance)| match balance {
                Ok(balance) => Some(OrganizerEvent::new(listing, balance, now)),
                Err(e) => {
                    warn!("skipping balance of {:?}: {}", listing.address, e);
                    None
                }
            })
            .collect();

        let live = events.iter().filter(|e| !e.listing.is_cancelled);
        let total_revenue = live.clone().fold(U256::zero(), |sum, e| sum + e.balance);
        let tickets_sold: u64 = live.map(|e| e.listing.sold_count).sum();

        Ok(Dashboard {
            organizer,
            events,
            total_revenue,
            total_revenue_eth: format_eth(total_revenue),
            tickets_sold,
        })
    }

    /// Withdraws an event's revenue to the node wallet.
    pub async fn withdraw(&self, event: Address) -> Result<ConfirmedTransaction, CatalogError> {
        let current = self.fresh(event).await?;
        if !current.can_withdraw {
            return Err(CatalogError::WithdrawNotAvailable);
        }

        let tx_hash = self.directory.withdraw_revenue(event).await?;
        let receipt = self.directory.wait_for_receipt(tx_hash).await?;
        info!("withdrew {} ETH from {}", current.balance_eth, current.listing.name);
        Ok(receipt)
    }

    /// Cancels an event that has not started; holders can then refund.
    pub async fn cancel(&self, event: Address) -> Result<ConfirmedTransaction, CatalogError> {
        let current = self.fresh(event).await?;
        if !current.can_cancel {
            return Err(CatalogError::CancelNotAvailable);
        }

        let tx_hash = self.directory.cancel_event(event).await?;
        let receipt = self.directory.wait_for_receipt(tx_hash).await?;
        info!("cancelled {}", current.listing.name);
        Ok(receipt)
    }

    /// Re-reads `event` and checks the node wallet organizes it.
    async fn fresh(&self, event: Address) -> Result<OrganizerEvent, CatalogError> {
        let listing = self.directory.event_listing(event).await?;
        let operator = self.directory.operator();
        if listing.organizer != operator {
            return Err(CatalogError::NotOrganizer(operator));
        }
        let balance = self.directory.event_balance(event).await?;
        Ok(OrganizerEvent::new(listing, balance, self.clock.now_secs()))
    }
}
