// src/services/event_catalog.rs
//! Public event catalog: discovery, browsing, purchase and creation.

use crate::blockchain::ledger::{ConfirmedTransaction, EventDirectory, LedgerError};
use crate::models::event::{DraftError, EventDraft, EventListing, EventQuery};
use crate::utils::clock::Clock;
use chrono::FixedOffset;
use ethers::types::Address;
use futures::future::join_all;
use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the catalog, ticket wallet and organizer desk.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("event {0:?} is not deployed by the factory")]
    UnknownEvent(Address),

    #[error("ticket cannot be bought: {0}")]
    Unavailable(PurchaseAvailability),

    #[error("refund is only available for cancelled events you hold a ticket for")]
    RefundNotAvailable,

    #[error("revenue can only be withdrawn after a non-cancelled event has started and while a balance remains")]
    WithdrawNotAvailable,

    #[error("only events that have not started can be cancelled")]
    CancelNotAvailable,

    #[error("node wallet {0:?} is not the organizer of this event")]
    NotOrganizer(Address),

    #[error(transparent)]
    Draft(#[from] DraftError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Whether a given wallet may buy a ticket right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseAvailability {
    Available,
    AlreadyOwned,
    SoldOut,
    SalesClosed,
    Cancelled,
}

impl PurchaseAvailability {
    /// Decides availability. Cancellation wins over ownership, which wins over
    /// the sales window, which wins over capacity.
    pub fn of(listing: &EventListing, owned: bool, now_secs: i64) -> Self {
        if listing.is_cancelled {
            PurchaseAvailability::Cancelled
        } else if owned {
            PurchaseAvailability::AlreadyOwned
        } else if listing.has_started(now_secs) {
            PurchaseAvailability::SalesClosed
        } else if listing.is_sold_out() {
            PurchaseAvailability::SoldOut
        } else {
            PurchaseAvailability::Available
        }
    }
}

impl fmt::Display for PurchaseAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PurchaseAvailability::Available => "available",
            PurchaseAvailability::AlreadyOwned => "already owned",
            PurchaseAvailability::SoldOut => "sold out",
            PurchaseAvailability::SalesClosed => "sales closed",
            PurchaseAvailability::Cancelled => "event cancelled",
        };
        f.write_str(text)
    }
}

/// Fetches every factory deployment concurrently.
///
/// Events whose core fields cannot be read are skipped with a warning.
pub(crate) async fn load_listings(directory: &dyn EventDirectory) -> Result<Vec<EventListing>, LedgerError> {
    let addresses = directory.deployed_events().await?;
    let results = join_all(addresses.iter().map(|address| directory.event_listing(*address))).await;

    Ok(addresses
        .into_iter()
        .zip(results)
        .filter_map(|(address, result)| match result {
            Ok(listing) => Some(listing),
            Err(e) => {
                warn!("skipping event {:?}: {}", address, e);
                None
            }
        })
        .collect())
}

/// Event discovery and purchase on behalf of the node wallet.
pub struct EventCatalog {
    directory: Arc<dyn EventDirectory>,
    clock: Arc<dyn Clock>,
    /// Zone in which organizers' date and time strings are read.
    offset: FixedOffset,
}

impl EventCatalog {
    pub fn new(directory: Arc<dyn EventDirectory>, clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self { directory, clock, offset }
    }

    /// Every readable event, in factory order.
    pub async fn load_events(&self) -> Result<Vec<EventListing>, CatalogError> {
        Ok(load_listings(self.directory.as_ref()).await?)
    }

    /// Upcoming, non-cancelled events matching `query`, sorted by `query.sort`.
    pub async fn browse(&self, query: &EventQuery) -> Result<Vec<EventListing>, CatalogError> {
        let now = self.clock.now_secs();
        let mut events: Vec<EventListing> = self
            .load_events()
            .await?
            .into_iter()
            .filter(|listing| !listing.is_cancelled && !listing.has_started(now) && query.matches(listing))
            .collect();
        events.sort_by(|a, b| query.sort.compare(a, b));
        Ok(events)
    }

    /// A single listing.
    ///
    /// # Errors
    /// `UnknownEvent` when the factory never deployed `address`.
    pub async fn event(&self, address: Address) -> Result<EventListing, CatalogError> {
        if !self.directory.deployed_events().await?.contains(&address) {
            return Err(CatalogError::UnknownEvent(address));
        }
        Ok(self.directory.event_listing(address).await?)
    }

    pub async fn purchase_availability(
        &self,
        event: Address,
        buyer: Address,
    ) -> Result<PurchaseAvailability, CatalogError> {
        let listing = self.event(event).await?;
        let owned = self.directory.has_ticket(event, buyer).await?;
        Ok(PurchaseAvailability::of(&listing, owned, self.clock.now_secs()))
    }

    /// Buys one ticket with the node wallet, paying exactly the listed price.
    pub async fn buy_ticket(&self, event: Address) -> Result<ConfirmedTransaction, CatalogError> {
        let buyer = self.directory.operator();
        let listing = self.event(event).await?;
        let owned = self.directory.has_ticket(event, buyer).await?;

        match PurchaseAvailability::of(&listing, owned, self.clock.now_secs()) {
            PurchaseAvailability::Available => {}
            other => return Err(CatalogError::Unavailable(other)),
        }

        let tx_hash = self.directory.buy_ticket(event, listing.price).await?;
        let receipt = self.directory.wait_for_receipt(tx_hash).await?;
        info!("bought ticket for {} ({:?})", listing.name, receipt.tx_hash);
        Ok(receipt)
    }

    /// Validates `draft` and deploys it through the factory.
    pub async fn create_event(&self, draft: &EventDraft) -> Result<ConfirmedTransaction, CatalogError> {
        let validated = draft.validate(self.clock.now_secs(), self.offset)?;
        let tx_hash = self.directory.create_event(&validated).await?;
        let receipt = self.directory.wait_for_receipt(tx_hash).await?;
        info!("created event {} ({:?})", validated.name, receipt.tx_hash);
        Ok(receipt)
    }
}
