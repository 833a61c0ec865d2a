// src/contracts/event_contract.rs
//! Event contract interface.
//!
//! One Event contract is deployed per event by the factory. It stores the
//! event's schedule, capacity and price, and tracks per-address ticket
//! ownership, refunds and door usage.

use crate::blockchain::eth_client::EthClient;
use crate::blockchain::ledger::LedgerError;
use crate::models::event::EventListing;
use crate::utils::format::clean_maps_link;
use ethers_core::abi::{parse_abi, Abi, Detokenize, Tokenize};
use ethers_core::types::{Address, TxHash, U256};
use once_cell::sync::Lazy;

/// Human-readable ABI of the Event contract.
pub static EVENT_ABI: Lazy<Abi> = Lazy::new(|| {
    parse_abi(&[
        "function name() view returns (string)",
        "function date() view returns (string)",
        "function time() view returns (string)",
        "function imageURL() view returns (string)",
        "function locationName() view returns (string)",
        "function city() view returns (string)",
        "function country() view returns (string)",
        "function mapsLink() view returns (string)",
        "function price() view returns (uint256)",
        "function capacity() view returns (uint256)",
        "function soldCount() view returns (uint256)",
        "function organizer() view returns (address)",
        "function isCancelled() view returns (bool)",
        "function eventTimestamp() view returns (uint256)",
        "function hasTicket(address) view returns (bool)",
        "function isRefunded(address) view returns (bool)",
        "function isTicketUsed(address) view returns (bool)",
        "function buyTicket() external payable",
        "function cancelEvent() external",
        "function getRefund() external",
        "function withdraw() external",
        "function useTicket(address) external",
    ])
    .expect("Failed to parse Event ABI")
});

/// Event contract wrapper bound to one deployed address.
pub struct EventContract<'a> {
    client: &'a EthClient,
    address: Address,
}

impl<'a> EventContract<'a> {
    pub fn new(client: &'a EthClient, address: Address) -> Self {
        Self { client, address }
    }

    async fn read<R: Detokenize>(&self, method: &str, params: impl Tokenize) -> Result<R, LedgerError> {
        self.client
            .query_contract(self.address, &EVENT_ABI, method, params)
            .await
    }

    async fn write(&self, method: &str, params: impl Tokenize, value: Option<U256>) -> Result<TxHash, LedgerError> {
        self.client
            .send_transaction(self.address, &EVENT_ABI, method, params, value)
            .await
    }

    pub async fn name(&self) -> Result<String, LedgerError> {
        self.read("name", ()).await
    }

    pub async fn has_ticket(&self, holder: Address) -> Result<bool, LedgerError> {
        self.read("hasTicket", holder).await
    }

    pub async fn is_ticket_used(&self, holder: Address) -> Result<bool, LedgerError> {
        self.read("isTicketUsed", holder).await
    }

    /// Reads every field of the event.
    ///
    /// Core fields are fetched concurrently and any failure fails the whole
    /// listing. Venue fields were added to the contract later, so older
    /// deployments may not expose them; those fall back to empty strings.
    pub async fn listing(&self) -> Result<EventListing, LedgerError> {
        let (name, date, time, image_url, price, capacity, sold_count, organizer, is_cancelled, event_timestamp) =
            futures::try_join!(
                self.read::<String>("name", ()),
                self.read::<String>("date", ()),
                self.read::<String>("time", ()),
                self.read::<String>("imageURL", ()),
                self.read::<U256>("price", ()),
                self.read::<U256>("capacity", ()),
                self.read::<U256>("soldCount", ()),
                self.read::<Address>("organizer", ()),
                self.read::<bool>("isCancelled", ()),
                self.read::<U256>("eventTimestamp", ()),
            )?;

        let (location_name, city, country, maps_link) = futures::join!(
            self.read::<String>("locationName", ()),
            self.read::<String>("city", ()),
            self.read::<String>("country", ()),
            self.read::<String>("mapsLink", ()),
        );

        Ok(EventListing {
            address: self.address,
            organizer,
            name,
            date,
            time,
            image_url,
            location_name: location_name.unwrap_or_default(),
            city: city.unwrap_or_default(),
            country: country.unwrap_or_default(),
            maps_link: clean_maps_link(&maps_link.unwrap_or_default()),
            price,
            capacity: to_u64(capacity, "capacity")?,
            sold_count: to_u64(sold_count, "soldCount")?,
            is_cancelled,
            event_timestamp: to_u64(event_timestamp, "eventTimestamp")?,
        })
    }

    /// Marks `holder`'s ticket as used. Only the organizer may call this.
    pub async fn use_ticket(&self, holder: Address) -> Result<TxHash, LedgerError> {
        self.write("useTicket", holder, None).await
    }

    pub async fn buy_ticket(&self, price: U256) -> Result<TxHash, LedgerError> {
        self.write("buyTicket", (), Some(price)).await
    }

    pub async fn cancel_event(&self) -> Result<TxHash, LedgerError> {
        self.write("cancelEvent", (), None).await
    }

    pub async fn get_refund(&self) -> Result<TxHash, LedgerError> {
        self.write("getRefund", (), None).await
    }

    pub async fn withdraw(&self) -> Result<TxHash, LedgerError> {
        self.write("withdraw", (), None).await
    }
}

fn to_u64(value: U256, field: &str) -> Result<u64, LedgerError> {
    if value > U256::from(u64::MAX) {
        return Err(LedgerError::ContractRead(format!("{} does not fit in 64 bits: {}", field, value)));
    }
    Ok(value.as_u64())
}
