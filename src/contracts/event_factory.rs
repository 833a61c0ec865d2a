// src/contracts/event_factory.rs
//! EventFactory contract interface.
//!
//! The factory deploys one Event contract per `createEvent` call and keeps
//! the list of every deployment, which is how the catalog discovers events.

use crate::blockchain::eth_client::EthClient;
use crate::blockchain::ledger::LedgerError;
use crate::models::event::ValidatedEvent;
use ethers_core::abi::{parse_abi, Abi};
use ethers_core::types::{Address, TxHash};
use once_cell::sync::Lazy;

/// Human-readable ABI of the EventFactory contract.
pub static FACTORY_ABI: Lazy<Abi> = Lazy::new(|| {
    parse_abi(&[
        "function createEvent(string,string,string,string,string,string,string,string,uint256,uint256,uint256) public",
        "function getDeployedEvents() public view returns (address[])",
    ])
    .expect("Failed to parse EventFactory ABI")
});

/// EventFactory wrapper.
pub struct EventFactory<'a> {
    client: &'a EthClient,
    address: Address,
}

impl<'a> EventFactory<'a> {
    pub fn new(client: &'a EthClient, address: Address) -> Self {
        Self { client, address }
    }

    /// Every Event contract the factory has deployed, oldest first.
    pub async fn deployed_events(&self) -> Result<Vec<Address>, LedgerError> {
        self.client
            .query_contract(self.address, &FACTORY_ABI, "getDeployedEvents", ())
            .await
    }

    /// Deploys a new Event contract owned by the operator wallet.
    ///
    /// # Arguments
    /// * `event` - Validated draft; argument order matches the contract's constructor
    pub async fn create_event(&self, event: &ValidatedEvent) -> Result<TxHash, LedgerError> {
        let params = (
            event.name.clone(),
            event.date.clone(),
            event.time.clone(),
            event.image_url.clone(),
            event.location_name.clone(),
            event.city.clone(),
            event.country.clone(),
            event.maps_link.clone(),
            event.price,
            event.capacity,
            event.event_timestamp,
        );

        self.client
            .send_transaction(self.address, &FACTORY_ABI, "createEvent", params, None)
            .await
    }
}
