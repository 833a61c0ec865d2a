// src/blockchain/mod.rs
pub mod eth_client;
pub mod ledger;
pub mod subscriptions;

#[cfg(test)]
pub(crate) mod testing;
