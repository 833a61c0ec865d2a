// src/blockchain/testing.rs
//! In-memory ledger double shared by service tests.

use crate::blockchain::ledger::{ConfirmedTransaction, EventDirectory, LedgerError, TicketLedger};
use crate::models::event::{EventListing, ValidatedEvent};
use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// A write the code under test submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    pub method: &'static str,
    pub event: Address,
    pub holder: Option<Address>,
    pub value: Option<U256>,
}

#[derive(Default)]
pub struct MockState {
    pub events: Vec<EventListing>,
    pub balances: HashMap<Address, U256>,
    pub tickets: HashSet<(Address, Address)>,
    pub used: HashSet<(Address, Address)>,
    pub unreadable: HashSet<Address>,
    pub reads: usize,
    pub writes: Vec<WriteCall>,
    pub created: Vec<ValidatedEvent>,
    pub read_error: Option<LedgerError>,
    pub name_error: Option<LedgerError>,
    pub write_error: Option<LedgerError>,
    pub receipt_error: Option<LedgerError>,
    next_tx: u64,
}

/// Ledger that behaves like the Event contracts, in memory, and records calls.
pub struct MockLedger {
    operator: Address,
    state: Mutex<MockState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new(Address::from_low_u64_be(0xbeef))
    }
}

impl MockLedger {
    pub fn new(operator: Address) -> Self {
        Self { operator, state: Mutex::new(MockState::default()) }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn with_event(self, listing: EventListing) -> Self {
        self.state().events.push(listing);
        self
    }

    pub fn grant_ticket(&self, event: Address, holder: Address) {
        self.state().tickets.insert((event, holder));
    }

    pub fn mark_used(&self, event: Address, holder: Address) {
        self.state().used.insert((event, holder));
    }

    pub fn set_balance(&self, event: Address, balance: U256) {
        self.state().balances.insert(event, balance);
    }

    pub fn read_count(&self) -> usize {
        self.state().reads
    }

    pub fn writes(&self) -> Vec<WriteCall> {
        self.state().writes.clone()
    }

    fn read(&self) -> Result<MutexGuard<'_, MockState>, LedgerError> {
        let mut state = self.state();
        state.reads += 1;
        match state.read_error.clone() {
            Some(e) => Err(e),
            None => Ok(state),
        }
    }

    fn write(
        &self,
        method: &'static str,
        event: Address,
        holder: Option<Address>,
        value: Option<U256>,
        apply: impl FnOnce(&mut MockState),
    ) -> Result<TxHash, LedgerError> {
        let mut state = self.state();
        state.writes.push(WriteCall { method, event, holder, value });
        if let Some(e) = state.write_error.clone() {
            return Err(e);
        }
        apply(&mut state);
        state.next_tx += 1;
        Ok(TxHash::from_low_u64_be(state.next_tx))
    }

    fn receipt(&self, tx_hash: TxHash) -> Result<ConfirmedTransaction, LedgerError> {
        match self.state().receipt_error.clone() {
            Some(e) => Err(e),
            None => Ok(ConfirmedTransaction { tx_hash, block_number: Some(1) }),
        }
    }

    fn listing_mut<'a>(state: &'a mut MockState, event: Address) -> Option<&'a mut EventListing> {
        state.events.iter_mut().find(|l| l.address == event)
    }
}

#[async_trait]
impl TicketLedger for MockLedger {
    async fn has_ticket(&self, event: Address, holder: Address) -> Result<bool, LedgerError> {
        Ok(self.read()?.tickets.contains(&(event, holder)))
    }

    async fn is_ticket_used(&self, event: Address, holder: Address) -> Result<bool, LedgerError> {
        Ok(self.read()?.used.contains(&(event, holder)))
    }

    async fn event_name(&self, event: Address) -> Result<String, LedgerError> {
        let state = self.read()?;
        if let Some(e) = state.name_error.clone() {
            return Err(e);
        }
        state
            .events
            .iter()
            .find(|l| l.address == event)
            .map(|l| l.name.clone())
            .ok_or_else(|| LedgerError::ContractRead("no such event".into()))
    }

    async fn use_ticket(&self, event: Address, holder: Address) -> Result<TxHash, LedgerError> {
        self.write("useTicket", event, Some(holder), None, |s| {
            s.used.insert((event, holder));
        })
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<ConfirmedTransaction, LedgerError> {
        self.receipt(tx_hash)
    }
}

#[async_trait]
impl EventDirectory for MockLedger {
    async fn deployed_events(&self) -> Result<Vec<Address>, LedgerError> {
        Ok(self.read()?.events.iter().map(|l| l.address).collect())
    }

    async fn event_listing(&self, event: Address) -> Result<EventListing, LedgerError> {
        let state = self.read()?;
        if state.unreadable.contains(&event) {
            return Err(LedgerError::ContractRead("execution reverted".into()));
        }
        state
            .events
            .iter()
            .find(|l| l.address == event)
            .cloned()
            .ok_or_else(|| LedgerError::ContractRead("no such event".into()))
    }

    async fn event_balance(&self, event: Address) -> Result<U256, LedgerError> {
        Ok(self.read()?.balances.get(&event).copied().unwrap_or_default())
    }

    async fn has_ticket(&self, event: Address, holder: Address) -> Result<bool, LedgerError> {
        TicketLedger::has_ticket(self, event, holder).await
    }

    async fn is_ticket_used(&self, event: Address, holder: Address) -> Result<bool, LedgerError> {
        TicketLedger::is_ticket_used(self, event, holder).await
    }

    async fn create_event(&self, event: &ValidatedEvent) -> Result<TxHash, LedgerError> {
        let factory = Address::from_low_u64_be(0xfac7);
        let created = event.clone();
        self.write("createEvent", factory, None, None, |s| s.created.push(created))
    }

    async fn buy_ticket(&self, event: Address, price: U256) -> Result<TxHash, LedgerError> {
        let buyer = self.operator;
        self.write("buyTicket", event, Some(buyer), Some(price), |s| {
            s.tickets.insert((event, buyer));
            if let Some(listing) = Self::listing_mut(s, event) {
                listing.sold_count += 1;
            }
        })
    }

    async fn request_refund(&self, event: Address) -> Result<TxHash, LedgerError> {
        let holder = self.operator;
        self.write("getRefund", event, Some(holder), None, |s| {
            s.tickets.remove(&(event, holder));
        })
    }

    async fn withdraw_revenue(&self, event: Address) -> Result<TxHash, LedgerError> {
        self.write("withdraw", event, None, None, |s| {
            s.balances.insert(event, U256::zero());
        })
    }

    async fn cancel_event(&self, event: Address) -> Result<TxHash, LedgerError> {
        self.write("cancelEvent", event, None, None, |s| {
            if let Some(listing) = Self::listing_mut(s, event) {
                listing.is_cancelled = true;
            }
        })
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<ConfirmedTransaction, LedgerError> {
        self.receipt(tx_hash)
    }

    fn operator(&self) -> Address {
        self.operator
    }
}
