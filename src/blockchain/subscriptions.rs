// src/blockchain/subscriptions.rs
//! Chain and account change notifications.
//!
//! HTTP providers have no push channel for network or account switches, so
//! the watcher polls a [`ChainProbe`] on an interval and broadcasts the
//! differences. Polling stops when the returned [`Subscription`] is dropped.

use crate::blockchain::ledger::ChainProbe;
use ethers::types::Address;
use log::{debug, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const CHANNEL_CAPACITY: usize = 16;

/// A change observed on the connected chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainEvent {
    ChainChanged { chain_id: u64, expected: u64 },
    AccountChanged { account: Option<Address> },
}

/// Handle owning the polling task. Dropping it stops the task.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn cancel(self) {
        // Drop does the work.
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct ChainWatcher;

impl ChainWatcher {
    /// Starts polling `probe` every `interval`.
    ///
    /// The first poll only records a baseline. A warning is logged whenever
    /// the observed chain differs from `expected_chain_id`. The account is
    /// only polled when [`ChainProbe::account_can_change`] says it may move.
    ///
    /// # Returns
    /// The subscription handle and a receiver of [`ChainEvent`]s; more
    /// receivers can be made with `resubscribe`.
    pub fn spawn(
        probe: Arc<dyn ChainProbe>,
        expected_chain_id: u64,
        interval: Duration,
    ) -> (Subscription, broadcast::Receiver<ChainEvent>) {
        let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(poll(probe, expected_chain_id, interval, sender));
        (Subscription { task }, receiver)
    }
}

async fn poll(
    probe: Arc<dyn ChainProbe>,
    expected: u64,
    interval: Duration,
    sender: broadcast::Sender<ChainEvent>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_chain: Option<u64> = None;
    let mut last_account: Option<Option<Address>> = None;
    let watch_account = probe.account_can_change();

    loop {
        ticker.tick().await;

        match probe.chain_id().await {
            Ok(chain_id) => {
                if last_chain != Some(chain_id) {
                    if chain_id != expected {
                        warn!("connected to chain {}, expected {}", chain_id, expected);
                    }
                    if last_chain.is_some() {
                        let _ = sender.send(ChainEvent::ChainChanged { chain_id, expected });
                    }
                    last_chain = Some(chain_id);
                }
            }
            Err(e) => debug!("chain id poll failed: {}", e),
        }

        if !watch_account {
            continue;
        }
        match probe.active_account().await {
            Ok(account) => {
                if last_account != Some(account) {
                    if last_account.is_some() {
                        let _ = sender.send(ChainEvent::AccountChanged { account });
                    }
                    last_account = Some(account);
                }
            }
            Err(e) => debug!("account poll failed: {}", e),
        }
    }
}
