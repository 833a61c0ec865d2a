// src/main.rs

//! # Ticket Gate - Main Entry Point
//!
//! This module serves as the main entry point for the ticket gate node.
//! It initializes all core components and starts the API server.
//!
//! ## Architecture Overview
//! 1. **Blockchain Layer**: `EthClient` for the EventFactory and Event contracts
//! 2. **Services Layer**: QR credential issuance, gate verification, the event
//!    catalog, the organizer desk and the HTTP API
//! 3. **Wallet Layer**: Operator key management and the holder's ticket list
//!
//! ## Configuration
//! Read from `ticketgate.toml` and `TICKETGATE_*` variables (see `config.rs`).
//! `TICKETGATE_FACTORY_ADDRESS` is required; `TICKETGATE_PRIVATE_KEY` should be set.

use crate::blockchain::eth_client::EthClient;
use crate::blockchain::subscriptions::{ChainEvent, ChainWatcher};
use crate::config::AppConfig;
use crate::services::api_server::ApiServer;
use crate::services::credential_issuer::CredentialIssuer;
use crate::services::event_catalog::EventCatalog;
use crate::services::organizer::OrganizerDesk;
use crate::services::verifier::{AutoApprove, TicketVerifier};
use crate::utils::clock::{Clock, SystemClock};
use crate::wallet::key_management::KeyManager;
use anyhow::Context;
use dotenv::dotenv;
use log::{debug, info, warn};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;

// Module declarations (organized by functional domain)
mod blockchain; // EVM contract access and chain polling
mod config; // Layered node configuration
mod contracts; // Contract ABIs and bindings
mod models; // Data structures
mod services; // Business logic and API
mod utils; // Helper functions
mod wallet; // Keys and owned tickets

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load configuration
/// 2. Connect to the chain with the operator wallet
/// 3. Start the chain and account watcher
/// 4. Initialize service components
/// 5. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load().context("invalid configuration")?;
    info!("starting with {:?}", config);

    let key_manager = match &config.private_key {
        Some(key) => KeyManager::from_private_key(key).context("TICKETGATE_PRIVATE_KEY is not a valid key")?,
        None => {
            warn!("no private key configured, using a throwaway wallet");
            KeyManager::random()
        }
    };

    let client = EthClient::new(&config.rpc_url, key_manager.wallet(), config.factory()?)
        .await
        .context("failed to connect to the chain - check the RPC url")?;

    // Wrap client in Arc for thread-safe shared ownership across services
    let client = Arc::new(client);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (subscription, mut chain_events) =
        ChainWatcher::spawn(client.clone(), config.chain_id, config.chain_poll());
    tokio::spawn(async move {
        loop {
            match chain_events.recv().await {
                Ok(ChainEvent::AccountChanged { account }) => info!("operator account changed: {:?}", account),
                Ok(event) => info!("chain event: {:?}", event),
                Err(RecvError::Lagged(skipped)) => warn!("missed {} chain events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let issuer = CredentialIssuer::new(Arc::new(key_manager), clock.clone(), config.qr_refresh());
    let verifier = TicketVerifier::new(
        client.clone(),
        Arc::new(AutoApprove),
        clock.clone(),
        config.credential_window_ms,
    );
    log_transitions("qr", issuer.subscribe());
    log_transitions("gate", verifier.subscribe());
    let catalog = EventCatalog::new(client.clone(), clock.clone(), config.event_offset()?);
    let desk = OrganizerDesk::new(client.clone(), clock.clone());

    // Initialize API Server with all dependencies
    let api_server = ApiServer::new(
        issuer,
        verifier,
        catalog,
        desk,
        client,
        clock,
        config.block_explorer_url.clone(),
    );

    // Start the HTTP server
    let addr = config.listen_socket()?;
    info!("API server running at http://{}", addr);
    let served = api_server.run(addr).await;

    if !subscription.is_active() {
        warn!("chain watcher stopped before the server");
    }
    subscription.cancel();
    served.context("API server stopped")
}

/// Logs every state change of a watched service at debug level.
fn log_transitions<T>(label: &'static str, mut states: watch::Receiver<T>)
where
    T: Debug + Send + Sync + 'static,
{
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            debug!("{} state: {:?}", label, *states.borrow_and_update());
        }
    });
}
