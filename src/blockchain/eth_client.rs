// src/blockchain/eth_client.rs
//! EVM JSON-RPC client implementation.
//!
//! Provides a high-level interface for interacting with the ticketing
//! contracts on an EVM chain (Sepolia by default), including read-only view
//! calls, operator-signed transactions and receipt tracking. Implements the
//! ledger ports consumed by the services layer.

use crate::blockchain::ledger::{
    is_user_rejection, ChainProbe, ConfirmedTransaction, EventDirectory, LedgerError, TicketLedger,
};
use crate::contracts::event_contract::EventContract;
use crate::contracts::event_factory::EventFactory;
use crate::models::event::{EventListing, ValidatedEvent};
use async_trait::async_trait;
use ethers_contract::{Contract, ContractError};
use ethers::providers::{Http, Middleware, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::middleware::SignerMiddleware;
use ethers_core::{
    abi::{Abi, Detokenize, Tokenize},
    types::{Address, TxHash, U256, U64},
};
use log::{debug, info};
use std::sync::Arc;

/// Provider stack used for writes: HTTP transport plus the operator's local key.
pub type OperatorMiddleware = SignerMiddleware<Arc<Provider<Http>>, LocalWallet>;

/// EVM client for ticketing contract interactions.
///
/// This client provides:
/// - Read-only contract queries over a shared HTTP provider
/// - Transactions signed by the operator wallet
/// - Receipt tracking for submitted transactions
#[derive(Clone)]
pub struct EthClient {
    /// Read-only RPC provider
    provider: Arc<Provider<Http>>,
    /// Provider wrapped with the operator wallet for writes
    signer: Arc<OperatorMiddleware>,
    /// EventFactory contract enumerating deployed events
    factory_address: Address,
}

impl EthClient {
    /// Creates a new client instance.
    ///
    /// # Arguments
    /// * `rpc_url` - JSON-RPC endpoint URL
    /// * `wallet` - Operator wallet used to sign every write
    /// * `factory_address` - Deployed EventFactory address
    ///
    /// # Errors
    /// Returns `LedgerError::Network` if the URL is invalid or the chain ID
    /// cannot be retrieved.
    pub async fn new(
        rpc_url: &str,
        wallet: LocalWallet,
        factory_address: Address,
    ) -> Result<Self, LedgerError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| LedgerError::Network(format!("invalid RPC url {}: {}", rpc_url, e)))?;
        let provider = Arc::new(provider);

        // Sign with the chain ID the endpoint reports (EIP-155)
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| LedgerError::Network(e.to_string()))?
            .as_u64();
        let wallet = wallet.with_chain_id(chain_id);
        info!("connected to chain {} as operator {:?}", chain_id, wallet.address());

        let signer = Arc::new(SignerMiddleware::new(provider.clone(), wallet));

        Ok(Self {
            provider,
            signer,
            factory_address,
        })
    }

    pub fn operator_address(&self) -> Address {
        self.signer.signer().address()
    }

    pub fn factory_address(&self) -> Address {
        self.factory_address
    }

    /// Queries a smart contract (read-only operation).
    ///
    /// # Arguments
    /// * `contract_address` - Address of the target contract
    /// * `abi` - Parsed contract ABI
    /// * `method` - Method name to call
    /// * `params` - Method parameters
    ///
    /// # Errors
    /// - `Network` on transport failure
    /// - `ContractRead` if the call reverts or the result does not decode
    pub async fn query_contract<R: Detokenize>(
        &self,
        contract_address: Address,
        abi: &Abi,
        method: &str,
        params: impl Tokenize,
    ) -> Result<R, LedgerError> {
        let contract = Contract::new(contract_address, abi.clone(), self.provider.clone());

        contract
            .method::<_, R>(method, params)
            .map_err(|e| LedgerError::ContractRead(format!("{}: {}", method, e)))?
            .call()
            .await
            .map_err(read_error)
    }

    /// Sends an operator-signed transaction to a smart contract.
    ///
    /// # Arguments
    /// * `contract_address` - Address of the target contract
    /// * `abi` - Parsed contract ABI
    /// * `method` - Method name to call
    /// * `params` - Method parameters
    /// * `value` - Native value to attach (payable methods only)
    ///
    /// # Returns
    /// Hash of the broadcast transaction; use [`EthClient::confirm`] to wait for it.
    ///
    /// # Errors
    /// - `Declined` if the wallet refused
    /// - `TransactionFailed` with the decoded revert reason when gas estimation reverts
    pub async fn send_transaction(
        &self,
        contract_address: Address,
        abi: &Abi,
        method: &str,
        params: impl Tokenize,
        value: Option<U256>,
    ) -> Result<TxHash, LedgerError> {
        let contract = Contract::new(contract_address, abi.clone(), self.signer.clone());

        let mut call = contract
            .method::<_, ()>(method, params)
            .map_err(|e| LedgerError::TransactionFailed { reason: format!("{}: {}", method, e) })?;
        if let Some(value) = value {
            call = call.value(value);
        }

        let pending = call.send().await.map_err(write_error)?;
        let tx_hash = *pending;
        debug!("{} sent to {:?}: {:?}", method, contract_address, tx_hash);
        Ok(tx_hash)
    }

    /// Waits for one confirmation of `tx_hash`.
    pub async fn confirm(&self, tx_hash: TxHash) -> Result<ConfirmedTransaction, LedgerError> {
        let receipt = PendingTransaction::new(tx_hash, self.provider.as_ref())
            .confirmations(1)
            .await
            .map_err(|e| LedgerError::TransactionFailed { reason: e.to_string() })?
            .ok_or_else(|| LedgerError::TransactionFailed {
                reason: "transaction dropped from mempool".to_string(),
            })?;

        if receipt.status == Some(U64::zero()) {
            return Err(LedgerError::TransactionFailed {
                reason: "transaction reverted on-chain".to_string(),
            });
        }

        Ok(ConfirmedTransaction {
            tx_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
        })
    }

    /// Native balance of any account or contract.
    pub async fn balance_of(&self, address: Address) -> Result<U256, LedgerError> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(|e| LedgerError::Network(e.to_string()))
    }

    fn event(&self, address: Address) -> EventContract<'_> {
        EventContract::new(self, address)
    }

    fn factory(&self) -> EventFactory<'_> {
        EventFactory::new(self, self.factory_address)
    }
}

fn read_error<M: Middleware>(e: ContractError<M>) -> LedgerError {
    if e.is_revert() {
        let reason = e.decode_revert::<String>().unwrap_or_else(|| e.to_string());
        return LedgerError::ContractRead(reason);
    }
    match e {
        ContractError::MiddlewareError { .. } | ContractError::ProviderError { .. } => {
            LedgerError::Network(e.to_string())
        }
        other => LedgerError::ContractRead(other.to_string()),
    }
}

fn write_error<M: Middleware>(e: ContractError<M>) -> LedgerError {
    if let Some(reason) = e.decode_revert::<String>() {
        return LedgerError::TransactionFailed { reason };
    }
    let message = e.to_string();
    if is_user_rejection(&message) {
        LedgerError::Declined
    } else {
        LedgerError::TransactionFailed { reason: message }
    }
}

#[async_trait]
impl TicketLedger for EthClient {
    async fn has_ticket(&self, event: Address, holder: Address) -> Result<bool, LedgerError> {
        self.event(event).has_ticket(holder).await
    }

    async fn is_ticket_used(&self, event: Address, holder: Address) -> Result<bool, LedgerError> {
        self.event(event).is_ticket_used(holder).await
    }

    async fn event_name(&self, event: Address) -> Result<String, LedgerError> {
        self.event(event).name().await
    }

    async fn use_ticket(&self, event: Address, holder: Address) -> Result<TxHash, LedgerError> {
        self.event(event).use_ticket(holder).await
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<ConfirmedTransaction, LedgerError> {
        self.confirm(tx_hash).await
    }
}

#[async_trait]
impl EventDirectory for EthClient {
    async fn deployed_events(&self) -> Result<Vec<Address>, LedgerError> {
        self.factory().deployed_events().await
    }

    async fn event_listing(&self, event: Address) -> Result<EventListing, LedgerError> {
        self.event(event).listing().await
    }

    async fn event_balance(&self, event: Address) -> Result<U256, LedgerError> {
        self.balance_of(event).await
    }

    async fn has_ticket(&self, event: Address, holder: Address) -> Result<bool, LedgerError> {
        self.event(event).has_ticket(holder).await
    }

    async fn is_ticket_used(&self, event: Address, holder: Address) -> Result<bool, LedgerError> {
        self.event(event).is_ticket_used(holder).await
    }

    async fn create_event(&self, event: &ValidatedEvent) -> Result<TxHash, LedgerError> {
        self.factory().create_event(event).await
    }

    async fn buy_ticket(&self, event: Address, price: U256) -> Result<TxHash, LedgerError> {
        self.event(event).buy_ticket(price).await
    }

    async fn request_refund(&self, event: Address) -> Result<TxHash, LedgerError> {
        self.event(event).get_refund().await
    }

    async fn withdraw_revenue(&self, event: Address) -> Result<TxHash, LedgerError> {
        self.event(event).withdraw().await
    }

    async fn cancel_event(&self, event: Address) -> Result<TxHash, LedgerError> {
        self.event(event).cancel_event().await
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<ConfirmedTransaction, LedgerError> {
        self.confirm(tx_hash).await
    }

    fn operator(&self) -> Address {
        self.operator_address()
    }
}

#[async_trait]
impl ChainProbe for EthClient {
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        self.provider
            .get_chainid()
            .await
            .map(|id| id.as_u64())
            .map_err(|e| LedgerError::Network(e.to_string()))
    }

    async fn active_account(&self) -> Result<Option<Address>, LedgerError> {
        Ok(Some(self.operator_address()))
    }

    // The operator key is loaded once at startup.
    fn account_can_change(&self) -> bool {
        false
    }
}
