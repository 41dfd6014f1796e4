//! Alloy-backed wallet provider and contract clients

use std::sync::Arc;
use std::time::Duration;

use alloy::{
    network::EthereumWallet,
    primitives::{Address, U256},
    providers::{Provider, ProviderBuilder},
    rpc::types::{Filter, Log},
    signers::local::PrivateKeySigner,
    sol,
    transports::http::Http,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::{ConfigError, RemoteCallError, ResultExt, SyncError, SyncResult};
use crate::provider::{ContractClient, HostEnvironment, LogFilter, LogStream, WalletProvider};
use crate::types::{Account, ContractName, TransactionLogEntry};

// Operational-status surface shared by the app and data contracts
sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    FlightSuretyContract,
    r#"[
        {
            "type": "function",
            "name": "isOperational",
            "inputs": [],
            "outputs": [{"type": "bool"}],
            "stateMutability": "view"
        },
        {
            "type": "function",
            "name": "setOperationalStatus",
            "inputs": [{"name": "mode", "type": "bool"}],
            "outputs": [],
            "stateMutability": "nonpayable"
        },
        {
            "type": "event",
            "name": "OperationalStatusChanged",
            "anonymous": false,
            "inputs": [
                {"name": "mode", "type": "bool", "indexed": false}
            ]
        }
    ]"#
);

type HttpTransport = Http<reqwest::Client>;

/// Wallet provider over an alloy HTTP provider
pub struct AlloyWallet<P> {
    provider: P,
    /// Local signer; when set it is the only account exposed
    signer: Option<Address>,
    poll_interval: Duration,
}

impl<P: Provider<HttpTransport> + Clone + 'static> AlloyWallet<P> {
    pub fn new(provider: P, signer: Option<Address>, poll_interval: Duration) -> Self {
        Self {
            provider,
            signer,
            poll_interval,
        }
    }
}

#[async_trait]
impl<P: Provider<HttpTransport> + Clone + 'static> WalletProvider for AlloyWallet<P> {
    async fn chain_id(&self) -> SyncResult<u64> {
        self.provider.get_chain_id().await.remote_context("eth_chainId")
    }

    async fn get_accounts(&self) -> SyncResult<Vec<Account>> {
        if let Some(signer) = self.signer {
            return Ok(vec![Account::new(signer)]);
        }
        let accounts = self
            .provider
            .get_accounts()
            .await
            .remote_context("eth_accounts")?;
        Ok(accounts.into_iter().map(Account::new).collect())
    }

    async fn is_unlocked(&self) -> SyncResult<bool> {
        if self.signer.is_some() {
            return Ok(true);
        }
        // A node that answers eth_accounts is reachable and unlocked
        self.provider
            .get_accounts()
            .await
            .map(|_| true)
            .remote_context("eth_accounts")
    }

    async fn request_access(&self) -> SyncResult<Vec<Account>> {
        if let Some(signer) = self.signer {
            return Ok(vec![Account::new(signer)]);
        }
        let granted: Vec<Address> = self
            .provider
            .raw_request("eth_requestAccounts".into(), ())
            .await
            .map_err(classify)?;
        Ok(granted.into_iter().map(Account::new).collect())
    }

    async fn get_balance(&self, account: &Account) -> SyncResult<U256> {
        self.provider
            .get_balance(account.address())
            .await
            .remote_context("eth_getBalance")
    }

    async fn subscribe_logs(&self, filter: LogFilter) -> SyncResult<LogStream> {
        let mut rpc_filter = Filter::new();
        if !filter.is_unfiltered() {
            rpc_filter = rpc_filter.address(filter.addresses);
        }

        let poller = self
            .provider
            .watch_logs(&rpc_filter)
            .await
            .remote_context("eth_newFilter")?
            .with_poll_interval(self.poll_interval);

        debug!(poll_interval_ms = self.poll_interval.as_millis() as u64, "Log filter installed");

        let entries = poller
            .into_stream()
            .flat_map(|logs| stream::iter(logs.into_iter().map(|log| Ok(TransactionLogEntry::from(&log)))));
        Ok(entries.boxed())
    }

    async fn bind_contract(
        &self,
        name: ContractName,
        address: Address,
    ) -> SyncResult<Arc<dyn ContractClient>> {
        debug!(contract = %name, address = %address, "Binding contract");
        Ok(Arc::new(AlloyContract::new(address, self.provider.clone())))
    }
}

/// Contract client for one deployed contract
pub struct AlloyContract<P> {
    contract: FlightSuretyContract::FlightSuretyContractInstance<HttpTransport, P>,
    provider: P,
}

impl<P: Provider<HttpTransport> + Clone> AlloyContract<P> {
    pub fn new(address: Address, provider: P) -> Self {
        let contract = FlightSuretyContract::new(address, provider.clone());
        Self { contract, provider }
    }
}

#[async_trait]
impl<P: Provider<HttpTransport> + Clone + 'static> ContractClient for AlloyContract<P> {
    fn address(&self) -> Address {
        *self.contract.address()
    }

    async fn is_deployed(&self) -> SyncResult<bool> {
        let code = self
            .provider
            .get_code_at(self.address())
            .await
            .remote_context("eth_getCode")?;
        Ok(!code.is_empty())
    }

    async fn is_operational(&self) -> SyncResult<bool> {
        let result = self.contract.isOperational().call().await.map_err(classify)?;
        Ok(result._0)
    }

    async fn set_operational_status(&self, operational: bool, from: &Account) -> SyncResult<()> {
        let pending = self
            .contract
            .setOperationalStatus(operational)
            .from(from.address())
            .send()
            .await
            .map_err(classify)?;
        let receipt = pending.get_receipt().await.remote_context("transaction receipt")?;

        if !receipt.status() {
            return Err(RemoteCallError::Reverted {
                reason: format!("transaction {} failed", receipt.transaction_hash),
            }
            .into());
        }

        info!(
            contract = %self.address(),
            operational,
            tx_hash = %receipt.transaction_hash,
            block_number = receipt.block_number.unwrap_or(0),
            "Operational status updated"
        );
        Ok(())
    }
}

impl From<&Log> for TransactionLogEntry {
    fn from(log: &Log) -> Self {
        Self {
            address: log.inner.address,
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data.clone(),
            block_number: log.block_number,
            block_hash: log.block_hash,
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
        }
    }
}

/// Sort a provider or contract failure into the remote call taxonomy
fn classify(e: impl std::fmt::Display) -> SyncError {
    let message = e.to_string();
    let lower = message.to_lowercase();
    if lower.contains("user rejected") || lower.contains("user denied") || lower.contains("4001") {
        RemoteCallError::UserRejected.into()
    } else if lower.contains("revert") {
        RemoteCallError::Reverted { reason: message }.into()
    } else {
        RemoteCallError::Transport(message).into()
    }
}

/// Build the configured wallet provider
///
/// Returns `None` when no RPC endpoint is configured.
pub fn connect(config: &SyncConfig) -> SyncResult<Option<Arc<dyn WalletProvider>>> {
    let Some(rpc_url) = config.rpc_url.as_deref() else {
        return Ok(None);
    };
    let url: reqwest::Url = rpc_url
        .parse()
        .map_err(|_| ConfigError::InvalidUrl(rpc_url.to_string()))?;
    let poll_interval = config.log_poll_interval();

    let provider: Arc<dyn WalletProvider> = match config.wallet_private_key.as_deref() {
        Some(private_key) => {
            let signer: PrivateKeySigner = private_key
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPrivateKey)?;
            let address = signer.address();
            let provider = ProviderBuilder::new()
                .with_recommended_fillers()
                .wallet(EthereumWallet::from(signer))
                .on_http(url);
            info!(rpc_url, signer = %address, "Connecting with local wallet");
            Arc::new(AlloyWallet::new(provider, Some(address), poll_interval))
        }
        None => {
            let provider = ProviderBuilder::new().on_http(url);
            info!(rpc_url, "Connecting to node accounts");
            Arc::new(AlloyWallet::new(provider, None, poll_interval))
        }
    };

    Ok(Some(provider))
}

/// Host environment backed by the configured RPC endpoint
#[derive(Clone, Default)]
pub struct RpcEnvironment {
    provider: Option<Arc<dyn WalletProvider>>,
}

impl RpcEnvironment {
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Ok(Self {
            provider: connect(config)?,
        })
    }
}

impl HostEnvironment for RpcEnvironment {
    fn injected_provider(&self) -> Option<Arc<dyn WalletProvider>> {
        self.provider.clone()
    }
}
