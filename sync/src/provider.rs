//! Capability boundary towards the wallet provider and deployed contracts,
//! plus provider acquisition.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::notify::Notifier;
use crate::types::{Account, ContractName, TransactionLogEntry};

/// Endless stream of log entries; a yielded error ends the subscription
pub type LogStream = BoxStream<'static, SyncResult<TransactionLogEntry>>;

/// Which logs a subscription should deliver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    /// Emitting contracts; empty means every address
    pub addresses: Vec<Address>,
}

impl LogFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_unfiltered(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Wallet provider capabilities consumed by the synchronizer
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn chain_id(&self) -> SyncResult<u64>;

    /// Currently authorized accounts, possibly empty
    async fn get_accounts(&self) -> SyncResult<Vec<Account>>;

    async fn is_unlocked(&self) -> SyncResult<bool>;

    /// Ask the provider to authorize accounts; may prompt the user
    async fn request_access(&self) -> SyncResult<Vec<Account>>;

    /// Balance in the native token's smallest unit
    async fn get_balance(&self, account: &Account) -> SyncResult<U256>;

    async fn subscribe_logs(&self, filter: LogFilter) -> SyncResult<LogStream>;

    /// Bind a deployed contract to this provider's transport
    async fn bind_contract(
        &self,
        name: ContractName,
        address: Address,
    ) -> SyncResult<Arc<dyn ContractClient>>;
}

/// Operational-status surface of a deployed contract
#[async_trait]
pub trait ContractClient: Send + Sync {
    fn address(&self) -> Address;

    /// Whether code exists at the bound address
    async fn is_deployed(&self) -> SyncResult<bool>;

    async fn is_operational(&self) -> SyncResult<bool>;

    async fn set_operational_status(&self, operational: bool, from: &Account) -> SyncResult<()>;
}

/// Host environment that may carry an injected provider
pub trait HostEnvironment: Send + Sync {
    fn injected_provider(&self) -> Option<Arc<dyn WalletProvider>>;

    fn has_injected_provider(&self) -> bool {
        self.injected_provider().is_some()
    }
}

/// Environment with a fixed provider (or none)
#[derive(Clone, Default)]
pub struct StaticEnvironment {
    provider: Option<Arc<dyn WalletProvider>>,
}

impl StaticEnvironment {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        Self { provider }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl HostEnvironment for StaticEnvironment {
    fn injected_provider(&self) -> Option<Arc<dyn WalletProvider>> {
        self.provider.clone()
    }
}

/// Published provider state
///
/// Compared by version only; a new provider always gets a new version.
#[derive(Clone)]
pub struct ProviderHandle {
    version: u64,
    client: Option<Arc<dyn WalletProvider>>,
}

impl ProviderHandle {
    pub fn disconnected(version: u64) -> Self {
        Self {
            version,
            client: None,
        }
    }

    pub fn connected(version: u64, client: Arc<dyn WalletProvider>) -> Self {
        Self {
            version,
            client: Some(client),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Option<&Arc<dyn WalletProvider>> {
        self.client.as_ref()
    }
}

impl PartialEq for ProviderHandle {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl Eq for ProviderHandle {}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("version", &self.version)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Sole writer of the provider handle channel
pub struct ProviderAcquirer {
    tx: watch::Sender<ProviderHandle>,
    notifier: Notifier,
    missing_reported: AtomicBool,
}

impl ProviderAcquirer {
    pub fn new(notifier: Notifier) -> Self {
        let (tx, _) = watch::channel(ProviderHandle::disconnected(0));
        Self {
            tx,
            notifier,
            missing_reported: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProviderHandle> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ProviderHandle {
        self.tx.borrow().clone()
    }

    /// Detect the injected provider and publish the outcome
    ///
    /// A missing provider is terminal for the session: the disconnected
    /// handle is published and the error is reported once.
    pub fn acquire(&self, env: &dyn HostEnvironment) -> ProviderHandle {
        match env.injected_provider() {
            Some(provider) => self.attach(provider),
            None => {
                let handle = self.publish(None);
                if !self.missing_reported.swap(true, Ordering::SeqCst) {
                    self.notifier
                        .error("Connection Error", &SyncError::ProviderUnavailable.to_string());
                }
                handle
            }
        }
    }

    /// Publish a handle for an explicitly supplied provider
    ///
    /// Re-attaching the provider instance that is already published is a no-op.
    pub fn attach(&self, provider: Arc<dyn WalletProvider>) -> ProviderHandle {
        let current = self.current();
        if let Some(existing) = current.client() {
            if same_instance(existing, &provider) {
                debug!(version = current.version(), "Provider already attached");
                return current;
            }
        }
        let handle = self.publish(Some(provider));
        info!(version = handle.version(), "Wallet provider attached");
        handle
    }

    fn publish(&self, client: Option<Arc<dyn WalletProvider>>) -> ProviderHandle {
        let version = self.tx.borrow().version() + 1;
        let handle = match client {
            Some(client) => ProviderHandle::connected(version, client),
            None => ProviderHandle::disconnected(version),
        };
        self.tx.send_replace(handle.clone());
        debug!(
            version = handle.version(),
            connected = handle.is_connected(),
            "Provider handle published"
        );
        handle
    }
}

fn same_instance(a: &Arc<dyn WalletProvider>, b: &Arc<dyn WalletProvider>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
