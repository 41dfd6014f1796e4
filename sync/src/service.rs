//! Synchronizer wiring
//!
//! Stages form a fixed pipeline: provider -> account -> contracts -> status,
//! with the transaction log fed from the provider alongside. Each published
//! value has exactly one writer; everything handed out here is a reader.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use alloy_primitives::{Address, U256};
use serde::Serialize;
use tokio::sync::{broadcast, watch, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::account::AccountTracker;
use crate::config::{Deployments, SyncConfig};
use crate::error::{RemoteCallError, SyncError, SyncResult};
use crate::notify::Notifier;
use crate::provider::{HostEnvironment, ProviderAcquirer, ProviderHandle, WalletProvider};
use crate::registry::{ContractResolver, RegistryStage, RegistryState};
use crate::status::{ContractFlags, StatusAggregator};
use crate::txlog::{LogPipeline, LogSubscription, TransactionLog};
use crate::types::{
    Account, AccountState, ContractName, ContractRegistry, Notification, OperationalStatus,
    SyncStats, TransactionLogEntry,
};

const TOGGLE_TITLE: &str = "Operational Status";

/// Runtime knobs of a synchronizer
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub account_poll_interval: Duration,
    /// Deployment used when none matches the provider's chain id
    pub network: String,
    pub log_channel_capacity: usize,
    pub notification_capacity: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            account_poll_interval: Duration::from_millis(1000),
            network: "localhost".to_string(),
            log_channel_capacity: 1024,
            notification_capacity: 64,
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            account_poll_interval: config.account_poll_interval(),
            network: config.network.clone(),
            log_channel_capacity: config.log_channel_capacity,
            ..Default::default()
        }
    }
}

/// Builder for [`Synchronizer`]
pub struct SynchronizerBuilder {
    deployments: Arc<Deployments>,
    options: SyncOptions,
    notifier: Option<Notifier>,
}

impl SynchronizerBuilder {
    pub fn options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Share an existing notification channel
    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Spawn every stage, then look for a provider in `env`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self, env: &dyn HostEnvironment) -> Synchronizer {
        let options = self.options;
        let notifier = self
            .notifier
            .unwrap_or_else(|| Notifier::new(options.notification_capacity));
        let stats = Arc::new(RwLock::new(SyncStats::started()));

        let acquirer = ProviderAcquirer::new(notifier.clone());
        let provider_rx = acquirer.subscribe();

        let tracker = AccountTracker::new(notifier.clone(), Arc::clone(&stats));
        let account_rx = tracker.subscribe();

        let resolver = ContractResolver::new(self.deployments, options.network.clone());
        let registry = RegistryStage::new(resolver, notifier.clone(), Arc::clone(&stats));
        let contracts_rx = registry.subscribe_contracts();
        let registry_rx = registry.subscribe_state();

        let log = TransactionLog::new(options.log_channel_capacity);
        let flags = Arc::new(ContractFlags::default());
        let aggregator = StatusAggregator::new(
            account_rx.clone(),
            registry_rx.clone(),
            log.subscribe_live(),
            Arc::clone(&flags),
            Arc::clone(&stats),
        );
        let status_rx = aggregator.subscribe();
        let recheck = aggregator.recheck_handle();

        let pipeline = LogPipeline::new(log.clone(), notifier.clone(), Arc::clone(&stats));

        let tasks = vec![
            tokio::spawn(tracker.run(provider_rx.clone(), options.account_poll_interval)),
            tokio::spawn(registry.run(provider_rx.clone())),
            tokio::spawn(aggregator.run()),
            tokio::spawn(pipeline.run(provider_rx.clone())),
        ];

        let handle = acquirer.acquire(env);
        info!(
            connected = handle.is_connected(),
            poll_interval_ms = options.account_poll_interval.as_millis() as u64,
            network = %options.network,
            "Synchronizer started"
        );

        Synchronizer {
            acquirer,
            provider_rx,
            account_rx,
            contracts_rx,
            registry_rx,
            status_rx,
            log,
            flags,
            recheck,
            notifier,
            stats,
            tasks: Mutex::new(tasks),
            stopped: AtomicBool::new(false),
        }
    }
}

/// Owned synchronization core
///
/// Lives from `start` until `shutdown` (or drop).
pub struct Synchronizer {
    acquirer: ProviderAcquirer,
    provider_rx: watch::Receiver<ProviderHandle>,
    account_rx: watch::Receiver<AccountState>,
    contracts_rx: watch::Receiver<Option<Arc<ContractRegistry>>>,
    registry_rx: watch::Receiver<RegistryState>,
    status_rx: watch::Receiver<OperationalStatus>,
    log: TransactionLog,
    flags: Arc<ContractFlags>,
    recheck: Arc<Notify>,
    notifier: Notifier,
    stats: Arc<RwLock<SyncStats>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Synchronizer {
    pub fn builder(deployments: Deployments) -> SynchronizerBuilder {
        SynchronizerBuilder {
            deployments: Arc::new(deployments),
            options: SyncOptions::default(),
            notifier: None,
        }
    }

    pub fn current_account(&self) -> watch::Receiver<AccountState> {
        self.account_rx.clone()
    }

    pub fn deployed_contracts(&self) -> watch::Receiver<Option<Arc<ContractRegistry>>> {
        self.contracts_rx.clone()
    }

    /// Outcome of the latest contract resolution, including failures
    pub fn registry_state(&self) -> watch::Receiver<RegistryState> {
        self.registry_rx.clone()
    }

    pub fn operational_status(&self) -> watch::Receiver<OperationalStatus> {
        self.status_rx.clone()
    }

    pub fn provider(&self) -> watch::Receiver<ProviderHandle> {
        self.provider_rx.clone()
    }

    /// Every log entry recorded so far, followed by live ones
    pub fn transaction_log(&self) -> LogSubscription {
        self.log.subscribe()
    }

    pub fn log_snapshot(&self) -> Vec<TransactionLogEntry> {
        self.log.snapshot()
    }

    /// Operator-facing operational flag of one contract
    pub fn contract_flag(&self, name: ContractName) -> watch::Receiver<Option<bool>> {
        self.flags.get(name).subscribe()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub async fn stats(&self) -> SyncStats {
        self.stats.read().await.clone()
    }

    /// Balance of the active account; `None` without one
    pub async fn balance(&self) -> SyncResult<Option<U256>> {
        let Some(account) = self.account_rx.borrow().account().copied() else {
            return Ok(None);
        };
        let Some(provider) = self.acquirer.current().client().cloned() else {
            return Ok(None);
        };
        let balance = provider.get_balance(&account).await?;
        Ok(Some(balance))
    }

    /// Attach a provider that became available after startup
    pub fn connect(&self, provider: Arc<dyn WalletProvider>) -> ProviderHandle {
        self.acquirer.attach(provider)
    }

    /// Ask the status aggregator for a fresh recomputation
    pub fn recheck(&self) {
        self.recheck.notify_one();
    }

    /// Set a contract's operational flag on chain
    ///
    /// Refused with `ContractsUnavailable` unless the latest resolution
    /// succeeded. The flag shows `desired` immediately. On rejection it reverts to the
    /// last confirmed value, an error notification is raised and the error is
    /// returned.
    pub async fn toggle_contract_status(
        &self,
        name: ContractName,
        desired: bool,
        acting: &Account,
    ) -> SyncResult<()> {
        // Only a registry resolved for the current provider; the last good
        // snapshot may be bound to a replaced one
        let contract = self
            .registry_rx
            .borrow()
            .registry()
            .and_then(|registry| registry.get(name).cloned());
        let Some(contract) = contract else {
            let e: SyncError = RemoteCallError::ContractsUnavailable.into();
            self.notifier.error(TOGGLE_TITLE, &e.to_string());
            return Err(e);
        };

        debug!(contract = %name, desired, acting = %acting, "Toggling operational status");

        let result = self
            .flags
            .get(name)
            .attempt(Some(desired), || contract.client.set_operational_status(desired, acting))
            .await;

        match result {
            Ok(()) => {
                info!(contract = %name, operational = desired, "Operational status change accepted");
                self.recheck();
                Ok(())
            }
            Err(e) => {
                warn!(contract = %name, error = %e, code = e.error_code(), "Operational status change rejected");
                self.stats.write().await.remote_call_failures += 1;
                self.notifier.error(TOGGLE_TITLE, &e.to_string());
                Err(e)
            }
        }
    }

    /// Point-in-time view for reporting
    pub async fn view(&self) -> SyncView {
        let contracts = self
            .contracts_rx
            .borrow()
            .as_ref()
            .map(|registry| registry.addresses())
            .unwrap_or_default();
        let flags = ContractName::ALL
            .into_iter()
            .map(|name| (name, self.flags.get(name).current()))
            .collect();

        let connected = self.provider_rx.borrow().is_connected();
        let account = *self.account_rx.borrow();
        let status = *self.status_rx.borrow();

        SyncView {
            connected,
            account,
            status,
            contracts,
            flags,
            log_entries: self.log.len(),
            stats: self.stats().await,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop every background stage; later calls do nothing
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in &tasks {
            task.abort();
        }
        info!(tasks = tasks.len(), "Synchronizer stopped");
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Serializable snapshot of the synchronizer
#[derive(Debug, Clone, Serialize)]
pub struct SyncView {
    pub connected: bool,
    pub account: AccountState,
    pub status: OperationalStatus,
    pub contracts: BTreeMap<ContractName, Address>,
    pub flags: BTreeMap<ContractName, Option<bool>>,
    pub log_entries: usize,
    pub stats: SyncStats,
}
