//! Operational status aggregation
//!
//! The status is recomputed from scratch on every trigger. Only the most
//! recent trigger may publish: older recomputations are aborted and, should
//! one finish anyway, its generation no longer matches and the result is
//! dropped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_sol_types::SolEvent;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::FlightSuretyContract::OperationalStatusChanged;
use crate::registry::RegistryState;
use crate::toggle::OptimisticToggle;
use crate::types::{
    AccountState, ContractName, ContractRegistry, OperationalStatus, SyncStats, TransactionLogEntry,
};

/// Per-contract operational flags, committed from successful reads
#[derive(Debug)]
pub struct ContractFlags {
    flags: BTreeMap<ContractName, OptimisticToggle<Option<bool>>>,
}

impl Default for ContractFlags {
    fn default() -> Self {
        Self {
            flags: ContractName::ALL
                .into_iter()
                .map(|name| (name, OptimisticToggle::new(None)))
                .collect(),
        }
    }
}

impl ContractFlags {
    pub fn get(&self, name: ContractName) -> &OptimisticToggle<Option<bool>> {
        &self.flags[&name]
    }
}

/// Result of one recomputation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub status: OperationalStatus,
    pub app: Option<bool>,
    pub data: Option<bool>,
}

impl Evaluation {
    fn disconnected() -> Self {
        Self {
            status: OperationalStatus::Disconnected,
            app: None,
            data: None,
        }
    }
}

/// Derive the status for one account/registry pair
///
/// No remote call is made unless an account is present and both contracts
/// are resolved.
pub async fn evaluate(account: &AccountState, registry: Option<&ContractRegistry>) -> Evaluation {
    if !account.is_present() {
        return Evaluation::disconnected();
    }
    let Some(registry) = registry else {
        return Evaluation::disconnected();
    };

    let (app, data) = tokio::join!(registry.app().is_operational(), registry.data().is_operational());

    if let Err(e) = &app {
        warn!(contract = %ContractName::AppContract, error = %e, "isOperational failed");
    }
    if let Err(e) = &data {
        warn!(contract = %ContractName::DataContract, error = %e, "isOperational failed");
    }

    Evaluation {
        status: OperationalStatus::from_reads(&app, &data),
        app: app.ok(),
        data: data.ok(),
    }
}

/// Whether a log entry announces a status change on a registered contract
pub fn is_status_event(entry: &TransactionLogEntry, registry: Option<&ContractRegistry>) -> bool {
    let Some(registry) = registry else {
        return false;
    };
    entry.event_signature() == Some(&OperationalStatusChanged::SIGNATURE_HASH)
        && registry.contains_address(&entry.address)
}

/// Sole writer of the operational status channel
pub struct StatusAggregator {
    account_rx: watch::Receiver<AccountState>,
    registry_rx: watch::Receiver<RegistryState>,
    log_rx: broadcast::Receiver<(usize, TransactionLogEntry)>,
    recheck: Arc<Notify>,
    status_tx: watch::Sender<OperationalStatus>,
    flags: Arc<ContractFlags>,
    stats: Arc<RwLock<SyncStats>>,
    generation: Arc<AtomicU64>,
    in_flight: Option<JoinHandle<()>>,
}

impl StatusAggregator {
    pub fn new(
        account_rx: watch::Receiver<AccountState>,
        registry_rx: watch::Receiver<RegistryState>,
        log_rx: broadcast::Receiver<(usize, TransactionLogEntry)>,
        flags: Arc<ContractFlags>,
        stats: Arc<RwLock<SyncStats>>,
    ) -> Self {
        let (status_tx, _) = watch::channel(OperationalStatus::Disconnected);
        Self {
            account_rx,
            registry_rx,
            log_rx,
            recheck: Arc::new(Notify::new()),
            status_tx,
            flags,
            stats,
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<OperationalStatus> {
        self.status_tx.subscribe()
    }

    /// Handle for requesting a recomputation from outside the loop
    pub fn recheck_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.recheck)
    }

    /// Start a fresh recomputation, superseding any in flight
    ///
    /// Returns the generation assigned to it.
    pub fn trigger(&mut self) -> u64 {
        if let Some(previous) = self.in_flight.take() {
            previous.abort();
        }

        let account = *self.account_rx.borrow_and_update();
        let registry = self.registry_rx.borrow_and_update().registry().cloned();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let current_generation = Arc::clone(&self.generation);
        let status_tx = self.status_tx.clone();
        let flags = Arc::clone(&self.flags);
        let stats = Arc::clone(&self.stats);

        let handle = tokio::spawn(async move {
            let evaluation = evaluate(&account, registry.as_deref()).await;

            let mut previous = None;
            let published = status_tx.send_if_modified(|current| {
                if current_generation.load(Ordering::SeqCst) != generation {
                    return false;
                }
                previous = Some(*current);
                if *current == evaluation.status {
                    return false;
                }
                *current = evaluation.status;
                true
            });

            // Stale result: a newer trigger owns the channel now
            let Some(previous) = previous else {
                debug!(generation, "Discarded stale status recomputation");
                return;
            };

            if let Some(app) = evaluation.app {
                flags.get(ContractName::AppContract).commit(Some(app));
            }
            if let Some(data) = evaluation.data {
                flags.get(ContractName::DataContract).commit(Some(data));
            }

            stats.write().await.record_status(published);
            if published {
                info!(from = %previous, to = %evaluation.status, "Operational status changed");
            }
        });

        self.in_flight = Some(handle);
        generation
    }

    /// Wait for the current recomputation, if any, to finish
    pub async fn settle(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Status recomputation panicked");
                }
            }
        }
    }

    /// Recompute on every trigger until the upstream channels close
    pub async fn run(mut self) {
        self.trigger();

        loop {
            tokio::select! {
                changed = self.account_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = self.registry_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                received = self.log_rx.recv() => match received {
                    Ok((_, entry)) => {
                        let registry = self.registry_rx.borrow().registry().cloned();
                        if !is_status_event(&entry, registry.as_deref()) {
                            continue;
                        }
                        debug!(contract = %entry.address, "Status change event observed");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Status event listener lagged; rechecking");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = self.recheck.notified() => {}
            }
            self.trigger();
        }

        debug!("Status aggregator stopped");
    }
}

impl Drop for StatusAggregator {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}
