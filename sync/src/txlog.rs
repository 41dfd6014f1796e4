//! Transaction log pipeline
//!
//! Entries are kept in an append-only, indexed store and broadcast live.
//! New subscribers get the full backlog replayed before live entries, so
//! every subscriber observes the same gap-free sequence.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::notify::Notifier;
use crate::provider::{LogFilter, ProviderHandle, WalletProvider};
use crate::types::{SyncStats, TransactionLogEntry};

const DEFAULT_CAPACITY: usize = 1024;

/// Append-only transaction log shared by the pipeline and its readers
#[derive(Debug, Clone)]
pub struct TransactionLog {
    entries: Arc<StdRwLock<Vec<TransactionLogEntry>>>,
    tx: broadcast::Sender<(usize, TransactionLogEntry)>,
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TransactionLog {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            entries: Arc::new(StdRwLock::new(Vec::new())),
            tx,
        }
    }

    /// Append an entry and forward it to live subscribers; returns its index
    pub fn append(&self, entry: TransactionLogEntry) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let index = entries.len();
        entries.push(entry.clone());
        // Sent under the write lock so `subscribe` never sees an entry twice
        let _ = self.tx.send((index, entry));
        index
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<TransactionLogEntry> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Entries from `index` onward
    pub fn entries_from(&self, index: usize) -> Vec<TransactionLogEntry> {
        read_from(&self.entries, index)
    }

    /// Replay everything recorded so far, then follow live entries
    pub fn subscribe(&self) -> LogSubscription {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let live = self.tx.subscribe();
        LogSubscription {
            store: Arc::clone(&self.entries),
            backlog: entries.iter().cloned().collect(),
            next_index: 0,
            live,
        }
    }

    /// Live entries only, tagged with their index
    pub fn subscribe_live(&self) -> broadcast::Receiver<(usize, TransactionLogEntry)> {
        self.tx.subscribe()
    }
}

fn read_from(store: &StdRwLock<Vec<TransactionLogEntry>>, index: usize) -> Vec<TransactionLogEntry> {
    let entries = store.read().unwrap_or_else(PoisonError::into_inner);
    entries.get(index..).map(<[_]>::to_vec).unwrap_or_default()
}

/// Ordered reader over a transaction log
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct LogSubscription {
    /// Store only, so the live channel closes with the last log handle
    store: Arc<StdRwLock<Vec<TransactionLogEntry>>>,
    backlog: VecDeque<TransactionLogEntry>,
    /// Index of the next entry to hand out
    next_index: usize,
    live: broadcast::Receiver<(usize, TransactionLogEntry)>,
}

impl LogSubscription {
    /// Next entry in log order
    ///
    /// Returns `None` once every [`TransactionLog`] handle is dropped and the
    /// remaining entries were delivered.
    pub async fn next(&mut self) -> Option<TransactionLogEntry> {
        loop {
            if let Some(entry) = self.backlog.pop_front() {
                self.next_index += 1;
                return Some(entry);
            }

            match self.live.recv().await {
                Ok((index, _)) if index < self.next_index => continue,
                Ok((index, entry)) if index == self.next_index => {
                    self.next_index += 1;
                    return Some(entry);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {
                    // Missed entries; re-read them from the store
                    self.backlog = read_from(&self.store, self.next_index).into();
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Entries already delivered by this subscription
    pub fn delivered(&self) -> usize {
        self.next_index
    }

    pub fn into_stream(self) -> impl Stream<Item = TransactionLogEntry> {
        stream::unfold(self, |mut subscription| async move {
            subscription.next().await.map(|entry| (entry, subscription))
        })
    }
}

/// Feeds the transaction log from the provider's log subscription
pub struct LogPipeline {
    log: TransactionLog,
    notifier: Notifier,
    stats: Arc<RwLock<SyncStats>>,
}

impl LogPipeline {
    pub fn new(log: TransactionLog, notifier: Notifier, stats: Arc<RwLock<SyncStats>>) -> Self {
        Self {
            log,
            notifier,
            stats,
        }
    }

    /// Follow the log feed of each connected provider
    ///
    /// A failed subscription stays closed until the next provider handle.
    pub async fn run(self, mut provider_rx: watch::Receiver<ProviderHandle>) {
        loop {
            let handle = provider_rx.borrow_and_update().clone();
            if let Some(provider) = handle.client().cloned() {
                tokio::select! {
                    failure = self.pump(provider.as_ref()) => self.report(failure).await,
                    changed = provider_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                }
            }
            if provider_rx.changed().await.is_err() {
                break;
            }
        }
        debug!("Log pipeline stopped");
    }

    /// Append entries until the stream fails; returns the failure
    pub async fn pump(&self, provider: &dyn WalletProvider) -> SyncError {
        let mut stream = match provider.subscribe_logs(LogFilter::all()).await {
            Ok(stream) => stream,
            Err(e) => return e,
        };
        info!("Transaction log subscription opened");

        while let Some(item) = stream.next().await {
            match item {
                Ok(entry) => {
                    debug!(
                        address = %entry.address,
                        block_number = ?entry.block_number,
                        tx_hash = ?entry.transaction_hex(),
                        "Log entry received"
                    );
                    self.log.append(entry);
                    self.stats.write().await.log_entries += 1;
                }
                Err(e) => return e,
            }
        }
        SyncError::Subscription("log stream ended".into())
    }

    async fn report(&self, failure: SyncError) {
        warn!(error = %failure, retryable = failure.is_retryable(), "Transaction log subscription closed");
        self.stats.write().await.log_subscription_failures += 1;
        self.notifier.error(
            "Transaction",
            "There was an error with the transaction log, please try again.",
        );
    }
}
