//! Account tracking
//!
//! The provider has no account-change push event here, so the tracker
//! samples on a fixed interval. Anything that happens between two samples
//! is never observed; the staleness bound is one interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::notify::Notifier;
use crate::provider::{ProviderHandle, WalletProvider};
use crate::types::{AccountState, SyncStats};

const STATUS_TITLE: &str = "Connection Status";

/// Samples the provider and publishes the active account
pub struct AccountTracker {
    tx: watch::Sender<AccountState>,
    notifier: Notifier,
    stats: Arc<RwLock<SyncStats>>,
    /// Whether a present account was announced since the cache was last cleared
    announced: bool,
}

impl AccountTracker {
    pub fn new(notifier: Notifier, stats: Arc<RwLock<SyncStats>>) -> Self {
        let (tx, _) = watch::channel(AccountState::Unknown);
        Self {
            tx,
            notifier,
            stats,
            announced: false,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AccountState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> AccountState {
        *self.tx.borrow()
    }

    /// Run one sampling cycle; returns whether a new value was published
    pub async fn sample(&mut self, provider: &dyn WalletProvider) -> bool {
        let observed = observe(provider).await;
        self.publish(observed).await
    }

    /// Publish `next` unless it equals the last published value
    pub async fn publish(&mut self, next: AccountState) -> bool {
        let mut previous = AccountState::Unknown;
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            previous = *current;
            *current = next;
            true
        });
        if !changed {
            return false;
        }

        self.stats.write().await.account_changes += 1;

        match next {
            AccountState::Present(account) => {
                info!(account = %account, "Active account changed");
                if self.announced {
                    self.notifier.success(STATUS_TITLE, "Address updated");
                } else {
                    self.notifier.success(STATUS_TITLE, "Ethereum client connected");
                    self.announced = true;
                }
            }
            AccountState::Locked | AccountState::Absent | AccountState::Unknown => {
                self.announced = false;
                if previous.is_present() {
                    self.notifier
                        .warning(STATUS_TITLE, "Wallet locked or no account authorized");
                }
                debug!(state = ?next, "No active account");
            }
        }
        true
    }

    /// Forget the last published account
    ///
    /// Receivers are not notified; the next sample is published and
    /// announced as a fresh connection.
    pub fn clear_cache(&mut self) {
        self.announced = false;
        self.tx.send_if_modified(|current| {
            *current = AccountState::Unknown;
            false
        });
    }

    /// Sample on `interval` until the provider channel closes
    ///
    /// A new connected handle clears the cached account and triggers an
    /// immediate sample; a disconnected one publishes `Absent`.
    pub async fn run(mut self, mut provider_rx: watch::Receiver<ProviderHandle>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut client = provider_rx.borrow_and_update().client().cloned();
        if client.is_none() {
            self.publish(AccountState::Absent).await;
        }

        info!(interval_ms = interval.as_millis() as u64, "Account tracker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(provider) = client.as_ref() {
                        self.sample(provider.as_ref()).await;
                    }
                }
                changed = provider_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    client = provider_rx.borrow_and_update().client().cloned();
                    if client.is_some() {
                        debug!("Provider changed, clearing cached account");
                        self.clear_cache();
                    } else {
                        self.publish(AccountState::Absent).await;
                    }
                    ticker.reset_immediately();
                }
            }
        }

        debug!("Account tracker stopped");
    }
}

/// Read the account the provider currently exposes
pub async fn observe(provider: &dyn WalletProvider) -> AccountState {
    match provider.is_unlocked().await {
        Ok(true) => {}
        Ok(false) => return AccountState::Locked,
        Err(e) => {
            warn!(error = %e, "Unlock check failed");
            return AccountState::Absent;
        }
    }

    let accounts = match provider.get_accounts().await {
        Ok(accounts) => accounts,
        Err(e) => {
            warn!(error = %e, "Failed to read accounts");
            return AccountState::Absent;
        }
    };

    if let Some(first) = accounts.first() {
        return AccountState::Present(*first);
    }

    match provider.request_access().await {
        Ok(granted) => granted.first().copied().into(),
        Err(e) => {
            debug!(error = %e, "Account access not granted");
            AccountState::Absent
        }
    }
}
