//! Optimistic local state with rollback
//!
//! The observable value switches to the desired one as soon as a change is
//! attempted. A successful remote change commits it; a failed one restores
//! the last committed value.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use tracing::debug;

/// Controlled value with optimistic updates
#[derive(Debug)]
pub struct OptimisticToggle<T> {
    observed: watch::Sender<T>,
    committed: Mutex<T>,
}

impl<T> OptimisticToggle<T>
where
    T: Clone + PartialEq + Send + Sync + std::fmt::Debug,
{
    pub fn new(initial: T) -> Self {
        let (observed, _) = watch::channel(initial.clone());
        Self {
            observed,
            committed: Mutex::new(initial),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.observed.subscribe()
    }

    /// Currently observable value, possibly optimistic
    pub fn current(&self) -> T {
        self.observed.borrow().clone()
    }

    /// Last value confirmed by the remote side
    pub fn committed(&self) -> T {
        self.committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record a value confirmed by the remote side
    pub fn commit(&self, value: T) {
        *self.committed.lock().unwrap_or_else(PoisonError::into_inner) = value.clone();
        self.observed.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Show `desired` now, run `change`, then commit or roll back
    pub async fn attempt<F, Fut, E>(&self, desired: T, change: F) -> Result<(), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let before = self.observed.send_replace(desired.clone());
        debug!(from = ?before, to = ?desired, "Optimistic change applied");

        match change().await {
            Ok(()) => {
                self.commit(desired);
                Ok(())
            }
            Err(e) => {
                let last_good = self.committed();
                debug!(restored = ?last_good, "Optimistic change rolled back");
                self.observed.send_replace(last_good);
                Err(e)
            }
        }
    }
}
