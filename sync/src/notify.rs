//! User-facing notifications
//!
//! Stages raise notifications as a side effect; nothing downstream branches
//! on them. Every notification is also logged.

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::types::{Notification, NotificationLevel};

const DEFAULT_CAPACITY: usize = 64;

/// Broadcasts notifications to every live receiver
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Receive notifications raised from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn success(&self, title: &str, message: &str) {
        info!(title, message, "Notification");
        self.emit(Notification::new(NotificationLevel::Success, title, message));
    }

    pub fn warning(&self, title: &str, message: &str) {
        warn!(title, message, "Notification");
        self.emit(Notification::new(NotificationLevel::Warning, title, message));
    }

    pub fn error(&self, title: &str, message: &str) {
        error!(title, message, "Notification");
        self.emit(Notification::new(NotificationLevel::Error, title, message));
    }

    fn emit(&self, notification: Notification) {
        // No receivers is fine; notifications are fire-and-forget
        let _ = self.tx.send(notification);
    }
}
