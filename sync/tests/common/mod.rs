//! Common test utilities for integration tests

#![allow(dead_code)]

pub mod fake_wallet;
pub mod mock_rpc;

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use surety_sync::{Deployments, NetworkDeployment, Notification, SyncOptions};

pub use fake_wallet::{account, app_address, data_address, FakeContract, FakeWallet, Reply};
pub use mock_rpc::{MockRpcNode, NodeState};

/// Deployment file with both fake contracts on the local chain
pub fn deployments() -> Deployments {
    let mut networks = BTreeMap::new();
    networks.insert(
        "localhost".to_string(),
        NetworkDeployment {
            url: Some("http://localhost:8545".into()),
            chain_id: Some(fake_wallet::CHAIN_ID),
            app_address: app_address().to_string(),
            data_address: data_address().to_string(),
        },
    );
    Deployments::new(networks)
}

pub fn fast_options() -> SyncOptions {
    SyncOptions {
        account_poll_interval: Duration::from_millis(100),
        ..Default::default()
    }
}

/// Wait until the watched value satisfies `pred`
pub async fn wait_until<T: Clone>(rx: &mut watch::Receiver<T>, pred: impl FnMut(&T) -> bool) -> T {
    let value = tokio::time::timeout(Duration::from_secs(30), rx.wait_for(pred))
        .await
        .expect("timed out waiting for value")
        .expect("channel closed")
        .clone();
    value
}

/// Next notification with the given title
pub async fn next_notification(rx: &mut broadcast::Receiver<Notification>, title: &str) -> Notification {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let notification = rx.recv().await.expect("notification channel closed");
            if notification.title == title {
                return notification;
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

/// Drain everything raised so far
pub fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut seen = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        seen.push(notification);
    }
    seen
}

/// Host environment injecting `provider`
pub fn env_with(provider: std::sync::Arc<dyn surety_sync::WalletProvider>) -> surety_sync::StaticEnvironment {
    surety_sync::StaticEnvironment::new(Some(provider))
}
