//! Contract resolution
//!
//! Each provider handle gets a freshly resolved registry. A registry is only
//! published when both contracts are bound and confirmed deployed.

use std::sync::Arc;

use alloy_primitives::Address;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info};

use crate::config::{Deployments, NetworkDeployment};
use crate::error::{RemoteCallError, SyncResult};
use crate::notify::Notifier;
use crate::provider::{ProviderHandle, WalletProvider};
use crate::types::{ContractHandle, ContractName, ContractRegistry, SyncStats};

/// Outcome of the latest resolution, as seen by the status aggregator
#[derive(Debug, Clone, Default)]
pub enum RegistryState {
    /// No connected provider yet
    #[default]
    Pending,
    Ready(Arc<ContractRegistry>),
    Failed(String),
}

impl RegistryState {
    pub fn registry(&self) -> Option<&Arc<ContractRegistry>> {
        match self {
            RegistryState::Ready(registry) => Some(registry),
            _ => None,
        }
    }
}

/// Resolves the two contracts against the provider's network
#[derive(Debug, Clone)]
pub struct ContractResolver {
    deployments: Arc<Deployments>,
    default_network: String,
}

impl ContractResolver {
    pub fn new(deployments: Arc<Deployments>, default_network: impl Into<String>) -> Self {
        Self {
            deployments,
            default_network: default_network.into(),
        }
    }

    /// Bind both contracts and wait for their deployment confirmation
    pub async fn resolve(&self, provider: &dyn WalletProvider) -> SyncResult<ContractRegistry> {
        let chain_id = provider.chain_id().await?;
        let deployment = self.deployment_for(chain_id)?;

        let (app, data) = tokio::try_join!(
            bind(provider, deployment, ContractName::AppContract),
            bind(provider, deployment, ContractName::DataContract),
        )?;

        Ok(ContractRegistry::new(app, data))
    }

    fn deployment_for(&self, chain_id: u64) -> SyncResult<&NetworkDeployment> {
        if let Some((network, deployment)) = self.deployments.for_chain(chain_id) {
            debug!(chain_id, network, "Deployment matched by chain id");
            return Ok(deployment);
        }
        self.deployments
            .network(&self.default_network)
            .ok_or_else(|| RemoteCallError::UnknownNetwork { chain_id }.into())
    }
}

async fn bind(
    provider: &dyn WalletProvider,
    deployment: &NetworkDeployment,
    name: ContractName,
) -> SyncResult<ContractHandle> {
    let address: Address = deployment.address_of(name)?;
    let client = provider.bind_contract(name, address).await?;

    if !client.is_deployed().await? {
        return Err(RemoteCallError::NotDeployed {
            contract: name.to_string(),
            address: address.to_string(),
        }
        .into());
    }

    debug!(contract = %name, address = %address, "Contract bound");
    Ok(ContractHandle::new(name, client))
}

/// Sole writer of the contract registry channels
pub struct RegistryStage {
    resolver: ContractResolver,
    contracts_tx: watch::Sender<Option<Arc<ContractRegistry>>>,
    state_tx: watch::Sender<RegistryState>,
    notifier: Notifier,
    stats: Arc<RwLock<SyncStats>>,
}

impl RegistryStage {
    pub fn new(resolver: ContractResolver, notifier: Notifier, stats: Arc<RwLock<SyncStats>>) -> Self {
        let (contracts_tx, _) = watch::channel(None);
        let (state_tx, _) = watch::channel(RegistryState::Pending);
        Self {
            resolver,
            contracts_tx,
            state_tx,
            notifier,
            stats,
        }
    }

    /// Published snapshots; only ever replaced by a complete registry
    pub fn subscribe_contracts(&self) -> watch::Receiver<Option<Arc<ContractRegistry>>> {
        self.contracts_tx.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RegistryState> {
        self.state_tx.subscribe()
    }

    /// Resolve for one provider handle and publish the outcome
    pub async fn refresh(&self, handle: &ProviderHandle) {
        let Some(provider) = handle.client() else {
            self.state_tx.send_replace(RegistryState::Pending);
            return;
        };

        match self.resolver.resolve(provider.as_ref()).await {
            Ok(registry) => {
                let registry = Arc::new(registry);
                info!(
                    version = handle.version(),
                    contracts = ?registry.addresses(),
                    "Contracts resolved"
                );
                self.contracts_tx.send_replace(Some(Arc::clone(&registry)));
                self.state_tx.send_replace(RegistryState::Ready(registry));
            }
            Err(e) => {
                error!(version = handle.version(), error = %e, "Contract resolution failed");
                self.stats.write().await.remote_call_failures += 1;
                self.state_tx.send_replace(RegistryState::Failed(e.to_string()));
                self.notifier.error("Contracts", &format!("Could not load contracts: {}", e));
            }
        }
    }

    /// Re-resolve on every provider handle until the channel closes
    pub async fn run(self, mut provider_rx: watch::Receiver<ProviderHandle>) {
        loop {
            let handle = provider_rx.borrow_and_update().clone();
            self.refresh(&handle).await;
            if provider_rx.changed().await.is_err() {
                break;
            }
        }
        debug!("Registry stage stopped");
    }
}
