//! Configuration for the synchronizer

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{Account, ContractName};

/// Synchronizer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// JSON-RPC endpoint of the wallet provider; unset means no provider
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Private key of a local signing wallet
    #[serde(default)]
    pub wallet_private_key: Option<String>,

    /// Per-network contract deployment file
    #[serde(default = "default_deployments_path")]
    pub deployments_path: String,

    /// Deployment entry used when no entry matches the provider's chain id
    #[serde(default = "default_network")]
    pub network: String,

    /// Account sampling interval in milliseconds
    #[serde(default = "default_account_poll_interval_ms")]
    pub account_poll_interval_ms: u64,

    /// Log filter polling interval in milliseconds
    #[serde(default = "default_log_poll_interval_ms")]
    pub log_poll_interval_ms: u64,

    /// Live log channel capacity per subscriber
    #[serde(default = "default_log_channel_capacity")]
    pub log_channel_capacity: usize,

    /// Health server port
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

fn default_deployments_path() -> String {
    "deployments.json".to_string()
}

fn default_network() -> String {
    "localhost".to_string()
}

fn default_account_poll_interval_ms() -> u64 {
    1000
}

fn default_log_poll_interval_ms() -> u64 {
    1000
}

fn default_log_channel_capacity() -> usize {
    1024
}

fn default_health_port() -> u16 {
    9090
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            wallet_private_key: None,
            deployments_path: default_deployments_path(),
            network: default_network(),
            account_poll_interval_ms: default_account_poll_interval_ms(),
            log_poll_interval_ms: default_log_poll_interval_ms(),
            log_channel_capacity: default_log_channel_capacity(),
            health_port: default_health_port(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            rpc_url: std::env::var("RPC_URL").ok().filter(|s| !s.trim().is_empty()),
            wallet_private_key: std::env::var("WALLET_PRIVATE_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            deployments_path: std::env::var("DEPLOYMENTS_PATH")
                .unwrap_or_else(|_| default_deployments_path()),
            network: std::env::var("NETWORK").unwrap_or_else(|_| default_network()),
            account_poll_interval_ms: parse_env(
                "ACCOUNT_POLL_INTERVAL_MS",
                default_account_poll_interval_ms(),
            )?,
            log_poll_interval_ms: parse_env("LOG_POLL_INTERVAL_MS", default_log_poll_interval_ms())?,
            log_channel_capacity: parse_env("LOG_CHANNEL_CAPACITY", default_log_channel_capacity())?,
            health_port: parse_env("HEALTH_PORT", default_health_port())?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account_poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "account_poll_interval_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.log_poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "log_poll_interval_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.log_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "log_channel_capacity".into(),
                message: "must be greater than zero".into(),
            });
        }
        if let Some(url) = &self.rpc_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }
        Ok(())
    }

    pub fn account_poll_interval(&self) -> Duration {
        Duration::from_millis(self.account_poll_interval_ms)
    }

    pub fn log_poll_interval(&self) -> Duration {
        Duration::from_millis(self.log_poll_interval_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: name.to_string(),
            message: format!("cannot parse {:?}", raw),
        }),
        Err(_) => Ok(default),
    }
}

/// Deployment of both contracts on one network
///
/// Same shape as the `config.json` written by the deployment script.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NetworkDeployment {
    /// RPC endpoint the contracts were deployed through
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default, alias = "chainId", alias = "chainid")]
    pub chain_id: Option<u64>,

    #[serde(alias = "appAddress", alias = "appaddress")]
    pub app_address: String,

    #[serde(alias = "dataAddress", alias = "dataaddress")]
    pub data_address: String,
}

impl NetworkDeployment {
    pub fn address_of(&self, name: ContractName) -> Result<Address, ConfigError> {
        let raw = match name {
            ContractName::AppContract => &self.app_address,
            ContractName::DataContract => &self.data_address,
        };
        raw.parse::<Account>().map(|account| account.address())
    }
}

/// Contract deployments keyed by network name, loaded once at startup
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Deployments {
    networks: BTreeMap<String, NetworkDeployment>,
}

impl Deployments {
    pub fn new(networks: BTreeMap<String, NetworkDeployment>) -> Self {
        Self { networks }
    }

    /// Load a JSON deployment file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let to_error = |e: config::ConfigError| ConfigError::Deployments {
            path: display.clone(),
            message: e.to_string(),
        };

        let deployments: Deployments = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json))
            .build()
            .map_err(to_error)?
            .try_deserialize()
            .map_err(to_error)?;

        deployments.validate()?;
        Ok(deployments)
    }

    /// Check every configured address up front
    pub fn validate(&self) -> Result<(), ConfigError> {
        for deployment in self.networks.values() {
            for name in ContractName::ALL {
                deployment.address_of(name)?;
            }
        }
        Ok(())
    }

    pub fn network(&self, name: &str) -> Option<&NetworkDeployment> {
        self.networks.get(name)
    }

    pub fn for_chain(&self, chain_id: u64) -> Option<(&str, &NetworkDeployment)> {
        self.networks
            .iter()
            .find(|(_, d)| d.chain_id == Some(chain_id))
            .map(|(name, d)| (name.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
