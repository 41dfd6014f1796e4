//! Flight surety synchronization core
//!
//! Tracks the wallet provider, the active account, the two deployed
//! contracts and their composite operational status, and records the
//! chain's transaction log.

pub mod account;
pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod notify;
pub mod provider;
pub mod registry;
pub mod service;
pub mod status;
pub mod toggle;
pub mod txlog;
pub mod types;


pub use client::{connect, AlloyContract, AlloyWallet, RpcEnvironment};
pub use config::{Deployments, NetworkDeployment, SyncConfig};
pub use error::{ConfigError, ErrorSeverity, RemoteCallError, SyncError, SyncResult};
pub use health::{HealthServer, HealthState};
pub use notify::Notifier;
pub use provider::{
    ContractClient, HostEnvironment, LogFilter, LogStream, ProviderHandle, StaticEnvironment,
    WalletProvider,
};
pub use registry::RegistryState;
pub use service::{SyncOptions, SyncView, Synchronizer, SynchronizerBuilder};
pub use toggle::OptimisticToggle;
pub use txlog::{LogSubscription, TransactionLog};
pub use types::*;
