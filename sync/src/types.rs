//! Types shared by the synchronizer stages

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigError, SyncResult};
use crate::provider::ContractClient;

/// Active signer address
///
/// Parsed case-insensitively, compared by bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account(Address);

impl Account {
    pub const fn new(address: Address) -> Self {
        Self(address)
    }

    pub fn address(&self) -> Address {
        self.0
    }
}

impl From<Address> for Account {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl FromStr for Account {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Address>()
            .map(Self)
            .map_err(|_| ConfigError::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_checksum(None))
    }
}

/// Published account state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "account", rename_all = "snake_case")]
pub enum AccountState {
    /// Nothing sampled yet
    #[default]
    Unknown,
    /// No provider, no authorized account, or the query failed
    Absent,
    /// Provider reports itself locked
    Locked,
    Present(Account),
}

impl AccountState {
    pub fn account(&self) -> Option<&Account> {
        match self {
            AccountState::Present(account) => Some(account),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, AccountState::Present(_))
    }
}

impl From<Option<Account>> for AccountState {
    fn from(account: Option<Account>) -> Self {
        account.map_or(AccountState::Absent, AccountState::Present)
    }
}

/// Logical names of the two deployed contracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContractName {
    AppContract,
    DataContract,
}

impl ContractName {
    pub const ALL: [ContractName; 2] = [ContractName::AppContract, ContractName::DataContract];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractName::AppContract => "AppContract",
            ContractName::DataContract => "DataContract",
        }
    }
}

impl fmt::Display for ContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live binding to one deployed contract
#[derive(Clone)]
pub struct ContractHandle {
    pub name: ContractName,
    pub address: Address,
    pub client: Arc<dyn ContractClient>,
}

impl ContractHandle {
    pub fn new(name: ContractName, client: Arc<dyn ContractClient>) -> Self {
        Self {
            name,
            address: client.address(),
            client,
        }
    }

    pub async fn is_operational(&self) -> SyncResult<bool> {
        self.client.is_operational().await
    }
}

impl fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractHandle")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Snapshot of both resolved contracts
///
/// Only constructible with both handles, so a snapshot never carries one
/// contract without the other.
#[derive(Debug, Clone)]
pub struct ContractRegistry {
    handles: BTreeMap<ContractName, ContractHandle>,
}

impl ContractRegistry {
    pub fn new(app: ContractHandle, data: ContractHandle) -> Self {
        let mut handles = BTreeMap::new();
        handles.insert(ContractName::AppContract, app);
        handles.insert(ContractName::DataContract, data);
        Self { handles }
    }

    pub fn get(&self, name: ContractName) -> Option<&ContractHandle> {
        self.handles.get(&name)
    }

    pub fn app(&self) -> &ContractHandle {
        &self.handles[&ContractName::AppContract]
    }

    pub fn data(&self) -> &ContractHandle {
        &self.handles[&ContractName::DataContract]
    }

    pub fn names(&self) -> impl Iterator<Item = ContractName> + '_ {
        self.handles.keys().copied()
    }

    pub fn contains_address(&self, address: &Address) -> bool {
        self.handles.values().any(|h| h.address == *address)
    }

    /// Name to address, for display and status reporting
    pub fn addresses(&self) -> BTreeMap<ContractName, Address> {
        self.handles.iter().map(|(name, h)| (*name, h.address)).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Composite operational status of both contracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum OperationalStatus {
    Active,
    Paused,
    #[default]
    Disconnected,
}

impl OperationalStatus {
    /// Fold the two `isOperational()` reads into one status
    pub fn from_reads(app: &SyncResult<bool>, data: &SyncResult<bool>) -> Self {
        match (app, data) {
            (Ok(true), Ok(true)) => OperationalStatus::Active,
            (Ok(_), Ok(_)) => OperationalStatus::Paused,
            _ => OperationalStatus::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationalStatus::Active => "active",
            OperationalStatus::Paused => "paused",
            OperationalStatus::Disconnected => "disconnected",
        }
    }

    /// Metric representation for Prometheus (0=disconnected, 1=paused, 2=active)
    pub fn as_metric(&self) -> u64 {
        match self {
            OperationalStatus::Disconnected => 0,
            OperationalStatus::Paused => 1,
            OperationalStatus::Active => 2,
        }
    }
}

impl fmt::Display for OperationalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log event observed on the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLogEntry {
    /// Emitting contract
    pub address: Address,

    /// Indexed topics; the first is the event signature for non-anonymous events
    pub topics: Vec<B256>,

    /// ABI-encoded non-indexed payload
    pub data: Bytes,

    pub block_number: Option<u64>,
    pub block_hash: Option<B256>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
}

impl TransactionLogEntry {
    pub fn event_signature(&self) -> Option<&B256> {
        self.topics.first()
    }

    /// Short hex form of the transaction hash for logs
    pub fn transaction_hex(&self) -> Option<String> {
        self.transaction_hash
            .map(|hash| format!("0x{}", hex::encode(hash.as_slice())))
    }
}

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// User-facing notification raised by a stage
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: &str, message: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            title: title.to_string(),
            message: message.to_string(),
            at: Utc::now(),
        }
    }
}

/// Synchronizer statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub started_at: Option<DateTime<Utc>>,
    /// Published account changes
    pub account_changes: u64,
    /// Status recomputations that reached publication
    pub status_recomputations: u64,
    /// Recomputations that changed the published status
    pub status_changes: u64,
    pub last_status_change: Option<DateTime<Utc>>,
    pub log_entries: u64,
    pub log_subscription_failures: u64,
    pub remote_call_failures: u64,
}

impl SyncStats {
    pub fn started() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn record_status(&mut self, changed: bool) {
        self.status_recomputations += 1;
        if changed {
            self.status_changes += 1;
            self.last_status_change = Some(Utc::now());
        }
    }
}
