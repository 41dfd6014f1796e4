//! Error types for the synchronizer
//!
//! Every stage recovers from these locally and translates them into a
//! published fallback state; they are only surfaced to callers from the
//! imperative actions (`toggle_contract_status`, `balance`).

use thiserror::Error;

/// Main error type for the synchronizer
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// No wallet provider is available in the host environment
    #[error("No wallet provider found")]
    ProviderUnavailable,

    /// A provider or contract call was rejected
    #[error("Remote call failed: {0}")]
    RemoteCall(#[from] RemoteCallError),

    /// The transaction log stream failed or ended
    #[error("Log subscription failed: {0}")]
    Subscription(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration-related errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid configuration value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid private key format")]
    InvalidPrivateKey,

    #[error("Invalid address format: {0}")]
    InvalidAddress(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Failed to load deployments from {path}: {message}")]
    Deployments { path: String, message: String },
}

/// Failures of calls into the provider or a deployed contract
#[derive(Error, Debug, Clone)]
pub enum RemoteCallError {
    #[error("RPC request failed: {0}")]
    Transport(String),

    #[error("Transaction reverted: {reason}")]
    Reverted { reason: String },

    #[error("User rejected the request")]
    UserRejected,

    #[error("{contract} is not deployed at {address}")]
    NotDeployed { contract: String, address: String },

    #[error("No deployment configured for chain {chain_id}")]
    UnknownNetwork { chain_id: u64 },

    #[error("Contracts are not resolved yet")]
    ContractsUnavailable,
}

/// Error severity levels for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Transient errors that may resolve on retry
    Transient,
    /// Errors requiring attention but not critical
    Warning,
    /// Critical errors requiring immediate attention
    Critical,
    /// Fatal errors that prevent operation
    Fatal,
}

impl SyncError {
    /// Get the severity level of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SyncError::ProviderUnavailable => ErrorSeverity::Fatal,
            SyncError::RemoteCall(e) => e.severity(),
            SyncError::Subscription(_) => ErrorSeverity::Transient,
            SyncError::Config(_) => ErrorSeverity::Fatal,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self.severity(), ErrorSeverity::Transient)
    }

    /// Get a short error code for metrics/logging
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            SyncError::RemoteCall(_) => "REMOTE_CALL_FAILURE",
            SyncError::Subscription(_) => "SUBSCRIPTION_FAILURE",
            SyncError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl RemoteCallError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            RemoteCallError::Transport(_) => ErrorSeverity::Transient,
            RemoteCallError::Reverted { .. } => ErrorSeverity::Warning,
            RemoteCallError::UserRejected => ErrorSeverity::Warning,
            RemoteCallError::NotDeployed { .. } => ErrorSeverity::Critical,
            RemoteCallError::UnknownNetwork { .. } => ErrorSeverity::Critical,
            RemoteCallError::ContractsUnavailable => ErrorSeverity::Transient,
        }
    }
}

/// Result type alias using SyncError
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Extension trait for converting transport errors to SyncError
pub trait ResultExt<T> {
    /// Convert to a remote call failure with context
    fn remote_context(self, context: &str) -> SyncResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn remote_context(self, context: &str) -> SyncResult<T> {
        self.map_err(|e| RemoteCallError::Transport(format!("{}: {}", context, e)).into())
    }
}
