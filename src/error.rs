//! Error types for the accounts wizard.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Connection manager error: {0}")]
    Manager(#[from] ManagerError),

    #[error("Account store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown service: {0}")]
    UnknownService(String),
}

/// The closed set of failure kinds surfaced to the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AlreadyInProgress,
    ConnectionFailed,
    AuthenticationFailed,
    NameInUse,
    UserCancelled,
    Unknown,
    InvalidValue,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AlreadyInProgress => "already_in_progress",
            Self::ConnectionFailed => "connection_failed",
            Self::AuthenticationFailed => "authentication_failed",
            Self::NameInUse => "name_in_use",
            Self::UserCancelled => "user_cancelled",
            Self::Unknown => "unknown",
            Self::InvalidValue => "invalid_value",
        };
        write!(f, "{s}")
    }
}

/// Account provisioning failures: connection outcomes and field validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("A connection attempt is already in progress for requester {requester}")]
    AlreadyInProgress { requester: Uuid },

    #[error("Problems with service connection")]
    ConnectionFailed,

    #[error("Authentication failed for {account}")]
    AuthenticationFailed { account: String },

    #[error("{account} is already in use")]
    NameInUse { account: String },

    #[error("Cancelled by user")]
    UserCancelled,

    #[error("Unexpected failure: {0}")]
    Unknown(String),

    #[error("{message}")]
    InvalidValue { field: String, message: String },
}

impl AccountError {
    /// Classify this error into the wizard's taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyInProgress { .. } => ErrorKind::AlreadyInProgress,
            Self::ConnectionFailed => ErrorKind::ConnectionFailed,
            Self::AuthenticationFailed { .. } => ErrorKind::AuthenticationFailed,
            Self::NameInUse { .. } => ErrorKind::NameInUse,
            Self::UserCancelled => ErrorKind::UserCancelled,
            Self::Unknown(_) => ErrorKind::Unknown,
            Self::InvalidValue { .. } => ErrorKind::InvalidValue,
        }
    }

    /// Shorthand for a field-level validation failure.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

// Persistence failures are never fatal to a save; they surface as Unknown.
impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        Self::Unknown(err.to_string())
    }
}

/// Errors reported by a connection manager.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ManagerError {
    #[error("No connection manager provides protocol {protocol}")]
    ProtocolUnavailable { protocol: String },

    #[error("Connection request for {protocol} failed: {reason}")]
    RequestFailed { protocol: String, reason: String },

    #[error("Connect on {handle} failed: {reason}")]
    ConnectFailed { handle: String, reason: String },

    #[error("Disconnect on {handle} failed: {reason}")]
    DisconnectFailed { handle: String, reason: String },

    #[error("Unknown connection handle {0}")]
    UnknownHandle(String),
}

/// Account persistence errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Account {id} not found")]
    NotFound { id: Uuid },

    #[error("Parameter {name} is not supported by protocol {protocol}")]
    UnsupportedParameter { protocol: String, name: String },

    #[error("Storage backend failed: {0}")]
    Backend(String),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
