//! Connection manager interface — the external service that turns a protocol
//! and parameters into a live connection and reports its status.

pub mod loopback;

pub use loopback::{LoopbackManager, ScriptedOutcome};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::accounts::Parameters;
use crate::error::ManagerError;

/// Opaque handle to a connection created by a manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionHandle(pub String);

impl std::fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Why a connection changed status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReason {
    /// No reason given.
    None,
    Requested,
    NetworkError,
    AuthenticationFailed,
    EncryptionError,
    NameInUse,
    CertificateError,
}

/// Signals emitted for a connection handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum ConnectionSignal {
    StatusChanged {
        status: ConnectionStatus,
        reason: StatusReason,
    },
    /// A named error from the manager, usually followed by a disconnect.
    ConnectionError { name: String, details: String },
}

/// A pluggable connection manager.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    /// Create (but do not start) a connection for `protocol`.
    async fn request_connection(
        &self,
        protocol: &str,
        params: &Parameters,
    ) -> Result<ConnectionHandle, ManagerError>;

    /// Start connecting. Progress is reported through [`Self::subscribe`].
    async fn connect(&self, handle: &ConnectionHandle) -> Result<(), ManagerError>;

    async fn disconnect(&self, handle: &ConnectionHandle) -> Result<(), ManagerError>;

    /// Current status of a connection.
    async fn status(&self, handle: &ConnectionHandle) -> Result<ConnectionStatus, ManagerError>;

    /// Subscribe to status and error signals of a connection. Dropping the
    /// receiver ends the subscription.
    async fn subscribe(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<broadcast::Receiver<ConnectionSignal>, ManagerError>;
}
