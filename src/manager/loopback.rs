//! Loopback connection manager — a simulated manager that never touches the
//! network.
//!
//! Each connection resolves after a fixed delay according to a per-account
//! script or, failing that, a credential check. Used by the demo binary.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{ConnectionHandle, ConnectionManager, ConnectionSignal, ConnectionStatus, StatusReason};
use crate::accounts::{ACCOUNT_PARAM, ParamValue, Parameters};
use crate::error::ManagerError;

/// Parameter holding the account password.
const PASSWORD_PARAM: &str = "password";

/// Signal channel capacity per connection.
const SIGNAL_CAPACITY: usize = 16;

/// How a simulated connection ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Connect,
    Disconnect(StatusReason),
    /// Report a named error, then disconnect with no reason.
    Error(String),
    /// Stay in `Connecting` forever.
    Hang,
    /// Refuse to create the connection at all.
    Reject(String),
}

struct LoopbackConnection {
    account: String,
    password: Option<String>,
    signals: broadcast::Sender<ConnectionSignal>,
    status: ConnectionStatus,
    task: Option<JoinHandle<()>>,
}

/// Simulated connection manager.
pub struct LoopbackManager {
    protocols: BTreeSet<String>,
    delay: Duration,
    scripts: RwLock<HashMap<String, ScriptedOutcome>>,
    credentials: RwLock<HashMap<String, SecretString>>,
    connections: Arc<RwLock<HashMap<ConnectionHandle, LoopbackConnection>>>,
    next_id: AtomicU64,
}

impl LoopbackManager {
    /// Create a manager offering `protocols`, resolving connections after
    /// `delay`.
    pub fn new<I, S>(protocols: I, delay: Duration) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            protocols: protocols.into_iter().map(Into::into).collect(),
            delay,
            scripts: RwLock::new(HashMap::new()),
            credentials: RwLock::new(HashMap::new()),
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        })
    }

    /// Force the outcome for connections of `account`.
    pub async fn script(&self, account: impl Into<String>, outcome: ScriptedOutcome) {
        self.scripts.write().await.insert(account.into(), outcome);
    }

    /// Register the only password `account` may sign in with.
    pub async fn add_credentials(&self, account: impl Into<String>, password: SecretString) {
        self.credentials.write().await.insert(account.into(), password);
    }

    /// Number of connections currently known to the manager.
    pub async fn live_connections(&self) -> usize {
        self.connections.read().await.len()
    }

    async fn outcome_for(&self, account: &str, password: Option<&str>) -> ScriptedOutcome {
        if let Some(outcome) = self.scripts.read().await.get(account) {
            return outcome.clone();
        }
        match self.credentials.read().await.get(account) {
            Some(expected) if Some(expected.expose_secret()) != password => {
                ScriptedOutcome::Disconnect(StatusReason::AuthenticationFailed)
            }
            _ => ScriptedOutcome::Connect,
        }
    }
}

#[async_trait]
impl ConnectionManager for LoopbackManager {
    async fn request_connection(
        &self,
        protocol: &str,
        params: &Parameters,
    ) -> Result<ConnectionHandle, ManagerError> {
        if !self.protocols.contains(protocol) {
            return Err(ManagerError::ProtocolUnavailable {
                protocol: protocol.to_string(),
            });
        }

        let account = params
            .get(ACCOUNT_PARAM)
            .and_then(ParamValue::as_str)
            .unwrap_or_default()
            .to_string();

        if let Some(ScriptedOutcome::Reject(reason)) = self.scripts.read().await.get(&account) {
            return Err(ManagerError::RequestFailed {
                protocol: protocol.to_string(),
                reason: reason.clone(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = ConnectionHandle(format!("loopback/{protocol}/{id}"));
        let (signals, _rx) = broadcast::channel(SIGNAL_CAPACITY);

        let connection = LoopbackConnection {
            account,
            password: params
                .get(PASSWORD_PARAM)
                .and_then(ParamValue::as_str)
                .map(str::to_string),
            signals,
            status: ConnectionStatus::Disconnected,
            task: None,
        };
        self.connections.write().await.insert(handle.clone(), connection);

        debug!(handle = %handle, "Loopback connection created");
        Ok(handle)
    }

    async fn connect(&self, handle: &ConnectionHandle) -> Result<(), ManagerError> {
        let (account, password) = {
            let connections = self.connections.read().await;
            let conn = connections
                .get(handle)
                .ok_or_else(|| ManagerError::UnknownHandle(handle.to_string()))?;
            (conn.account.clone(), conn.password.clone())
        };
        let outcome = self.outcome_for(&account, password.as_deref()).await;

        let mut connections = self.connections.write().await;
        let conn = connections
            .get_mut(handle)
            .ok_or_else(|| ManagerError::UnknownHandle(handle.to_string()))?;

        conn.status = ConnectionStatus::Connecting;
        let _ = conn.signals.send(ConnectionSignal::StatusChanged {
            status: ConnectionStatus::Connecting,
            reason: StatusReason::Requested,
        });

        let delay = self.delay;
        let table = Arc::clone(&self.connections);
        let handle = handle.clone();
        conn.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let mut connections = table.write().await;
            let Some(conn) = connections.get_mut(&handle) else {
                return;
            };
            let (status, reason) = match outcome {
                ScriptedOutcome::Connect => (ConnectionStatus::Connected, StatusReason::Requested),
                ScriptedOutcome::Disconnect(reason) => (ConnectionStatus::Disconnected, reason),
                ScriptedOutcome::Error(name) => {
                    let _ = conn.signals.send(ConnectionSignal::ConnectionError {
                        name,
                        details: format!("simulated failure for {}", conn.account),
                    });
                    (ConnectionStatus::Disconnected, StatusReason::None)
                }
                ScriptedOutcome::Hang | ScriptedOutcome::Reject(_) => return,
            };
            conn.status = status;
            info!(handle = %handle, ?status, ?reason, "Loopback connection resolved");
            let _ = conn
                .signals
                .send(ConnectionSignal::StatusChanged { status, reason });
        }));

        Ok(())
    }

    async fn disconnect(&self, handle: &ConnectionHandle) -> Result<(), ManagerError> {
        let conn = self
            .connections
            .write()
            .await
            .remove(handle)
            .ok_or_else(|| ManagerError::UnknownHandle(handle.to_string()))?;

        if let Some(task) = conn.task {
            task.abort();
        }
        if conn.status != ConnectionStatus::Disconnected {
            let _ = conn.signals.send(ConnectionSignal::StatusChanged {
                status: ConnectionStatus::Disconnected,
                reason: StatusReason::Requested,
            });
        }
        debug!(handle = %handle, "Loopback connection dropped");
        Ok(())
    }

    async fn status(&self, handle: &ConnectionHandle) -> Result<ConnectionStatus, ManagerError> {
        self.connections
            .read()
            .await
            .get(handle)
            .map(|conn| conn.status)
            .ok_or_else(|| ManagerError::UnknownHandle(handle.to_string()))
    }

    async fn subscribe(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<broadcast::Receiver<ConnectionSignal>, ManagerError> {
        self.connections
            .read()
            .await
            .get(handle)
            .map(|conn| conn.signals.subscribe())
            .ok_or_else(|| ManagerError::UnknownHandle(handle.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(account: &str, password: &str) -> Parameters {
        let mut params = Parameters::new();
        params.insert(ACCOUNT_PARAM.into(), ParamValue::Str(account.into()));
        params.insert(PASSWORD_PARAM.into(), ParamValue::Str(password.into()));
        params
    }

    async fn final_status(
        manager: &LoopbackManager,
        params: &Parameters,
    ) -> (ConnectionStatus, StatusReason) {
        let handle = manager.request_connection("jabber", params).await.unwrap();
        let mut rx = manager.subscribe(&handle).await.unwrap();
        manager.connect(&handle).await.unwrap();
        loop {
            if let ConnectionSignal::StatusChanged { status, reason } = rx.recv().await.unwrap()
                && status != ConnectionStatus::Connecting
            {
                return (status, reason);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_protocol_is_rejected() {
        let manager = LoopbackManager::new(["jabber"], Duration::from_secs(1));
        let err = manager
            .request_connection("sip", &params("a@b", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::ProtocolUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn status_tracks_resolution() {
        let manager = LoopbackManager::new(["jabber"], Duration::from_secs(1));
        let handle = manager
            .request_connection("jabber", &params("a@b", "pw"))
            .await
            .unwrap();
        assert_eq!(manager.status(&handle).await.unwrap(), ConnectionStatus::Disconnected);

        manager.connect(&handle).await.unwrap();
        assert_eq!(manager.status(&handle).await.unwrap(), ConnectionStatus::Connecting);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(manager.status(&handle).await.unwrap(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn connects_without_credentials_on_file() {
        let manager = LoopbackManager::new(["jabber"], Duration::from_secs(1));
        let (status, _) = final_status(&manager, &params("a@b", "pw")).await;
        assert_eq!(status, ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_password_fails_authentication() {
        let manager = LoopbackManager::new(["jabber"], Duration::from_secs(1));
        manager
            .add_credentials("a@b", SecretString::from("secret".to_string()))
            .await;

        let (status, reason) = final_status(&manager, &params("a@b", "guess")).await;
        assert_eq!(status, ConnectionStatus::Disconnected);
        assert_eq!(reason, StatusReason::AuthenticationFailed);

        let (status, _) = final_status(&manager, &params("a@b", "secret")).await;
        assert_eq!(status, ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_error_precedes_disconnect() {
        let manager = LoopbackManager::new(["jabber"], Duration::from_secs(1));
        manager
            .script("a@b", ScriptedOutcome::Error("NetworkError".into()))
            .await;

        let handle = manager
            .request_connection("jabber", &params("a@b", "pw"))
            .await
            .unwrap();
        let mut rx = manager.subscribe(&handle).await.unwrap();
        manager.connect(&handle).await.unwrap();

        let mut saw_error = false;
        loop {
            match rx.recv().await.unwrap() {
                ConnectionSignal::ConnectionError { name, .. } => {
                    assert_eq!(name, "NetworkError");
                    saw_error = true;
                }
                ConnectionSignal::StatusChanged {
                    status: ConnectionStatus::Disconnected,
                    ..
                } => break,
                ConnectionSignal::StatusChanged { .. } => {}
            }
        }
        assert!(saw_error);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_forgets_connection() {
        let manager = LoopbackManager::new(["jabber"], Duration::from_secs(1));
        let handle = manager
            .request_connection("jabber", &params("a@b", "pw"))
            .await
            .unwrap();
        assert_eq!(manager.live_connections().await, 1);

        manager.disconnect(&handle).await.unwrap();
        assert_eq!(manager.live_connections().await, 0);
        assert!(manager.connect(&handle).await.is_err());
    }
}
