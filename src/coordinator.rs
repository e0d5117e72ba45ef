//! Connection attempt coordinator — at most one in-flight connection attempt
//! per requester.
//!
//! An attempt waits for connectivity, asks the connection manager for a
//! handle, connects and watches status signals until the connection either
//! comes up, goes down, or stays unresolved past the timeout. Whatever ends
//! the attempt first finalizes it: subscriptions are dropped, the handle is
//! optionally disconnected and the completion callback runs exactly once.
//!
//! A requester that goes away early calls
//! [`ConnectionAttemptCoordinator::requester_destroyed`]; its attempt is
//! aborted and the callback never runs.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::accounts::{ACCOUNT_PARAM, ParamValue, Parameters};
use crate::connectivity::ConnectivityMonitor;
use crate::error::AccountError;
use crate::manager::{ConnectionHandle, ConnectionManager, ConnectionSignal, ConnectionStatus};
use crate::translate::ErrorTranslator;

/// Identity of whoever asked for a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequesterId(pub Uuid);

impl RequesterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequesterId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequesterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal result of an attempt.
pub type AttemptResult = Result<ConnectionHandle, AccountError>;

/// Completion callback, invoked exactly once per attempt.
pub type AttemptCallback = Box<dyn FnOnce(AttemptResult) + Send + 'static>;

/// Where an attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    WaitingForConnectivity,
    Requesting,
    Connecting,
}

impl std::fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::WaitingForConnectivity => "waiting_for_connectivity",
            Self::Requesting => "requesting",
            Self::Connecting => "connecting",
        };
        write!(f, "{s}")
    }
}

/// Bookkeeping for a live attempt, owned by the coordinator's table.
struct AttemptEntry {
    phase: AttemptPhase,
    bearers: BTreeSet<String>,
    started_at: DateTime<Utc>,
    task: Option<JoinHandle<()>>,
    /// Connection to drop if the requester goes away mid-attempt.
    handle: Option<ConnectionHandle>,
    disconnect_on_finish: bool,
}

type AttemptTable = Arc<Mutex<HashMap<RequesterId, AttemptEntry>>>;

/// Snapshot of a live attempt for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptInfo {
    pub requester: RequesterId,
    pub phase: AttemptPhase,
    pub bearers: BTreeSet<String>,
    pub started_at: DateTime<Utc>,
}

/// Owns every in-flight connection attempt.
pub struct ConnectionAttemptCoordinator {
    manager: Arc<dyn ConnectionManager>,
    connectivity: Arc<ConnectivityMonitor>,
    timeout: Duration,
    attempts: AttemptTable,
}

impl ConnectionAttemptCoordinator {
    pub fn new(
        manager: Arc<dyn ConnectionManager>,
        connectivity: Arc<ConnectivityMonitor>,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            connectivity,
            timeout,
            attempts: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Start a connection attempt on behalf of `requester`.
    ///
    /// Returns `false` without doing anything when the requester already has
    /// an attempt in flight; the existing attempt's callback is unaffected.
    pub async fn connect(
        &self,
        requester: RequesterId,
        protocol: &str,
        params: Parameters,
        disconnect_on_finish: bool,
        callback: AttemptCallback,
    ) -> bool {
        let mut attempts = self.attempts.lock().await;
        if attempts.contains_key(&requester) {
            debug!(requester = %requester, "Connection attempt already in progress, ignoring");
            return false;
        }

        let account = params
            .get(ACCOUNT_PARAM)
            .and_then(ParamValue::as_str)
            .unwrap_or_default()
            .to_string();
        info!(requester = %requester, protocol, account = %account, "Starting connection attempt");

        let attempt = Attempt {
            requester,
            protocol: protocol.to_string(),
            account,
            params,
            disconnect_on_finish,
            callback: Some(callback),
            handle: None,
            signals: None,
            status: ConnectionStatus::Disconnected,
            last_error: None,
            manager: Arc::clone(&self.manager),
            connectivity: Arc::clone(&self.connectivity),
            attempts: Arc::clone(&self.attempts),
            timeout: self.timeout,
        };

        // The table stays locked until the entry holds its task, so the task
        // cannot finalize against a missing entry.
        let task = tokio::spawn(attempt.run());
        attempts.insert(
            requester,
            AttemptEntry {
                phase: AttemptPhase::WaitingForConnectivity,
                bearers: BTreeSet::new(),
                started_at: Utc::now(),
                task: Some(task),
                handle: None,
                disconnect_on_finish,
            },
        );
        true
    }

    /// Abort the requester's attempt, if any, without running its callback.
    ///
    /// A connection the attempt already requested is disconnected on a best
    /// effort basis when the attempt was started with `disconnect_on_finish`.
    pub async fn requester_destroyed(&self, requester: RequesterId) -> bool {
        let Some(mut entry) = self.attempts.lock().await.remove(&requester) else {
            return false;
        };
        if let Some(task) = entry.task.take() {
            task.abort();
        }
        info!(requester = %requester, phase = %entry.phase, "Connection attempt aborted, requester gone");

        if entry.disconnect_on_finish
            && let Some(handle) = entry.handle.take()
            && let Err(e) = self.manager.disconnect(&handle).await
        {
            debug!(handle = %handle, error = %e, "Disconnect of abandoned attempt failed");
        }
        true
    }

    pub async fn is_in_progress(&self, requester: RequesterId) -> bool {
        self.attempts.lock().await.contains_key(&requester)
    }

    /// Snapshot of all live attempts.
    pub async fn active_attempts(&self) -> Vec<AttemptInfo> {
        self.attempts
            .lock()
            .await
            .iter()
            .map(|(requester, entry)| AttemptInfo {
                requester: *requester,
                phase: entry.phase,
                bearers: entry.bearers.clone(),
                started_at: entry.started_at,
            })
            .collect()
    }
}

/// State carried by an attempt's task.
struct Attempt {
    requester: RequesterId,
    protocol: String,
    account: String,
    params: Parameters,
    disconnect_on_finish: bool,
    callback: Option<AttemptCallback>,
    handle: Option<ConnectionHandle>,
    signals: Option<broadcast::Receiver<ConnectionSignal>>,
    status: ConnectionStatus,
    last_error: Option<String>,
    manager: Arc<dyn ConnectionManager>,
    connectivity: Arc<ConnectivityMonitor>,
    attempts: AttemptTable,
    timeout: Duration,
}

impl Attempt {
    async fn run(mut self) {
        let result = self.drive().await;
        self.finalize(result).await;
    }

    async fn drive(&mut self) -> AttemptResult {
        let timer = sleep_until(Instant::now() + self.timeout);
        tokio::pin!(timer);

        let bearers = tokio::select! {
            bearers = self.connectivity.wait_until_usable() => bearers,
            _ = &mut timer => {
                warn!(requester = %self.requester, "No connectivity before timeout");
                return Err(AccountError::ConnectionFailed);
            }
        };
        self.set_phase(AttemptPhase::Requesting, Some(bearers)).await;

        let request = self.manager.request_connection(&self.protocol, &self.params);
        let handle = tokio::select! {
            result = request => result.map_err(|e| {
                warn!(requester = %self.requester, error = %e, "Connection request failed");
                AccountError::ConnectionFailed
            })?,
            _ = &mut timer => {
                warn!(requester = %self.requester, "Connection request timed out");
                return Err(AccountError::ConnectionFailed);
            }
        };
        self.handle = Some(handle.clone());
        self.register_handle(&handle).await;

        let signals = self.manager.subscribe(&handle).await.map_err(|e| {
            warn!(requester = %self.requester, handle = %handle, error = %e, "Cannot watch connection");
            AccountError::ConnectionFailed
        })?;
        self.signals = Some(signals);

        if let Err(e) = self.manager.connect(&handle).await {
            warn!(requester = %self.requester, handle = %handle, error = %e, "Connect failed");
            return Err(AccountError::ConnectionFailed);
        }
        self.status = ConnectionStatus::Connecting;
        self.set_phase(AttemptPhase::Connecting, None).await;
        timer.as_mut().reset(Instant::now() + self.timeout);

        // A shared connection may already be up; no signal will follow.
        match self.manager.status(&handle).await {
            Ok(ConnectionStatus::Connected) => {
                self.status = ConnectionStatus::Connected;
                info!(requester = %self.requester, handle = %handle, "Connection already established");
                return Ok(handle);
            }
            Ok(_) => {}
            Err(e) => debug!(handle = %handle, error = %e, "Status query failed"),
        }

        loop {
            let Some(signals) = self.signals.as_mut() else {
                return Err(AccountError::Unknown("signal subscription lost".into()));
            };
            tokio::select! {
                signal = signals.recv() => match signal {
                    Ok(ConnectionSignal::StatusChanged { status: ConnectionStatus::Connecting, .. }) => {
                        debug!(handle = %handle, "Still connecting, timeout renewed");
                        timer.as_mut().reset(Instant::now() + self.timeout);
                    }
                    Ok(ConnectionSignal::StatusChanged { status: ConnectionStatus::Connected, .. }) => {
                        self.status = ConnectionStatus::Connected;
                        info!(requester = %self.requester, handle = %handle, "Connection established");
                        return Ok(handle);
                    }
                    Ok(ConnectionSignal::StatusChanged { status: ConnectionStatus::Disconnected, reason }) => {
                        self.status = ConnectionStatus::Disconnected;
                        let kind = ErrorTranslator::translate(reason, self.last_error.as_deref());
                        info!(requester = %self.requester, handle = %handle, ?reason, %kind, "Connection failed");
                        return Err(ErrorTranslator::to_error(kind, &self.account));
                    }
                    Ok(ConnectionSignal::ConnectionError { name, details }) => {
                        debug!(handle = %handle, error = %name, details = %details, "Connection error reported");
                        self.last_error = Some(name);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(handle = %handle, skipped, "Missed connection signals");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        self.status = ConnectionStatus::Disconnected;
                        return Err(AccountError::Unknown(format!("{handle} vanished while connecting")));
                    }
                },
                _ = &mut timer => {
                    warn!(requester = %self.requester, handle = %handle, "Connection attempt timed out");
                    return Err(AccountError::ConnectionFailed);
                }
            }
        }
    }

    async fn set_phase(&mut self, phase: AttemptPhase, bearers: Option<BTreeSet<String>>) {
        if let Some(entry) = self.attempts.lock().await.get_mut(&self.requester) {
            entry.phase = phase;
            if let Some(bearers) = bearers {
                entry.bearers = bearers;
            }
        }
    }

    async fn register_handle(&mut self, handle: &ConnectionHandle) {
        if let Some(entry) = self.attempts.lock().await.get_mut(&self.requester) {
            entry.handle = Some(handle.clone());
        }
    }

    /// Release the attempt and deliver its result. Safe to call again; only
    /// the first call that still finds the attempt registered does anything.
    ///
    /// The entry stays registered until the disconnect is done, so a
    /// requester torn down meanwhile aborts this task before the callback.
    async fn finalize(&mut self, result: AttemptResult) {
        if !self.attempts.lock().await.contains_key(&self.requester) {
            return;
        }

        self.signals = None;

        if self.disconnect_on_finish
            && self.status != ConnectionStatus::Disconnected
            && let Some(handle) = &self.handle
        {
            if let Err(e) = self.manager.disconnect(handle).await {
                warn!(handle = %handle, error = %e, "Disconnect after attempt failed");
            }
            self.status = ConnectionStatus::Disconnected;
        }

        // No await between removing the entry and running the callback.
        if self.attempts.lock().await.remove(&self.requester).is_none() {
            debug!(requester = %self.requester, "Requester gone before the attempt finished");
            return;
        }
        let Some(callback) = self.callback.take() else {
            return;
        };
        debug!(requester = %self.requester, ok = result.is_ok(), "Connection attempt finished");
        callback(result);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::ManagerError;

    /// Manager that never gets used; finalize tests only need the trait object.
    struct IdleManager;

    #[async_trait]
    impl ConnectionManager for IdleManager {
        async fn request_connection(
            &self,
            protocol: &str,
            _params: &Parameters,
        ) -> Result<ConnectionHandle, ManagerError> {
            Err(ManagerError::ProtocolUnavailable {
                protocol: protocol.to_string(),
            })
        }
        async fn connect(&self, handle: &ConnectionHandle) -> Result<(), ManagerError> {
            Err(ManagerError::UnknownHandle(handle.to_string()))
        }
        async fn disconnect(&self, _handle: &ConnectionHandle) -> Result<(), ManagerError> {
            Ok(())
        }
        async fn status(&self, handle: &ConnectionHandle) -> Result<ConnectionStatus, ManagerError> {
            Err(ManagerError::UnknownHandle(handle.to_string()))
        }
        async fn subscribe(
            &self,
            handle: &ConnectionHandle,
        ) -> Result<broadcast::Receiver<ConnectionSignal>, ManagerError> {
            Err(ManagerError::UnknownHandle(handle.to_string()))
        }
    }

    fn counting_attempt(table: &AttemptTable, calls: &Arc<AtomicUsize>) -> Attempt {
        let calls = Arc::clone(calls);
        Attempt {
            requester: RequesterId::new(),
            protocol: "jabber".into(),
            account: "user@x".into(),
            params: Parameters::new(),
            disconnect_on_finish: false,
            callback: Some(Box::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })),
            handle: None,
            signals: None,
            status: ConnectionStatus::Disconnected,
            last_error: None,
            manager: Arc::new(IdleManager),
            connectivity: ConnectivityMonitor::new(),
            attempts: Arc::clone(table),
            timeout: Duration::from_secs(30),
        }
    }

    fn entry() -> AttemptEntry {
        AttemptEntry {
            phase: AttemptPhase::Connecting,
            bearers: BTreeSet::new(),
            started_at: Utc::now(),
            task: None,
            handle: None,
            disconnect_on_finish: false,
        }
    }

    #[tokio::test]
    async fn finalize_is_idempotent() {
        let table: AttemptTable = Arc::new(Mutex::new(HashMap::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut attempt = counting_attempt(&table, &calls);
        table.lock().await.insert(attempt.requester, entry());

        attempt.finalize(Err(AccountError::ConnectionFailed)).await;
        attempt.finalize(Err(AccountError::ConnectionFailed)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(table.lock().await.is_empty());
    }

    #[tokio::test]
    async fn finalize_skips_released_attempt() {
        let table: AttemptTable = Arc::new(Mutex::new(HashMap::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut attempt = counting_attempt(&table, &calls);

        // Never registered (or already torn down by its requester).
        attempt.finalize(Ok(ConnectionHandle("h".into()))).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manager_error_fires_callback_immediately() {
        let monitor = ConnectivityMonitor::new();
        monitor.handle_event(crate::connectivity::ConnectivityEvent::up("wlan0"));
        let coordinator =
            ConnectionAttemptCoordinator::new(Arc::new(IdleManager), monitor, Duration::from_secs(30));

        let (tx, rx) = tokio::sync::oneshot::channel();
        let requester = RequesterId::new();
        let started = coordinator
            .connect(
                requester,
                "jabber",
                Parameters::new(),
                true,
                Box::new(move |res| {
                    let _ = tx.send(res);
                }),
            )
            .await;
        assert!(started);

        let before = Instant::now();
        let result = rx.await.unwrap();
        assert_eq!(result, Err(AccountError::ConnectionFailed));
        assert!(Instant::now() - before < Duration::from_secs(1));
        assert!(!coordinator.is_in_progress(requester).await);
    }

    #[test]
    fn phase_display_matches_serde() {
        for phase in [
            AttemptPhase::WaitingForConnectivity,
            AttemptPhase::Requesting,
            AttemptPhase::Connecting,
        ] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(format!("\"{phase}\""), json);
        }
    }
}
