//! Integration tests for the connection attempt coordinator.
//!
//! A stub connection manager exposes each connection's signal sender so the
//! tests can drive status changes by hand. Time is paused, so the 30 second
//! timeout elapses instantly.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::time::{Instant, sleep, timeout};

use accounts_wizard::accounts::{ParamValue, Parameters};
use accounts_wizard::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use accounts_wizard::coordinator::{AttemptResult, ConnectionAttemptCoordinator, RequesterId};
use accounts_wizard::error::{AccountError, ManagerError};
use accounts_wizard::manager::{
    ConnectionHandle, ConnectionManager, ConnectionSignal, ConnectionStatus, StatusReason,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(120);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Stub manager: records calls and lets the test emit signals.
#[derive(Default)]
struct StubManager {
    senders: Mutex<HashMap<ConnectionHandle, broadcast::Sender<ConnectionSignal>>>,
    connected: Mutex<Vec<ConnectionHandle>>,
    disconnected: Mutex<Vec<ConnectionHandle>>,
    requests: AtomicUsize,
    reject: bool,
    /// Report every connection as already up.
    shared: bool,
    /// How long a disconnect takes to return.
    disconnect_delay: Duration,
}

impl StubManager {
    fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    fn shared() -> Self {
        Self {
            shared: true,
            ..Default::default()
        }
    }

    fn slow_disconnect(delay: Duration) -> Self {
        Self {
            disconnect_delay: delay,
            ..Default::default()
        }
    }

    async fn emit(&self, handle: &ConnectionHandle, signal: ConnectionSignal) {
        let senders = self.senders.lock().await;
        let sender = senders.get(handle).expect("unknown handle");
        sender.send(signal).expect("nobody is listening");
    }

    async fn receiver_count(&self, handle: &ConnectionHandle) -> usize {
        self.senders
            .lock()
            .await
            .get(handle)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    async fn disconnected(&self) -> Vec<ConnectionHandle> {
        self.disconnected.lock().await.clone()
    }

    /// Wait until a connection has been started and return its handle.
    async fn wait_connecting(&self) -> ConnectionHandle {
        loop {
            if let Some(handle) = self.connected.lock().await.last().cloned() {
                return handle;
            }
            sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl ConnectionManager for StubManager {
    async fn request_connection(
        &self,
        protocol: &str,
        _params: &Parameters,
    ) -> Result<ConnectionHandle, ManagerError> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        if self.reject {
            return Err(ManagerError::RequestFailed {
                protocol: protocol.to_string(),
                reason: "rejected".into(),
            });
        }
        let handle = ConnectionHandle(format!("stub/{protocol}/{n}"));
        let (tx, _rx) = broadcast::channel(8);
        self.senders.lock().await.insert(handle.clone(), tx);
        Ok(handle)
    }

    async fn connect(&self, handle: &ConnectionHandle) -> Result<(), ManagerError> {
        self.connected.lock().await.push(handle.clone());
        Ok(())
    }

    async fn disconnect(&self, handle: &ConnectionHandle) -> Result<(), ManagerError> {
        self.disconnected.lock().await.push(handle.clone());
        sleep(self.disconnect_delay).await;
        Ok(())
    }

    async fn status(&self, handle: &ConnectionHandle) -> Result<ConnectionStatus, ManagerError> {
        if self.shared {
            Ok(ConnectionStatus::Connected)
        } else if self.connected.lock().await.contains(handle) {
            Ok(ConnectionStatus::Connecting)
        } else {
            Ok(ConnectionStatus::Disconnected)
        }
    }

    async fn subscribe(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<broadcast::Receiver<ConnectionSignal>, ManagerError> {
        self.senders
            .lock()
            .await
            .get(handle)
            .map(broadcast::Sender::subscribe)
            .ok_or_else(|| ManagerError::UnknownHandle(handle.to_string()))
    }
}

fn params(account: &str) -> Parameters {
    let mut params = Parameters::new();
    params.insert("account".into(), ParamValue::Str(account.into()));
    params.insert("password".into(), ParamValue::Str("pw".into()));
    params
}

fn online_monitor() -> Arc<ConnectivityMonitor> {
    let monitor = ConnectivityMonitor::new();
    monitor.handle_event(ConnectivityEvent::up("wlan0"));
    monitor
}

fn setup(
    manager: StubManager,
    monitor: Arc<ConnectivityMonitor>,
) -> (Arc<StubManager>, Arc<ConnectionAttemptCoordinator>) {
    let manager = Arc::new(manager);
    let coordinator = ConnectionAttemptCoordinator::new(manager.clone(), monitor, CONNECT_TIMEOUT);
    (manager, coordinator)
}

/// Start an attempt whose result arrives on the returned receiver.
async fn start(
    coordinator: &ConnectionAttemptCoordinator,
    requester: RequesterId,
    account: &str,
) -> (bool, oneshot::Receiver<AttemptResult>) {
    let (tx, rx) = oneshot::channel();
    let started = coordinator
        .connect(
            requester,
            "jabber",
            params(account),
            true,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        )
        .await;
    (started, rx)
}

async fn result_of(rx: oneshot::Receiver<AttemptResult>) -> AttemptResult {
    timeout(TEST_TIMEOUT, rx)
        .await
        .expect("attempt did not finish")
        .expect("callback dropped without a result")
}

#[tokio::test(start_paused = true)]
async fn connected_attempt_reports_handle_and_cleans_up() {
    let (manager, coordinator) = setup(StubManager::default(), online_monitor());
    let requester = RequesterId::new();

    let (started, rx) = start(&coordinator, requester, "alice@example.org").await;
    assert!(started);
    let handle = manager.wait_connecting().await;
    assert!(coordinator.is_in_progress(requester).await);

    sleep(Duration::from_secs(2)).await;
    manager
        .emit(
            &handle,
            ConnectionSignal::StatusChanged {
                status: ConnectionStatus::Connected,
                reason: StatusReason::Requested,
            },
        )
        .await;

    assert_eq!(result_of(rx).await, Ok(handle.clone()));
    assert_eq!(manager.disconnected().await, vec![handle.clone()]);
    assert_eq!(manager.receiver_count(&handle).await, 0);
    assert!(!coordinator.is_in_progress(requester).await);
}

#[tokio::test(start_paused = true)]
async fn authentication_failure_is_translated() {
    let (manager, coordinator) = setup(StubManager::default(), online_monitor());

    let (_, rx) = start(&coordinator, RequesterId::new(), "alice@example.org").await;
    let handle = manager.wait_connecting().await;
    manager
        .emit(
            &handle,
            ConnectionSignal::StatusChanged {
                status: ConnectionStatus::Disconnected,
                reason: StatusReason::AuthenticationFailed,
            },
        )
        .await;

    assert_eq!(
        result_of(rx).await,
        Err(AccountError::AuthenticationFailed {
            account: "alice@example.org".into()
        })
    );
    // Already disconnected; nothing to tear down.
    assert!(manager.disconnected().await.is_empty());
    assert_eq!(manager.receiver_count(&handle).await, 0);
}

#[tokio::test(start_paused = true)]
async fn error_name_refines_unspecified_disconnect() {
    let (manager, coordinator) = setup(StubManager::default(), online_monitor());

    let (_, rx) = start(&coordinator, RequesterId::new(), "alice@example.org").await;
    let handle = manager.wait_connecting().await;
    manager
        .emit(
            &handle,
            ConnectionSignal::ConnectionError {
                name: "org.freedesktop.Telepathy.Error.NameInUse".into(),
                details: "resource conflict".into(),
            },
        )
        .await;
    manager
        .emit(
            &handle,
            ConnectionSignal::StatusChanged {
                status: ConnectionStatus::Disconnected,
                reason: StatusReason::None,
            },
        )
        .await;

    assert_eq!(
        result_of(rx).await,
        Err(AccountError::NameInUse {
            account: "alice@example.org".into()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn no_connectivity_fails_after_timeout() {
    let (manager, coordinator) = setup(StubManager::default(), ConnectivityMonitor::new());
    let began = Instant::now();

    let (_, rx) = start(&coordinator, RequesterId::new(), "alice@example.org").await;

    assert_eq!(result_of(rx).await, Err(AccountError::ConnectionFailed));
    assert!(began.elapsed() >= CONNECT_TIMEOUT);
    assert_eq!(manager.requests.load(Ordering::SeqCst), 0);
    assert!(manager.disconnected().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn connectivity_arriving_late_resumes_attempt() {
    let monitor = ConnectivityMonitor::new();
    let (manager, coordinator) = setup(StubManager::default(), Arc::clone(&monitor));
    let requester = RequesterId::new();

    let (_, rx) = start(&coordinator, requester, "alice@example.org").await;
    sleep(Duration::from_secs(5)).await;
    assert_eq!(manager.requests.load(Ordering::SeqCst), 0);

    monitor.handle_event(ConnectivityEvent::up("eth0"));
    let handle = manager.wait_connecting().await;
    let attempts = coordinator.active_attempts().await;
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].bearers.contains("eth0"));

    manager
        .emit(
            &handle,
            ConnectionSignal::StatusChanged {
                status: ConnectionStatus::Connected,
                reason: StatusReason::Requested,
            },
        )
        .await;
    assert_eq!(result_of(rx).await, Ok(handle));
}

#[tokio::test(start_paused = true)]
async fn duplicate_connect_is_ignored() {
    let (manager, coordinator) = setup(StubManager::default(), online_monitor());
    let requester = RequesterId::new();

    let (first, rx) = start(&coordinator, requester, "alice@example.org").await;
    let (second, rx_dup) = start(&coordinator, requester, "bob@example.org").await;
    assert!(first);
    assert!(!second);
    // The rejected callback is dropped unused.
    assert!(rx_dup.await.is_err());

    let handle = manager.wait_connecting().await;
    manager
        .emit(
            &handle,
            ConnectionSignal::StatusChanged {
                status: ConnectionStatus::Connected,
                reason: StatusReason::Requested,
            },
        )
        .await;
    assert_eq!(result_of(rx).await, Ok(handle));
    assert_eq!(manager.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn destroyed_requester_never_gets_a_callback() {
    let (manager, coordinator) = setup(StubManager::default(), online_monitor());
    let requester = RequesterId::new();

    let (_, rx) = start(&coordinator, requester, "alice@example.org").await;
    let handle = manager.wait_connecting().await;

    assert!(coordinator.requester_destroyed(requester).await);
    assert!(!coordinator.requester_destroyed(requester).await);
    assert!(timeout(TEST_TIMEOUT, rx).await.expect("callback leaked").is_err());
    assert_eq!(manager.receiver_count(&handle).await, 0);
    assert!(!coordinator.is_in_progress(requester).await);
    // The verification connection is not left behind.
    assert_eq!(manager.disconnected().await, vec![handle]);

    // The requester may start over.
    let (restarted, _rx) = start(&coordinator, requester, "alice@example.org").await;
    assert!(restarted);
}

#[tokio::test(start_paused = true)]
async fn requester_destroyed_while_disconnecting_gets_no_callback() {
    let (manager, coordinator) = setup(
        StubManager::slow_disconnect(Duration::from_secs(5)),
        online_monitor(),
    );
    let requester = RequesterId::new();

    let (_, rx) = start(&coordinator, requester, "alice@example.org").await;
    let handle = manager.wait_connecting().await;
    manager
        .emit(
            &handle,
            ConnectionSignal::StatusChanged {
                status: ConnectionStatus::Connected,
                reason: StatusReason::Requested,
            },
        )
        .await;

    // The attempt is now waiting on its disconnect.
    sleep(Duration::from_secs(1)).await;
    assert_eq!(manager.disconnected().await, vec![handle.clone()]);
    assert!(coordinator.is_in_progress(requester).await);

    assert!(coordinator.requester_destroyed(requester).await);
    sleep(Duration::from_secs(10)).await;

    assert!(timeout(TEST_TIMEOUT, rx).await.expect("callback leaked").is_err());
    assert!(!coordinator.is_in_progress(requester).await);
}

#[tokio::test(start_paused = true)]
async fn connecting_status_renews_timeout() {
    let (manager, coordinator) = setup(StubManager::default(), online_monitor());

    let (_, mut rx) = start(&coordinator, RequesterId::new(), "alice@example.org").await;
    let handle = manager.wait_connecting().await;

    sleep(Duration::from_secs(20)).await;
    manager
        .emit(
            &handle,
            ConnectionSignal::StatusChanged {
                status: ConnectionStatus::Connecting,
                reason: StatusReason::Requested,
            },
        )
        .await;
    sleep(Duration::from_secs(20)).await;
    assert!(rx.try_recv().is_err(), "attempt should still be running");

    manager
        .emit(
            &handle,
            ConnectionSignal::StatusChanged {
                status: ConnectionStatus::Connected,
                reason: StatusReason::Requested,
            },
        )
        .await;
    assert_eq!(result_of(rx).await, Ok(handle));
}

#[tokio::test(start_paused = true)]
async fn silent_connection_times_out_and_is_torn_down() {
    let (manager, coordinator) = setup(StubManager::default(), online_monitor());

    let (_, rx) = start(&coordinator, RequesterId::new(), "alice@example.org").await;
    let handle = manager.wait_connecting().await;
    let began = Instant::now();

    assert_eq!(result_of(rx).await, Err(AccountError::ConnectionFailed));
    let waited = began.elapsed();
    assert!(waited <= CONNECT_TIMEOUT, "timed out late: {waited:?}");
    assert!(waited >= CONNECT_TIMEOUT - Duration::from_secs(1), "timed out early: {waited:?}");

    assert_eq!(manager.receiver_count(&handle).await, 0);
    assert_eq!(manager.disconnected().await, vec![handle]);
}

#[tokio::test(start_paused = true)]
async fn manager_rejection_fails_immediately() {
    let (manager, coordinator) = setup(StubManager::rejecting(), online_monitor());
    let began = Instant::now();

    let (_, rx) = start(&coordinator, RequesterId::new(), "alice@example.org").await;

    assert_eq!(result_of(rx).await, Err(AccountError::ConnectionFailed));
    assert!(began.elapsed() < Duration::from_secs(1));
    assert_eq!(manager.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn already_connected_resolves_without_signal() {
    let (manager, coordinator) = setup(StubManager::shared(), online_monitor());
    let began = Instant::now();

    let (_, rx) = start(&coordinator, RequesterId::new(), "alice@example.org").await;
    let handle = result_of(rx).await.expect("shared connection should be reported up");

    assert!(began.elapsed() < Duration::from_secs(1));
    assert_eq!(manager.disconnected().await, vec![handle]);
}
