//! Connectivity monitor — tracks which network access bearers are usable.
//!
//! Bearers come and go independently. The monitor only keeps the set of
//! bearer ids currently reported up; losing one bearer never cancels anything
//! by itself since another may still carry traffic.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// State reported for a single bearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BearerStatus {
    Connected,
    Disconnected,
}

/// An event from the connectivity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityEvent {
    pub status: BearerStatus,
    pub bearer_id: String,
}

impl ConnectivityEvent {
    pub fn up(bearer_id: impl Into<String>) -> Self {
        Self {
            status: BearerStatus::Connected,
            bearer_id: bearer_id.into(),
        }
    }

    pub fn down(bearer_id: impl Into<String>) -> Self {
        Self {
            status: BearerStatus::Disconnected,
            bearer_id: bearer_id.into(),
        }
    }
}

/// Watches bearer up/down events and lets callers wait for usability.
pub struct ConnectivityMonitor {
    up: watch::Sender<BTreeSet<String>>,
}

impl ConnectivityMonitor {
    /// Create a monitor with no bearer up.
    pub fn new() -> Arc<Self> {
        let (up, _rx) = watch::channel(BTreeSet::new());
        Arc::new(Self { up })
    }

    /// Apply a bearer event to the set of usable bearers.
    pub fn handle_event(&self, event: ConnectivityEvent) {
        match event.status {
            BearerStatus::Connected => {
                info!(bearer = %event.bearer_id, "Bearer up");
                // Always notify, even for an already-known bearer.
                self.up.send_modify(|set| {
                    set.insert(event.bearer_id);
                });
            }
            BearerStatus::Disconnected => {
                info!(bearer = %event.bearer_id, "Bearer down");
                self.up.send_if_modified(|set| set.remove(&event.bearer_id));
            }
        }
    }

    /// Whether any bearer is currently up.
    pub fn is_usable(&self) -> bool {
        !self.up.borrow().is_empty()
    }

    /// Snapshot of the bearers currently up.
    pub fn up_bearers(&self) -> BTreeSet<String> {
        self.up.borrow().clone()
    }

    /// Resolve once any bearer is usable, returning the bearers up at that
    /// moment.
    ///
    /// When a bearer is already up the returned future is ready on its first
    /// poll, so callers never wait spuriously.
    pub async fn wait_until_usable(&self) -> BTreeSet<String> {
        let mut rx = self.up.subscribe();
        match rx.wait_for(|set| !set.is_empty()).await {
            Ok(set) => set.clone(),
            // The sender lives as long as `self`; closing cannot happen here.
            Err(_) => BTreeSet::new(),
        }
    }

    /// Feed the monitor from a channel of connectivity events until the
    /// sending side closes.
    pub fn spawn_event_pump(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<ConnectivityEvent>,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                monitor.handle_event(event);
            }
            debug!("Connectivity event source closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn ready_immediately_when_bearer_up() {
        let monitor = ConnectivityMonitor::new();
        monitor.handle_event(ConnectivityEvent::up("wlan0"));

        let bearers = monitor
            .wait_until_usable()
            .now_or_never()
            .expect("should not suspend when already usable");
        assert!(bearers.contains("wlan0"));
    }

    #[tokio::test]
    async fn waits_for_next_bearer_up() {
        let monitor = ConnectivityMonitor::new();
        let waiter = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.wait_until_usable().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        monitor.handle_event(ConnectivityEvent::up("gprs0"));
        let bearers = waiter.await.unwrap();
        assert_eq!(bearers.into_iter().collect::<Vec<_>>(), vec!["gprs0"]);
    }

    #[test]
    fn bearer_down_only_removes_that_bearer() {
        let monitor = ConnectivityMonitor::new();
        monitor.handle_event(ConnectivityEvent::up("wlan0"));
        monitor.handle_event(ConnectivityEvent::up("gprs0"));
        monitor.handle_event(ConnectivityEvent::down("wlan0"));

        assert!(monitor.is_usable());
        assert_eq!(
            monitor.up_bearers().into_iter().collect::<Vec<_>>(),
            vec!["gprs0"]
        );

        monitor.handle_event(ConnectivityEvent::down("gprs0"));
        assert!(!monitor.is_usable());
    }

    #[test]
    fn unknown_bearer_down_is_ignored() {
        let monitor = ConnectivityMonitor::new();
        monitor.handle_event(ConnectivityEvent::down("eth9"));
        assert!(!monitor.is_usable());
    }

    #[tokio::test]
    async fn pump_feeds_events_into_monitor() {
        let monitor = ConnectivityMonitor::new();
        let (tx, rx) = mpsc::channel(4);
        let pump = monitor.spawn_event_pump(rx);

        tx.send(ConnectivityEvent::up("wlan0")).await.unwrap();
        let bearers = monitor.wait_until_usable().await;
        assert!(bearers.contains("wlan0"));

        drop(tx);
        pump.await.unwrap();
    }
}
