//! Network reachability tracking.
//!
//! [`ConnectivityMonitor`] holds the last known state and fans transitions out
//! to registered listeners and channel subscribers. State comes from whoever
//! calls [`ConnectivityMonitor::report`]: a platform hook, a test, or the
//! polling task started by [`spawn_probe`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Network reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    /// The remote authority is believed reachable.
    Connected,
    /// No usable network.
    Disconnected,
}

impl ConnectivityState {
    /// Whether this is [`ConnectivityState::Connected`].
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    const fn from_connected(connected: bool) -> Self {
        if connected {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "online"),
            Self::Disconnected => write!(f, "offline"),
        }
    }
}

type Listener = Arc<dyn Fn(ConnectivityState) + Send + Sync>;

struct Inner {
    /// Held across a state change and its fan-out.
    report_lock: Mutex<()>,
    connected: AtomicBool,
    observed: AtomicBool,
    next_listener: AtomicU64,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    channels: Mutex<Vec<mpsc::UnboundedSender<ConnectivityState>>>,
}

/// Shared connectivity state with change notification.
///
/// Cloning is cheap; clones observe the same state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("state", &self.current())
            .field("observed", &self.has_observed())
            .finish_non_exhaustive()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Connected)
    }
}

impl ConnectivityMonitor {
    /// Create a monitor that assumes `initial` until the first report.
    #[must_use]
    pub fn new(initial: ConnectivityState) -> Self {
        Self {
            inner: Arc::new(Inner {
                report_lock: Mutex::new(()),
                connected: AtomicBool::new(initial.is_connected()),
                observed: AtomicBool::new(false),
                next_listener: AtomicU64::new(1),
                listeners: Mutex::new(BTreeMap::new()),
                channels: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The last known state.
    #[must_use]
    pub fn current(&self) -> ConnectivityState {
        ConnectivityState::from_connected(self.inner.connected.load(Ordering::SeqCst))
    }

    /// Whether any state has been reported since creation.
    #[must_use]
    pub fn has_observed(&self) -> bool {
        self.inner.observed.load(Ordering::SeqCst)
    }

    /// Record an observed state.
    ///
    /// Listeners run only when the state actually changes. Returns whether
    /// it did.
    ///
    /// Concurrent reports are serialized: a report's notifications are all
    /// delivered before the next report changes the state, so every
    /// subscriber sees transitions in the order they happened. Listeners
    /// must not call `report` on the same monitor.
    pub fn report(&self, state: ConnectivityState) -> bool {
        let _serial = self
            .inner
            .report_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.inner.observed.store(true, Ordering::SeqCst);
        let previous = ConnectivityState::from_connected(
            self.inner
                .connected
                .swap(state.is_connected(), Ordering::SeqCst),
        );
        if previous == state {
            return false;
        }

        info!(from = %previous, to = %state, "Connectivity changed");
        self.notify(state);
        true
    }

    /// Register a callback for state transitions.
    ///
    /// The callback runs on the reporting thread. Call
    /// [`Subscription::unsubscribe`] or drop the returned handle to deregister.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(ConnectivityState) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(listener));
        debug!(listener = id, "Connectivity listener registered");

        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Receive state transitions on a channel.
    ///
    /// The subscription ends when the receiver is dropped.
    #[must_use]
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<ConnectivityState> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify(&self, state: ConnectivityState) {
        // Snapshot so a listener may (de)register without deadlocking.
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(state);
        }

        self.inner
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(state).is_ok());
    }
}

/// Deregistration handle returned by [`ConnectivityMonitor::subscribe`].
///
/// The listener stays registered for as long as the handle lives.
#[derive(Debug)]
#[must_use = "dropping the handle deregisters the listener"]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Stop delivering transitions to the listener.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
            debug!(listener = self.id, "Connectivity listener removed");
        }
    }
}

/// Something that can tell whether the network is usable right now.
#[async_trait::async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Perform one reachability check.
    async fn check(&self) -> ConnectivityState;
}

/// Probe that opens a TCP connection to a known endpoint.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    /// Probe `address` (`host:port`), giving up after `timeout`.
    #[must_use]
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn check(&self) -> ConnectivityState {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => ConnectivityState::Connected,
            Ok(Err(e)) => {
                debug!(address = %self.address, error = %e, "Reachability probe failed");
                ConnectivityState::Disconnected
            }
            Err(_) => {
                debug!(address = %self.address, "Reachability probe timed out");
                ConnectivityState::Disconnected
            }
        }
    }
}

/// Cloneable stop signal for a polling task.
#[derive(Debug, Clone, Default)]
pub struct ProbeHandle {
    stop_signal: Arc<AtomicBool>,
}

impl ProbeHandle {
    /// Signal the task to stop after its current cycle.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }
}

/// Poll `probe` every `interval` and report into `monitor`.
pub fn spawn_probe(
    monitor: ConnectivityMonitor,
    probe: Arc<dyn ReachabilityProbe>,
    interval: Duration,
) -> (ProbeHandle, JoinHandle<()>) {
    let handle = ProbeHandle::default();
    let task_handle = handle.clone();

    let task = tokio::spawn(async move {
        debug!(interval_ms = interval.as_millis(), "Reachability polling started");
        while !task_handle.should_stop() {
            let state = probe.check().await;
            monitor.report(state);
            tokio::time::sleep(interval).await;
        }
        debug!("Reachability polling stopped");
    });

    (handle, task)
}
