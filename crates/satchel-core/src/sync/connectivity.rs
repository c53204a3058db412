//! Online/offline state tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::remote::RemoteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl From<bool> for Connectivity {
    fn from(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Online => "online",
            Self::Offline => "offline",
        })
    }
}

/// Callback run when connectivity comes back
pub type ReconnectCallback = Arc<dyn Fn() + Send + Sync>;

struct MonitorInner {
    state: watch::Sender<Connectivity>,
    callbacks: Mutex<Vec<ReconnectCallback>>,
    /// Bumped on every `offline -> online` transition
    reconnects: AtomicU64,
    debounce: Duration,
}

impl MonitorInner {
    fn fire(&self) {
        let callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            callback();
        }
    }

    /// Fire after the debounce window unless a later transition superseded this one.
    async fn fire_settled(self: Arc<Self>, generation: u64) {
        tokio::time::sleep(self.debounce).await;
        let superseded = self.reconnects.load(Ordering::SeqCst) != generation;
        let online = self.state.borrow().is_online();
        if superseded || !online {
            tracing::debug!(superseded, "Reconnect did not settle, coalesced");
            return;
        }
        self.fire();
    }
}

/// Passive two-state connectivity tracker.
///
/// The monitor never polls; environment signals arrive through
/// [`ConnectivityMonitor::report`]. Callbacks fire once the connection has
/// stayed up for the debounce window: a flap inside the window folds into the
/// latest `offline -> online` transition. With a zero window, or outside a
/// Tokio runtime, they fire immediately.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity, debounce: Duration) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            inner: Arc::new(MonitorInner {
                state,
                callbacks: Mutex::new(Vec::new()),
                reconnects: AtomicU64::new(0),
                debounce,
            }),
        }
    }

    pub fn current(&self) -> Connectivity {
        *self.inner.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Watch connectivity changes
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.inner.state.subscribe()
    }

    pub fn on_reconnect(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Feed an environment signal.
    ///
    /// Returns whether this was an `offline -> online` transition, i.e. whether
    /// reconnect callbacks fired or were scheduled.
    pub fn report(&self, next: Connectivity) -> bool {
        let previous = self.inner.state.send_replace(next);
        if previous == next {
            return false;
        }
        tracing::info!("Connectivity changed: {previous} -> {next}");

        if !next.is_online() {
            return false;
        }

        let generation = self.inner.reconnects.fetch_add(1, Ordering::SeqCst) + 1;
        if self.inner.debounce.is_zero() {
            self.inner.fire();
            return true;
        }
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(Arc::clone(&self.inner).fire_settled(generation));
            }
            Err(_) => self.inner.fire(),
        }
        true
    }
}

/// Ping the remote every `interval` and report the result to `monitor`.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_heartbeat(
    monitor: ConnectivityMonitor,
    remote: Arc<dyn RemoteStore>,
    interval: Duration,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reachable = matches!(tokio::time::timeout(timeout, remote.ping()).await, Ok(Ok(())));
            monitor.report(Connectivity::from(reachable));
        }
    })
}
