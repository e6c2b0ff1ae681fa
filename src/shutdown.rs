//! Graceful shutdown coordination.
//!
//! A shared [`ShutdownCoordinator`] lets the orchestrator notice a user
//! interrupt at its suspension points (rate-limit waits, in-flight fetches)
//! and exit with a flushed, resumable checkpoint instead of a corrupted one.

use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared handle to a shutdown coordinator.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

static GLOBAL_SHUTDOWN: OnceCell<SharedShutdown> = OnceCell::new();

/// Register a process-wide shutdown handle so subsystems can discover it lazily.
pub fn install_global(handle: SharedShutdown) {
    let _ = GLOBAL_SHUTDOWN.set(handle);
}

/// Retrieve the registered process-wide shutdown handle, if any.
pub fn global() -> Option<SharedShutdown> {
    GLOBAL_SHUTDOWN.get().cloned()
}

/// Coordinates cooperative cancellation across async tasks.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Create a new shared coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Request cancellation. Waiters are notified exactly once.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Wait until cancellation is requested. Returns immediately if already
    /// triggered.
    pub async fn triggered(&self) {
        if self.is_triggered() {
            return;
        }
        self.notify.notified().await;
    }
}
