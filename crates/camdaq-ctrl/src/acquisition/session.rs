//! Session handle and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};

/// Cooperative cancellation flag shared between a session handle and the
/// monitor task. `Notify` wakes a parked monitor immediately instead of
/// waiting for its next tick.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    /// Request cancellation and wake any parked waiter.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // notify_one banks a permit for a waiter that has not registered
        // yet; notify_waiters covers everyone already parked.
        self.notify.notify_one();
        self.notify.notify_waiters();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancellation is requested.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        // Re-check after registering: cancel() may have raced the first load.
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Caller-side handle to a running acquisition session.
///
/// Dropping the handle neither aborts nor detaches the session; the monitor
/// runs to its natural end unless [`SessionHandle::abort`] is called.
#[derive(Debug)]
pub struct SessionHandle {
    cancel: Arc<CancelFlag>,
    finished: oneshot::Receiver<()>,
}

impl SessionHandle {
    pub(crate) fn new(cancel: Arc<CancelFlag>, finished: oneshot::Receiver<()>) -> Self {
        Self { cancel, finished }
    }

    /// Request an abort. Returns immediately; completion is observed via
    /// [`SessionHandle::wait`] or the `Aborted`/`Finished` events.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Wait until the session reaches a terminal state.
    pub async fn wait(self) {
        // The sender dropping without a send also means the monitor is gone.
        let _ = self.finished.await;
    }
}
