//! Timeout sources
//!
//! A [`TimeoutSource`] turns a single pending deadline into a
//! [`CancelSignal`]. The source owns the underlying sleep task directly, so
//! cleanup is a matter of ownership rather than bookkeeping: disposing the
//! source (explicitly or by drop) aborts the task, and firing the signal
//! through any path aborts it as well.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::{CancelSignal, Subscription};

/// A cancellation source backed by exactly one pending timer.
///
/// Invariants:
/// - at most one sleep task is live per source;
/// - a disposed source never fires its signal later;
/// - disposal is idempotent and also happens on drop.
#[derive(Debug)]
pub struct TimeoutSource {
    signal: CancelSignal,
    disposed: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
    abort_on_fire: Option<Subscription>,
}

impl TimeoutSource {
    /// Create a fresh signal that fires after `duration`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(duration: Duration) -> Self {
        Self::attach(CancelSignal::new(), duration)
    }

    /// Arm an existing host signal with a timeout.
    ///
    /// If the host signal has already fired, no timer is scheduled and the
    /// source is returned already disposed.
    pub fn attach(signal: CancelSignal, duration: Duration) -> Self {
        let disposed = Arc::new(AtomicBool::new(false));
        if signal.is_fired() {
            return Self { signal, disposed, task: None, abort_on_fire: None };
        }

        let armed = signal.clone();
        let guard = Arc::clone(&disposed);
        let task = tokio::spawn(async move {
            sleep(duration).await;
            if !guard.load(Ordering::SeqCst) {
                armed.fire();
            }
        });

        // Firing through any path (elapse, or an external fire on an
        // attached host signal) clears the pending task.
        let abort = task.abort_handle();
        let abort_on_fire = signal.subscribe(move || abort.abort());

        Self { signal, disposed, task: Some(task), abort_on_fire: Some(abort_on_fire) }
    }

    /// The signal this source fires.
    pub fn signal(&self) -> &CancelSignal {
        &self.signal
    }

    /// Abort the pending timer, if any. Safe to call any number of times.
    ///
    /// Also removes the listener this source registered on its signal, so an
    /// attached host signal retains nothing from a disposed source.
    pub fn dispose(&mut self) {
        self.disposed.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(subscription) = self.abort_on_fire.take() {
            subscription.cancel();
        }
    }
}

impl Drop for TimeoutSource {
    fn drop(&mut self) {
        self.dispose();
    }
}
