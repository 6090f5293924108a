//! One-shot cancellation signals
//!
//! This module provides the cancellation primitive the rest of the crate is
//! built on:
//! - **[`CancelSignal`]**: a one-way, one-shot flag with subscribe/fire
//!   semantics and an async wait
//! - **[`timeout`]**: timeout sources that fire a signal when a deadline
//!   elapses
//! - **[`merge`](mod@self::merge)**: first-wins combination of several signals
//!
//! A signal transitions from Live to Fired exactly once. Subscribers are
//! notified exactly once at that transition; subscribers registered after the
//! transition are invoked immediately so they cannot miss the firing.

pub mod merge;
pub mod timeout;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

pub use merge::{merge, MergedSignal};
pub use timeout::TimeoutSource;

/// The failure an operation reports when it observes a fired signal and
/// stops cooperatively.
///
/// Returning this (rather than an arbitrary error) is what lets the
/// classifier and the executor tell "the operation was interrupted" apart
/// from "the operation failed on its own".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation interrupted by a cancellation signal")]
pub struct Interrupted;

type Callback = Box<dyn FnOnce() + Send>;

/// Subscriber table guarded by the signal's mutex.
struct Table {
    fired: bool,
    next_id: u64,
    entries: Vec<(u64, Callback)>,
}

struct Inner {
    table: Mutex<Table>,
    notify: Notify,
}

/// A one-shot, one-way cancellation signal.
///
/// Cloning produces another handle to the same underlying state. Firing is
/// idempotent and monotonic: once fired, a signal never goes back to live.
///
/// Subscriber callbacks always run *after* the internal lock is released, so
/// a callback may fire the signal again (a no-op), subscribe, or cancel
/// subscriptions without deadlocking.
#[derive(Clone)]
pub struct CancelSignal {
    inner: Arc<Inner>,
}

impl CancelSignal {
    /// Create a live signal.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(Table { fired: false, next_id: 0, entries: Vec::new() }),
                notify: Notify::new(),
            }),
        }
    }

    /// Create a signal that is already fired.
    pub fn fired() -> Self {
        let signal = Self::new();
        signal.fire();
        signal
    }

    /// Whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        self.inner.table.lock().fired
    }

    /// `Err(Interrupted)` once the signal has fired.
    ///
    /// Cooperative operations call this at their own checkpoints and bail
    /// out with `?`.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_fired() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    /// Transition Live→Fired and notify all current subscribers.
    ///
    /// Firing an already-fired signal is a no-op. The subscriber set is
    /// drained before any callback runs, so reentrant `fire` calls from
    /// inside a callback cannot double-notify.
    pub fn fire(&self) {
        let drained = {
            let mut table = self.inner.table.lock();
            if table.fired {
                return;
            }
            table.fired = true;
            std::mem::take(&mut table.entries)
        };
        for (_, callback) in drained {
            callback();
        }
        self.inner.notify.notify_waiters();
    }

    /// Register a callback invoked once when the signal fires.
    ///
    /// If the signal has already fired, the callback is invoked immediately
    /// from this call; late subscribers cannot miss the firing. The returned
    /// [`Subscription`] can remove the registration; dropping it leaves the
    /// listener attached.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnOnce() + Send + 'static,
    {
        let mut table = self.inner.table.lock();
        if table.fired {
            drop(table);
            callback();
            return Subscription { target: Weak::new(), id: 0 };
        }
        let id = table.next_id;
        table.next_id += 1;
        table.entries.push((id, Box::new(callback)));
        drop(table);
        Subscription { target: Arc::downgrade(&self.inner), id }
    }

    /// Resolve when the signal fires; resolves immediately if already fired.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register interest before checking the flag so a firing in between
        // is not lost.
        notified.as_mut().enable();
        if self.is_fired() {
            return;
        }
        notified.await;
    }

    /// Identity of the underlying signal state, for de-duplicating handles.
    pub(crate) fn handle_id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSignal").field("fired", &self.is_fired()).finish()
    }
}

/// Handle for a listener registration on a [`CancelSignal`].
///
/// Cancelling removes the listener if the signal has not fired yet. The
/// handle holds no strong reference to the signal.
#[derive(Debug)]
pub struct Subscription {
    target: Weak<Inner>,
    id: u64,
}

impl Subscription {
    /// Remove the listener registration; a no-op if the signal has already
    /// fired, been dropped, or the registration was already removed.
    pub fn cancel(self) {
        if let Some(inner) = self.target.upgrade() {
            inner.table.lock().entries.retain(|(id, _)| *id != self.id);
        }
    }
}
