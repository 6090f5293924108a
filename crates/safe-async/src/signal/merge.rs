//! First-wins signal combination
//!
//! [`merge`] derives one [`CancelSignal`] from a list of sources: the
//! combined signal fires when the first source fires. The returned
//! [`MergedSignal`] owns the listener registrations it made on the sources
//! and cancels them on first firing, on [`detach`](MergedSignal::detach), or
//! on drop, so a combination can never leak listeners onto long-lived
//! sources.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{CancelSignal, Subscription};

/// A combination of source signals that fires with the first of them.
///
/// Holding the value keeps the source subscriptions alive; dropping it
/// detaches them. The combined signal itself can be cloned out and outlives
/// the combination (it just can no longer be fired through it).
#[derive(Debug)]
pub struct MergedSignal {
    signal: CancelSignal,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl MergedSignal {
    /// The combined signal.
    pub fn signal(&self) -> &CancelSignal {
        &self.signal
    }

    /// Cancel all outstanding source subscriptions without firing.
    ///
    /// Idempotent; also invoked by `Drop` and by the combination's own
    /// firing path.
    pub fn detach(&self) {
        for subscription in self.subscriptions.lock().drain(..) {
            subscription.cancel();
        }
    }
}

impl Drop for MergedSignal {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Derive one signal from a list of sources, firing on the first to fire.
///
/// - An empty list yields a signal that never fires through the combination.
/// - If any source has already fired, the combined signal is returned
///   already fired and no subscriptions are registered on the remaining
///   sources.
/// - Duplicate handles to the same underlying signal are de-duplicated, so a
///   source appearing several times still produces exactly one firing.
/// - On the first source firing, the combination cancels its subscriptions
///   on all other sources; no further callbacks, no references retained.
pub fn merge(sources: &[CancelSignal]) -> MergedSignal {
    let subscriptions = Arc::new(Mutex::new(Vec::new()));

    if sources.iter().any(CancelSignal::is_fired) {
        return MergedSignal { signal: CancelSignal::fired(), subscriptions };
    }

    let signal = CancelSignal::new();
    if sources.is_empty() {
        return MergedSignal { signal, subscriptions };
    }

    let mut seen = Vec::with_capacity(sources.len());
    for source in sources {
        if seen.contains(&source.handle_id()) {
            continue;
        }
        seen.push(source.handle_id());

        let downstream = signal.clone();
        let subscription = source.subscribe(move || downstream.fire());
        subscriptions.lock().push(subscription);
    }

    // Teardown on first firing: stop listening to the losers. If a source
    // fired while the loop above was still subscribing, the combined signal
    // is already fired here and the callback runs immediately.
    let outstanding = Arc::clone(&subscriptions);
    signal.subscribe(move || {
        for subscription in outstanding.lock().drain(..) {
            subscription.cancel();
        }
    });

    MergedSignal { signal, subscriptions }
}
