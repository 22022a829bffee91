//! Subscriber lifecycle and handle types.

use crate::types::SubscriberId;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lifecycle of a subscriber.
///
/// A subscriber starts `Active` and moves to `Cancelled` exactly once: when its
/// callback returns `false` or panics, when the overflow policy drops it, when
/// its handle is cancelled, or when the buffer is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriberState {
    Active,
    Cancelled,
}

/// Lifecycle flag shared by the buffer, the delivery thread and the handle.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    active: AtomicBool,
    /// Dropped on cancel, which disconnects `cancelled`.
    cancel_tx: Mutex<Option<Sender<()>>>,
    cancelled: Receiver<()>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (cancel_tx, cancelled) = bounded(0);
        Self {
            active: AtomicBool::new(true),
            cancel_tx: Mutex::new(Some(cancel_tx)),
            cancelled,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Move to `Cancelled`. Returns true only for the call that made the transition.
    pub(crate) fn cancel(&self) -> bool {
        let transitioned = self.active.swap(false, Ordering::AcqRel);
        if transitioned {
            self.cancel_tx.lock().take();
        }
        transitioned
    }

    /// Becomes ready (disconnected) once the subscriber is cancelled.
    pub(crate) fn cancelled(&self) -> &Receiver<()> {
        &self.cancelled
    }

    pub(crate) fn state(&self) -> SubscriberState {
        if self.is_active() {
            SubscriberState::Active
        } else {
            SubscriberState::Cancelled
        }
    }
}

/// Handle to a live subscription.
///
/// Dropping the handle does not cancel the subscription; the callback keeps
/// receiving values until it returns `false` or [`cancel`](Self::cancel) is
/// called. The handle holds no reference to the buffer itself.
#[derive(Clone, Debug)]
pub struct SubscriptionHandle {
    pub id: SubscriberId,
    lifecycle: Arc<Lifecycle>,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: SubscriberId, lifecycle: Arc<Lifecycle>) -> Self {
        Self { id, lifecycle }
    }

    /// Stop delivery to this subscriber.
    ///
    /// Values already queued are discarded, and the buffer forgets the
    /// subscriber on its next write. Returns false if it was already cancelled.
    pub fn cancel(&self) -> bool {
        let cancelled = self.lifecycle.cancel();
        if cancelled {
            tracing::debug!("subscriber {} cancelled by handle", self.id);
        }
        cancelled
    }

    /// Whether values are still being delivered.
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    pub fn state(&self) -> SubscriberState {
        self.lifecycle.state()
    }
}
