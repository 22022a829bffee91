//! Registry of live subscribers and per-value fan-out.

use super::types::Lifecycle;
use crate::types::{OverflowPolicy, SubscriberId};
use crossbeam_channel::{Sender, TrySendError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters updated by writers and delivery threads.
#[derive(Debug, Default)]
pub(crate) struct DeliveryCounters {
    pub(crate) dropped_values: AtomicU64,
    pub(crate) dropped_subscribers: AtomicU64,
    pub(crate) panicked_subscribers: AtomicU64,
}

/// Result of handing one value to one subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Offer {
    /// Value is in the subscriber's queue.
    Queued,
    /// Queue was full and the value was skipped for this subscriber.
    Skipped,
    /// Queue was full and the subscriber was cancelled.
    Overflowed,
    /// Subscriber is no longer receiving.
    Closed,
}

/// Internal subscriber state.
pub(crate) struct Subscriber<T> {
    pub(crate) id: SubscriberId,
    sender: Sender<T>,
    lifecycle: Arc<Lifecycle>,
}

impl<T> Subscriber<T> {
    pub(crate) fn new(id: SubscriberId, sender: Sender<T>, lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            id,
            sender,
            lifecycle,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    /// Hand a value to this subscriber's queue under `policy`.
    pub(crate) fn offer(&self, value: T, policy: OverflowPolicy) -> Offer {
        if !self.is_active() {
            return Offer::Closed;
        }

        match policy {
            // A cancel releases a writer waiting on a full queue.
            OverflowPolicy::Block => crossbeam_channel::select! {
                send(self.sender, value) -> res => match res {
                    Ok(()) => Offer::Queued,
                    Err(_) => Offer::Closed,
                },
                recv(self.lifecycle.cancelled()) -> _ => Offer::Closed,
            },
            OverflowPolicy::DropValue => match self.sender.try_send(value) {
                Ok(()) => Offer::Queued,
                Err(TrySendError::Full(_)) => Offer::Skipped,
                Err(TrySendError::Disconnected(_)) => Offer::Closed,
            },
            OverflowPolicy::DropSubscriber => match self.sender.try_send(value) {
                Ok(()) => Offer::Queued,
                Err(TrySendError::Full(_)) => {
                    if self.lifecycle.cancel() {
                        Offer::Overflowed
                    } else {
                        Offer::Closed
                    }
                }
                Err(TrySendError::Disconnected(_)) => Offer::Closed,
            },
        }
    }
}

/// Live subscribers by ID.
pub(crate) struct SubscriberRegistry<T> {
    subscribers: HashMap<SubscriberId, Arc<Subscriber<T>>>,
}

impl<T> SubscriberRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, subscriber: Subscriber<T>) {
        self.subscribers.insert(subscriber.id, Arc::new(subscriber));
    }

    pub(crate) fn remove(&mut self, id: SubscriberId) -> Option<Arc<Subscriber<T>>> {
        self.subscribers.remove(&id)
    }

    /// Forget cancelled subscribers and return the ones still active.
    pub(crate) fn recipients(&mut self) -> Vec<Arc<Subscriber<T>>> {
        self.subscribers.retain(|id, sub| {
            let keep = sub.is_active();
            if !keep {
                tracing::debug!("subscriber {} removed", id);
            }
            keep
        });
        self.subscribers.values().cloned().collect()
    }

    /// Number of active subscribers.
    pub(crate) fn active_count(&self) -> usize {
        self.subscribers.values().filter(|s| s.is_active()).count()
    }
}

/// Offer `value` to every recipient, recording subscribers that should be removed.
pub(crate) fn fan_out<T: Clone>(
    recipients: &[Arc<Subscriber<T>>],
    value: &T,
    policy: OverflowPolicy,
    counters: &DeliveryCounters,
    to_remove: &mut Vec<SubscriberId>,
) {
    for sub in recipients {
        match sub.offer(value.clone(), policy) {
            Offer::Queued => {}
            Offer::Skipped => {
                counters.dropped_values.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("subscriber {} queue full, value skipped", sub.id);
            }
            Offer::Overflowed => {
                counters.dropped_subscribers.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("subscriber {} queue full, subscriber dropped", sub.id);
                to_remove.push(sub.id);
            }
            Offer::Closed => to_remove.push(sub.id),
        }
    }
}
