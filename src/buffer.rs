//! The replay buffer: bounded history plus live fan-out.

use crate::error::{BufferError, Result};
use crate::history::HistoryRing;
use crate::subscriptions::{
    fan_out, spawn_delivery, DeliveryCounters, Lifecycle, Subscriber, SubscriberRegistry,
    SubscriptionHandle,
};
use crate::types::{BufferStats, OverflowPolicy, SubscriberId};
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Configuration for a buffer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Max retained values.
    /// Default: 1024
    pub capacity: usize,

    /// Max values queued per subscriber before the overflow policy applies.
    /// Default: 64
    pub queue_depth: usize,

    /// What writers do when a subscriber's queue is full.
    pub overflow: OverflowPolicy,

    /// Prefix for delivery thread names.
    pub thread_name: String,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            queue_depth: 64,
            overflow: OverflowPolicy::Block,
            thread_name: "backlog-sub".to_string(),
        }
    }
}

impl BufferConfig {
    pub fn with_capacity(capacity: usize, queue_depth: usize) -> Self {
        Self {
            capacity,
            queue_depth,
            ..Default::default()
        }
    }

    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(BufferError::InvalidConfiguration(
                "capacity must be at least 1".to_string(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(BufferError::InvalidConfiguration(
                "queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Upper bound on the weight of a single value.
struct ValueLimit<T> {
    max_bytes: usize,
    weigher: Box<dyn Fn(&T) -> usize + Send + Sync>,
}

/// Storage and subscriber set, guarded together.
struct BufferState<T> {
    history: HistoryRing<T>,
    subscribers: SubscriberRegistry<T>,
}

/// A bounded history of recent values that also fans every new value out to
/// live subscribers.
///
/// Storage and the subscriber set live behind one lock, so `write`, `read`,
/// `subscribe` and `snapshot_and_subscribe` are linearizable. Writers are
/// additionally serialised among themselves while handing values to
/// subscriber queues, so each subscriber sees values in write order.
///
/// Under [`OverflowPolicy::Block`] a callback must not write to the buffer it
/// is subscribed to: a writer waiting on that callback's full queue would
/// never be released.
pub struct RingBuffer<T> {
    config: BufferConfig,

    /// History and subscribers.
    state: Mutex<BufferState<T>>,

    /// Serialises writers across the enqueue phase.
    publish_lock: Mutex<()>,

    /// Counter for generating subscriber IDs.
    next_id: AtomicU64,

    counters: Arc<DeliveryCounters>,

    value_limit: Option<ValueLimit<T>>,
}

impl<T> RingBuffer<T>
where
    T: Clone + Send + 'static,
{
    /// Create a buffer from a full configuration.
    pub fn new(config: BufferConfig) -> Result<Self> {
        config.validate()?;
        let history = HistoryRing::new(config.capacity)?;

        Ok(Self {
            config,
            state: Mutex::new(BufferState {
                history,
                subscribers: SubscriberRegistry::new(),
            }),
            publish_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            counters: Arc::new(DeliveryCounters::default()),
            value_limit: None,
        })
    }

    /// Create a buffer with the default overflow policy.
    pub fn with_capacity(capacity: usize, queue_depth: usize) -> Result<Self> {
        Self::new(BufferConfig::with_capacity(capacity, queue_depth))
    }

    /// Reject values whose `weigher` result exceeds `max_bytes`.
    pub fn with_value_limit<W>(mut self, max_bytes: usize, weigher: W) -> Result<Self>
    where
        W: Fn(&T) -> usize + Send + Sync + 'static,
    {
        if max_bytes == 0 {
            return Err(BufferError::InvalidConfiguration(
                "value limit must be at least 1 byte".to_string(),
            ));
        }
        self.value_limit = Some(ValueLimit {
            max_bytes,
            weigher: Box::new(weigher),
        });
        Ok(self)
    }

    // --- Writes ---

    /// Append a value, evicting the oldest if full, and deliver it to every
    /// live subscriber.
    pub fn write(&self, value: T) -> Result<()> {
        self.check_value(&value)?;

        let _publish = self.publish_lock.lock();
        let recipients = {
            let mut state = self.state.lock();
            let recipients = state.subscribers.recipients();
            state.history.push(value.clone());
            recipients
        };

        let mut to_remove = Vec::new();
        fan_out(
            &recipients,
            &value,
            self.config.overflow,
            &self.counters,
            &mut to_remove,
        );
        self.remove_subscribers(to_remove);
        Ok(())
    }

    /// Write values in order, exactly as repeated [`write`](Self::write) calls would.
    ///
    /// Every value is checked against the value limit before any is stored, so
    /// a rejected slice leaves the buffer untouched. The whole slice enters
    /// history in one step, and each subscriber receives one delivery per value.
    pub fn write_slice(&self, values: &[T]) -> Result<()> {
        for value in values {
            self.check_value(value)?;
        }
        if values.is_empty() {
            return Ok(());
        }

        let _publish = self.publish_lock.lock();
        let recipients = {
            let mut state = self.state.lock();
            let recipients = state.subscribers.recipients();
            for value in values {
                state.history.push(value.clone());
            }
            recipients
        };

        let mut to_remove = Vec::new();
        for value in values {
            fan_out(
                &recipients,
                value,
                self.config.overflow,
                &self.counters,
                &mut to_remove,
            );
        }
        self.remove_subscribers(to_remove);
        Ok(())
    }

    // --- Reads ---

    /// Copy of the retained values, oldest-first.
    pub fn read(&self) -> Vec<T> {
        self.state.lock().history.snapshot()
    }

    // --- Subscriptions ---

    /// Deliver every value written after this call returns to `callback`.
    ///
    /// No retained history is delivered. Delivery stops once `callback`
    /// returns `false`.
    pub fn subscribe<F>(&self, callback: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(T) -> bool + Send + 'static,
    {
        let (subscriber, handle) = self.start_subscriber(callback)?;
        self.state.lock().subscribers.insert(subscriber);

        tracing::debug!("subscriber {} registered", handle.id);
        Ok(handle)
    }

    /// Snapshot the retained history and subscribe in one step.
    ///
    /// Every value in the returned snapshot was written before the
    /// subscription started, and every value written afterwards reaches
    /// `callback`: nothing is duplicated or lost across the boundary, even
    /// with concurrent writers.
    pub fn snapshot_and_subscribe<F>(&self, callback: F) -> Result<(Vec<T>, SubscriptionHandle)>
    where
        F: FnMut(T) -> bool + Send + 'static,
    {
        let (subscriber, handle) = self.start_subscriber(callback)?;
        let snapshot = {
            let mut state = self.state.lock();
            let snapshot = state.history.snapshot();
            state.subscribers.insert(subscriber);
            snapshot
        };

        tracing::debug!(
            "subscriber {} registered after snapshot of {} values",
            handle.id,
            snapshot.len()
        );
        Ok((snapshot, handle))
    }

    // --- Introspection ---

    pub fn len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn queue_depth(&self) -> usize {
        self.config.queue_depth
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.config.overflow
    }

    /// Number of subscribers still receiving values.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.active_count()
    }

    pub fn stats(&self) -> BufferStats {
        let state = self.state.lock();
        BufferStats {
            capacity: state.history.capacity(),
            len: state.history.len(),
            total_written: state.history.total_written(),
            evicted: state.history.evicted(),
            active_subscribers: state.subscribers.active_count(),
            dropped_values: self.counters.dropped_values.load(Ordering::Relaxed),
            dropped_subscribers: self.counters.dropped_subscribers.load(Ordering::Relaxed),
            panicked_subscribers: self.counters.panicked_subscribers.load(Ordering::Relaxed),
        }
    }

    // --- Internals ---

    fn check_value(&self, value: &T) -> Result<()> {
        if let Some(ref limit) = self.value_limit {
            let weight = (limit.weigher)(value);
            if weight > limit.max_bytes {
                return Err(BufferError::ResourceExhausted(format!(
                    "value of {} bytes exceeds limit of {} bytes",
                    weight, limit.max_bytes
                )));
            }
        }
        Ok(())
    }

    /// Create a subscriber's queue and delivery thread without registering it.
    fn start_subscriber<F>(&self, callback: F) -> Result<(Subscriber<T>, SubscriptionHandle)>
    where
        F: FnMut(T) -> bool + Send + 'static,
    {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(self.config.queue_depth);
        let lifecycle = Arc::new(Lifecycle::new());

        spawn_delivery(
            format!("{}-{}", self.config.thread_name, id),
            id,
            receiver,
            Arc::clone(&lifecycle),
            Arc::clone(&self.counters),
            callback,
        )
        .map_err(|e| {
            BufferError::ResourceExhausted(format!(
                "delivery thread for subscriber {}: {}",
                id, e
            ))
        })?;

        let handle = SubscriptionHandle::new(id, Arc::clone(&lifecycle));
        Ok((Subscriber::new(id, sender, lifecycle), handle))
    }

    fn remove_subscribers(&self, to_remove: Vec<SubscriberId>) {
        if to_remove.is_empty() {
            return;
        }

        let mut state = self.state.lock();
        for id in to_remove {
            if state.subscribers.remove(id).is_some() {
                tracing::debug!("subscriber {} removed", id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::Receiver;
    use std::time::Duration;

    fn forward<T: Send + 'static>() -> (impl FnMut(T) -> bool + Send + 'static, Receiver<T>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (move |v| tx.send(v).is_ok(), rx)
    }

    #[test]
    fn test_config_validation() {
        let result = RingBuffer::<u32>::with_capacity(0, 1);
        assert!(matches!(result, Err(BufferError::InvalidConfiguration(_))));

        let result = RingBuffer::<u32>::with_capacity(1, 0);
        assert!(matches!(result, Err(BufferError::InvalidConfiguration(_))));

        let buffer = RingBuffer::<u32>::new(BufferConfig::default()).unwrap();
        assert_eq!(buffer.capacity(), 1024);
        assert_eq!(buffer.queue_depth(), 64);
        assert_eq!(buffer.overflow_policy(), OverflowPolicy::Block);
    }

    #[test]
    fn test_config_from_json() {
        let config: BufferConfig =
            serde_json::from_str(r#"{"capacity": 16, "overflow": "drop_value"}"#).unwrap();

        assert_eq!(config.capacity, 16);
        assert_eq!(config.queue_depth, 64);
        assert_eq!(config.overflow, OverflowPolicy::DropValue);
    }

    #[test]
    fn test_read_is_idempotent() {
        let buffer = RingBuffer::with_capacity(4, 1).unwrap();
        buffer.write_slice(&[1, 2, 3, 4, 5]).unwrap();

        assert_eq!(buffer.read(), buffer.read());
        assert_eq!(buffer.read(), vec![2, 3, 4, 5]);
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_subscribe_is_forward_only() {
        let buffer = RingBuffer::with_capacity(3, 4).unwrap();
        buffer.write(1).unwrap();

        let (callback, rx) = forward();
        buffer.subscribe(callback).unwrap();
        buffer.write(2).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_value_limit_rejects_without_side_effects() {
        let buffer = RingBuffer::with_capacity(3, 1)
            .unwrap()
            .with_value_limit(4, |v: &String| v.len())
            .unwrap();

        buffer.write("abc".to_string()).unwrap();
        let result = buffer.write("abcdef".to_string());
        assert!(matches!(result, Err(BufferError::ResourceExhausted(_))));

        let result = buffer.write_slice(&["ok".to_string(), "too long".to_string()]);
        assert!(matches!(result, Err(BufferError::ResourceExhausted(_))));

        assert_eq!(buffer.read(), vec!["abc".to_string()]);
        assert_eq!(buffer.stats().total_written, 1);
    }

    #[test]
    fn test_zero_value_limit_rejected() {
        let result = RingBuffer::<String>::with_capacity(3, 1)
            .unwrap()
            .with_value_limit(0, |v| v.len());
        assert!(matches!(result, Err(BufferError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_stats_track_history() {
        let buffer = RingBuffer::with_capacity(2, 1).unwrap();
        buffer.write_slice(&["a", "b", "c"]).unwrap();

        let stats = buffer.stats();
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.len, 2);
        assert_eq!(stats.total_written, 3);
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.active_subscribers, 0);
    }
}
