//! Live subscriptions to values written into a buffer.
//!
//! Every subscriber owns a bounded queue drained by its own delivery thread,
//! which runs the subscriber's callback. Writers only ever touch the queue:
//! - a callback returning `false` ends the subscription
//! - a panicking callback is contained, logged and ends the subscription
//! - a full queue is handled by the buffer's [`OverflowPolicy`](crate::OverflowPolicy)

mod delivery;
mod registry;
mod types;

pub(crate) use delivery::spawn as spawn_delivery;
pub(crate) use registry::{fan_out, DeliveryCounters, Subscriber, SubscriberRegistry};
pub use types::{SubscriberState, SubscriptionHandle};
pub(crate) use types::Lifecycle;
