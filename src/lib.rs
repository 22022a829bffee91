//! # Backlog
//!
//! A bounded replay buffer: it keeps the most recent values written to it and
//! fans every new value out to live subscribers.
//!
//! ## Core Concepts
//!
//! - **History**: a fixed-capacity window over the latest writes, oldest-first
//! - **Snapshots**: detached copies of the history, never live views
//! - **Subscribers**: callbacks fed from bounded queues on their own threads
//! - **Gapless catch-up**: `snapshot_and_subscribe` hands back history and
//!   subscribes in one step, so no value is missed or seen twice
//!
//! ## Example
//!
//! ```
//! use backlog::RingBuffer;
//!
//! let buffer = RingBuffer::with_capacity(3, 16)?;
//! buffer.write_slice(&["a", "b", "c", "d"])?;
//!
//! let (history, handle) = buffer.snapshot_and_subscribe(|value| {
//!     println!("live: {}", value);
//!     true
//! })?;
//! assert_eq!(history, vec!["b", "c", "d"]);
//!
//! buffer.write("e")?;
//! handle.cancel();
//! # Ok::<(), backlog::BufferError>(())
//! ```

pub mod buffer;
pub mod error;
pub mod history;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use buffer::{BufferConfig, RingBuffer};
pub use error::{BufferError, Result};
pub use history::HistoryRing;
pub use subscriptions::{SubscriberState, SubscriptionHandle};
pub use types::*;
