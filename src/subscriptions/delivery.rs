//! Per-subscriber delivery threads.

use super::registry::DeliveryCounters;
use super::types::Lifecycle;
use crate::types::SubscriberId;
use crossbeam_channel::Receiver;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

/// Spawn the thread that drains `receiver` into `callback`.
///
/// The thread exits when the callback returns `false` or panics, when the
/// lifecycle is cancelled, or when every sender is gone and the queue is empty.
/// In all cases the lifecycle ends `Cancelled`.
pub(crate) fn spawn<T, F>(
    name: String,
    id: SubscriberId,
    receiver: Receiver<T>,
    lifecycle: Arc<Lifecycle>,
    counters: Arc<DeliveryCounters>,
    callback: F,
) -> io::Result<()>
where
    T: Send + 'static,
    F: FnMut(T) -> bool + Send + 'static,
{
    thread::Builder::new()
        .name(name)
        .spawn(move || run(id, receiver, &lifecycle, &counters, callback))?;
    Ok(())
}

fn run<T, F>(
    id: SubscriberId,
    receiver: Receiver<T>,
    lifecycle: &Lifecycle,
    counters: &DeliveryCounters,
    mut callback: F,
) where
    F: FnMut(T) -> bool,
{
    for value in receiver.iter() {
        if !lifecycle.is_active() {
            break;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| callback(value))) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("subscriber {} finished", id);
                break;
            }
            Err(payload) => {
                counters.panicked_subscribers.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    "subscriber {} callback panicked: {}",
                    id,
                    panic_message(payload.as_ref())
                );
                break;
            }
        }
    }

    // Receiver is dropped on return, so a writer blocked on this queue wakes up.
    lifecycle.cancel();
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::time::{Duration, Instant};

    fn wait_cancelled(lifecycle: &Lifecycle) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while lifecycle.is_active() {
            assert!(Instant::now() < deadline, "delivery thread did not exit");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_stops_after_false() {
        let (sender, receiver) = bounded(8);
        let (seen_tx, seen_rx) = bounded(8);
        let lifecycle = Arc::new(Lifecycle::new());
        let counters = Arc::new(DeliveryCounters::default());

        spawn(
            "test-delivery".to_string(),
            SubscriberId(1),
            receiver,
            Arc::clone(&lifecycle),
            counters,
            move |v: u32| {
                seen_tx.send(v).unwrap();
                v < 2
            },
        )
        .unwrap();

        for v in 1..=4 {
            let _ = sender.send(v);
        }

        wait_cancelled(&lifecycle);
        let seen: Vec<u32> = seen_rx.try_iter().collect();
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_panic_is_contained() {
        let (sender, receiver) = bounded(1);
        let lifecycle = Arc::new(Lifecycle::new());
        let counters = Arc::new(DeliveryCounters::default());

        spawn(
            "test-panic".to_string(),
            SubscriberId(2),
            receiver,
            Arc::clone(&lifecycle),
            Arc::clone(&counters),
            |_: u32| -> bool { panic!("boom") },
        )
        .unwrap();

        sender.send(1).unwrap();
        wait_cancelled(&lifecycle);

        assert_eq!(counters.panicked_subscribers.load(Ordering::Relaxed), 1);
        assert_eq!(panic_message(&"boom"), "boom");
    }

    #[test]
    fn test_exits_when_senders_dropped() {
        let (sender, receiver) = bounded::<u32>(4);
        let lifecycle = Arc::new(Lifecycle::new());

        spawn(
            "test-close".to_string(),
            SubscriberId(3),
            receiver,
            Arc::clone(&lifecycle),
            Arc::new(DeliveryCounters::default()),
            |_| true,
        )
        .unwrap();

        drop(sender);
        wait_cancelled(&lifecycle);
    }
}
