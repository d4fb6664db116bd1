//! Bounded handoff queue between a hardware audio thread and the
//! cooperative scheduler.
//!
//! The producer side is called from a real-time audio callback and must
//! never block or wait: when the queue is full, the oldest unconsumed item
//! is evicted and a dropped counter incremented. The consumer side awaits
//! items on the tokio scheduler. Single producer, single consumer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
    capacity: usize,
}

/// Producer half. Owned by the hardware callback; dropping it closes the
/// queue.
pub struct HandoffSender<T> {
    shared: Arc<Shared<T>>,
}

/// Consumer half, polled from the scheduler.
pub struct HandoffReceiver<T> {
    shared: Arc<Shared<T>>,
}

/// Create a bounded handoff queue holding at most `capacity` items.
pub fn bounded<T>(capacity: usize) -> (HandoffSender<T>, HandoffReceiver<T>) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        notify: Notify::new(),
        dropped: AtomicU64::new(0),
        closed: AtomicBool::new(false),
        capacity: capacity.max(1),
    });
    (
        HandoffSender {
            shared: Arc::clone(&shared),
        },
        HandoffReceiver { shared },
    )
}

impl<T> HandoffSender<T> {
    /// Push an item without ever waiting. Returns `true` if an older item
    /// was evicted to make room.
    pub fn push(&self, item: T) -> bool {
        let mut evicted = false;
        {
            // The critical section is a couple of pointer moves; a poisoned
            // lock is absorbed rather than surfaced to the audio thread.
            let mut queue = self
                .shared
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if queue.len() >= self.shared.capacity {
                queue.pop_front();
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                evicted = true;
            }
            queue.push_back(item);
        }
        self.shared.notify.notify_one();
        evicted
    }

    /// Number of items evicted so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Drop for HandoffSender<T> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }
}

impl<T> HandoffReceiver<T> {
    /// Take the next item without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Await the next item. Returns `None` once the sender is dropped and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if let Some(item) = self.try_recv() {
                return Some(item);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                // Drain anything pushed between the check and the close.
                return self.try_recv();
            }
            // notify_one leaves a permit if no task is waiting, so an item
            // pushed between try_recv and this await is not missed.
            self.shared.notify.notified().await;
        }
    }

    /// Number of items evicted so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}
