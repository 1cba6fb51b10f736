//! Bounded queue that evicts its oldest entry when full.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;

/// Fixed-capacity FIFO with drop-oldest admission.
///
/// A push never blocks and never fails: when the queue is full the oldest
/// entry is evicted and handed back to the caller so the loss can be
/// reported. Eviction and insertion happen under one lock.
pub struct DropOldestQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
}

impl<T> DropOldestQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
        }
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Append `item`, returning the entry evicted to make room, if any.
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut items = self.items.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(item);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    /// Take the oldest entry without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Wait for the next entry.
    ///
    /// Cancel safe: dropping the future never loses an entry.
    pub async fn pop(&self) -> T {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    /// Wait up to `wait` for the next entry.
    pub async fn pop_timeout(&self, wait: Duration) -> Option<T> {
        tokio::time::timeout(wait, self.pop()).await.ok()
    }

    /// Remove and return every queued entry, oldest first.
    #[cfg(test)]
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }
}
