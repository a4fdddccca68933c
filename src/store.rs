//! Ready queue and dedup marker storage.

use crate::error::StoreError;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Backing store for the ready queue and the dedup markers.
///
/// Implementations must be safe for concurrent producers and consumers:
/// every popped element is handed to exactly one caller.
#[async_trait]
pub trait ProxyStore: Send + Sync {
    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Number of entries in the queue at `key`.
    async fn len(&self, key: &str) -> Result<usize, StoreError>;

    /// Append `value` at the tail of the queue at `key`.
    async fn push_tail(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Remove the head of the queue at `key`, waiting up to `timeout` for one.
    /// `Ok(None)` means the wait timed out.
    async fn pop_head(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError>;

    /// Create `key` with the given time-to-live unless it already exists.
    /// Returns `true` when this call created it.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;
}

#[derive(Default)]
struct Queue {
    items: VecDeque<String>,
    ready: std::sync::Arc<Notify>,
}

/// Store that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    queues: Mutex<HashMap<String, Queue>>,
    markers: Mutex<HashMap<String, Instant>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_pop(&self, key: &str) -> (Option<String>, std::sync::Arc<Notify>) {
        let mut queues = self.queues.lock();
        let queue = queues.entry(key.to_string()).or_default();
        (queue.items.pop_front(), queue.ready.clone())
    }
}

#[async_trait]
impl ProxyStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn len(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.queues.lock().get(key).map_or(0, |q| q.items.len()))
    }

    async fn push_tail(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut queues = self.queues.lock();
        let queue = queues.entry(key.to_string()).or_default();
        queue.items.push_back(value);
        queue.ready.notify_one();
        Ok(())
    }

    async fn pop_head(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            let (item, ready) = self.try_pop(key);
            if item.is_some() {
                return Ok(item);
            }
            // A push between try_pop and here leaves a permit, so nothing is missed.
            if tokio::time::timeout_at(deadline, ready.notified()).await.is_err() {
                return Ok(self.try_pop(key).0);
            }
        }
    }

    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut markers = self.markers.lock();
        markers.retain(|_, expires| *expires > now);
        if markers.contains_key(key) {
            return Ok(false);
        }
        markers.insert(key.to_string(), now + ttl);
        Ok(true)
    }
}
