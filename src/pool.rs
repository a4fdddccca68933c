//! Core proxy pool implementation.

use crate::config::ProxyPoolConfig;
use crate::error::{NoProxyAvailable, StartupError, StoreError};
use crate::probe::{HttpProbe, LivenessProbe};
use crate::proxy::Proxy;
use crate::source::{ApiSource, ProxySource};
use crate::store::{MemoryStore, ProxyStore};

use futures::future;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, Notify, OwnedMutexGuard};
use tokio::time::{self, Instant};

/// How many times `get_proxy` starts over after driving a refill.
const MAX_RETRIES: usize = 1;

/// Outcome of one refill cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefillReport {
    /// Candidates returned by the upstream source.
    pub fetched: usize,
    /// Candidates that passed validation and were queued.
    pub admitted: usize,
}

/// A self-replenishing queue of live, unexpired proxies.
pub struct ProxyPool {
    /// Configuration for the pool.
    pub config: ProxyPoolConfig,
    store: Arc<dyn ProxyStore>,
    source: Arc<dyn ProxySource>,
    probe: Arc<dyn LivenessProbe>,
    /// Held for the whole of a refill; at most one refill runs at a time.
    refill_lock: Arc<Mutex<()>>,
    state: Arc<RefillState>,
}

struct RefillState {
    refilling: AtomicBool,
    /// Signaled on every admission and when a refill ends.
    progress: Notify,
}

/// Ownership of the refill lock. Dropping it ends the refill and wakes
/// waiters, also when the refilling future is cancelled part way.
struct RefillGuard {
    lock: Option<OwnedMutexGuard<()>>,
    state: Arc<RefillState>,
}

impl Drop for RefillGuard {
    fn drop(&mut self) {
        self.state.refilling.store(false, Ordering::Release);
        self.lock.take();
        self.state.progress.notify_waiters();
    }
}

impl ProxyPool {
    /// Create a pool from configuration, using the HTTP listing source and
    /// HTTP probe. The store is in-memory unless `store_url` is set.
    pub async fn new(config: ProxyPoolConfig) -> Result<Arc<Self>, StartupError> {
        config.validate()?;
        let store = open_store(&config).await?;
        let source = Arc::new(ApiSource::new(&config.source_url, config.source_timeout)?);
        let probe = Arc::new(HttpProbe::new(&config.probe_url, &config.probe_marker));
        Self::with_components(config, store, source, probe).await
    }

    /// Create a pool from explicit collaborators.
    ///
    /// Fails if the store does not answer or the source self-test fails.
    pub async fn with_components(
        config: ProxyPoolConfig,
        store: Arc<dyn ProxyStore>,
        source: Arc<dyn ProxySource>,
        probe: Arc<dyn LivenessProbe>,
    ) -> Result<Arc<Self>, StartupError> {
        config.validate()?;
        store.ping().await?;
        source.probe().await?;
        info!("Proxy source {} passed self-test", config.source_url);

        let pool = Arc::new(Self {
            config,
            store,
            source,
            probe,
            refill_lock: Arc::new(Mutex::new(())),
            state: Arc::new(RefillState {
                refilling: AtomicBool::new(false),
                progress: Notify::new(),
            }),
        });

        if let Some(interval) = pool.config.maintenance_interval {
            info!("Starting pool maintenance every {:?}", interval);
            tokio::spawn(maintain(Arc::downgrade(&pool), interval));
        }

        Ok(pool)
    }

    /// Take a proxy that stays usable for at least `min_remaining` more seconds.
    ///
    /// Records that are too close to expiry are discarded on the way. An empty
    /// queue drives a refill first, and the whole lookup is repeated once if
    /// that refill did not yield a usable record.
    pub async fn get_proxy(self: &Arc<Self>, min_remaining: i64) -> Result<Proxy, NoProxyAvailable> {
        let min_remaining = min_remaining.max(1);
        let mut retries = 0;

        loop {
            let mut len = self.queue_len().await;
            let mut drove_refill = false;

            if len == 0 {
                drove_refill = true;
                len = self.refill_or_wait().await;
            } else if len < self.config.min_pool_size {
                self.spawn_refill();
            }

            for _ in 0..len {
                let raw = match self.store.pop_head(&self.config.queue_key, self.config.pop_timeout).await {
                    Ok(Some(raw)) => raw,
                    Ok(None) => {
                        debug!("Timed out waiting for a queued proxy");
                        return Err(NoProxyAvailable);
                    }
                    Err(e) => {
                        warn!("Failed to pop from proxy queue: {}", e);
                        return Err(NoProxyAvailable);
                    }
                };

                let proxy = match Proxy::deserialize(&raw) {
                    Ok(proxy) => proxy,
                    Err(e) => {
                        warn!("Dropping queue entry {:?}: {}", raw, e);
                        continue;
                    }
                };

                if proxy.remaining_lifetime() < min_remaining {
                    debug!("Discarding {} with {}s left", proxy.address(), proxy.remaining_lifetime());
                    continue;
                }
                return Ok(proxy);
            }

            if !drove_refill || retries >= MAX_RETRIES {
                return Err(NoProxyAvailable);
            }
            retries += 1;
        }
    }

    /// Put a proxy back at the tail of the queue without validating it again.
    /// Expired records are dropped.
    pub async fn requeue(&self, proxy: &Proxy) {
        if proxy.is_expired() {
            debug!("Not requeueing expired proxy {}", proxy.address());
            return;
        }
        if let Err(e) = proxy.enqueue(self.store.as_ref(), &self.config.queue_key).await {
            warn!("Failed to requeue {}: {}", proxy.address(), e);
        } else {
            self.state.progress.notify_waiters();
        }
    }

    /// Current queue length. Store failures count as an empty queue.
    pub async fn queue_len(&self) -> usize {
        match self.store.len(&self.config.queue_key).await {
            Ok(len) => len,
            Err(e) => {
                warn!("Failed to read proxy queue length: {}", e);
                0
            }
        }
    }

    /// Run a refill now. Returns `None` if another refill is already running.
    pub async fn refill(&self) -> Option<RefillReport> {
        let guard = self.try_begin_refill()?;
        Some(self.run_refill(guard).await)
    }

    /// Become the refiller if possible, otherwise wait on the one in flight.
    /// Returns the queue length afterwards.
    async fn refill_or_wait(&self) -> usize {
        match self.try_begin_refill() {
            Some(guard) => {
                self.run_refill(guard).await;
                self.queue_len().await
            }
            None => self.wait_for_refill().await,
        }
    }

    /// Take the refill lock without waiting and mark a refill as in flight.
    fn try_begin_refill(&self) -> Option<RefillGuard> {
        let lock = self.refill_lock.clone().try_lock_owned().ok()?;
        self.state.refilling.store(true, Ordering::Release);
        Some(RefillGuard {
            lock: Some(lock),
            state: Arc::clone(&self.state),
        })
    }

    /// A refill is running, or has taken the lock and not yet raised the flag.
    fn refill_in_flight(&self) -> bool {
        self.state.refilling.load(Ordering::Acquire) || self.refill_lock.try_lock().is_err()
    }

    /// Start a refill in the background unless one is already running.
    fn spawn_refill(self: &Arc<Self>) {
        if let Some(guard) = self.try_begin_refill() {
            let pool = Arc::clone(self);
            tokio::spawn(async move {
                pool.run_refill(guard).await;
            });
        }
    }

    async fn wait_for_refill(&self) -> usize {
        let deadline = Instant::now() + self.config.refill_wait;
        loop {
            // Registered before checking, so a signal sent in between is kept.
            let notified = self.state.progress.notified();

            let len = self.queue_len().await;
            if len > 0 || !self.refill_in_flight() {
                return len;
            }
            if time::timeout_at(deadline, notified).await.is_err() {
                debug!("Gave up waiting for refill after {:?}", self.config.refill_wait);
                return self.queue_len().await;
            }
        }
    }

    async fn run_refill(&self, guard: RefillGuard) -> RefillReport {
        let report = match self.source.fetch().await {
            Ok(candidates) if candidates.is_empty() => {
                info!("Proxy source returned no candidates");
                RefillReport::default()
            }
            Ok(candidates) => {
                let admitted = AtomicUsize::new(0);
                let fetched = candidates.len();
                let checks = candidates.into_iter().map(|candidate| self.admit(candidate, &admitted));
                future::join_all(checks).await;

                let report = RefillReport {
                    fetched,
                    admitted: admitted.load(Ordering::Relaxed),
                };
                info!("Fetched {} proxies, admitted {}", report.fetched, report.admitted);
                report
            }
            Err(e) => {
                warn!("Refill skipped: {}", e);
                RefillReport::default()
            }
        };

        drop(guard);
        report
    }

    /// Validate one candidate and queue it if it survives.
    async fn admit(&self, candidate: Proxy, admitted: &AtomicUsize) -> bool {
        let remaining = candidate.remaining_lifetime();
        if remaining < self.config.min_admit_lifetime.as_secs() as i64 {
            return false;
        }

        if self.config.dedup {
            let key = marker_key(&self.config.marker_prefix, candidate.address());
            let ttl = std::time::Duration::from_secs(remaining as u64);
            match self.store.set_if_absent(&key, ttl).await {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    debug!("Dedup marker for {} failed: {}", candidate.address(), e);
                    return false;
                }
            }
        }

        if !self.probe.is_live(candidate.address(), self.config.probe_timeout).await {
            return false;
        }

        if let Err(e) = candidate.enqueue(self.store.as_ref(), &self.config.queue_key).await {
            warn!("Failed to queue {}: {}", candidate.address(), e);
            return false;
        }
        admitted.fetch_add(1, Ordering::Relaxed);
        self.state.progress.notify_waiters();
        true
    }
}

/// Dedup marker key for an address: `<prefix><host@port>`.
pub fn marker_key(prefix: &str, address: &str) -> String {
    format!("{}{}", prefix, address.replace(':', "@"))
}

async fn open_store(config: &ProxyPoolConfig) -> Result<Arc<dyn ProxyStore>, StartupError> {
    match config.store_url.as_deref() {
        None => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "redis")]
        Some(url) if url.starts_with("redis") => {
            Ok(Arc::new(crate::redis_store::RedisStore::connect(url).await?))
        }
        Some(url) => Err(StartupError::Store(StoreError::Unavailable(format!(
            "unsupported store url {}",
            url
        )))),
    }
}

/// Keep the queue topped up until the pool is dropped.
async fn maintain(pool: Weak<ProxyPool>, interval: std::time::Duration) {
    loop {
        time::sleep(interval).await;
        let Some(pool) = pool.upgrade() else {
            break;
        };

        let len = pool.queue_len().await;
        if len < pool.config.min_pool_size {
            debug!("Pool has {} proxies, topping up", len);
            pool.refill().await;
        }
    }
}
