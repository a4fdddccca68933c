//! Fakes shared by the integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use proxy_refill_pool::{FetchError, LivenessProbe, Proxy, ProxySource};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// A proxy expiring `secs` seconds from now.
pub fn proxy_in(address: &str, secs: i64) -> Proxy {
    Proxy::new(address, now() + secs)
}

/// Listing source that answers every fetch with the same batch, lifetimes
/// measured from the moment of the fetch.
pub struct ScriptedSource {
    batch: Mutex<Vec<(String, i64)>>,
    fail_fetch: bool,
    fail_probe: bool,
    delay: Duration,
    pub fetches: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(batch: &[(&str, i64)]) -> Self {
        Self {
            batch: Mutex::new(batch.iter().map(|(a, s)| (a.to_string(), *s)).collect()),
            fail_fetch: false,
            fail_probe: false,
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(&[])
    }

    pub fn failing() -> Self {
        Self {
            fail_fetch: true,
            ..Self::empty()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_probe: true,
            ..Self::empty()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxySource for ScriptedSource {
    async fn fetch(&self) -> Result<Vec<Proxy>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_fetch {
            return Err(FetchError::Rejected {
                body: "upstream timed out".into(),
            });
        }
        let batch = self.batch.lock().clone();
        Ok(batch.iter().map(|(a, s)| proxy_in(a, *s)).collect())
    }

    async fn probe(&self) -> Result<(), FetchError> {
        if self.fail_probe {
            return Err(FetchError::Rejected {
                body: r#"{"success":false}"#.into(),
            });
        }
        Ok(())
    }
}

/// Probe that declares every address live except the listed ones.
#[derive(Default)]
pub struct ScriptedProbe {
    dead: HashSet<String>,
    all_dead: bool,
    pub calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn live() -> Self {
        Self::default()
    }

    pub fn dead() -> Self {
        Self {
            all_dead: true,
            ..Self::default()
        }
    }

    pub fn dead_for(addresses: &[&str]) -> Self {
        Self {
            dead: addresses.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProbe for ScriptedProbe {
    async fn is_live(&self, address: &str, _timeout: Duration) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        !self.all_dead && !self.dead.contains(address)
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
