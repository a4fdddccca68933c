//! Configuration for the proxy pool.

use crate::error::ConfigError;

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration for the proxy pool.
#[derive(Debug, Clone)]
pub struct ProxyPoolConfig {
    /// Upstream listing URL. A `count` query parameter, if present, is
    /// rewritten to `1` for the startup self-test.
    pub source_url: String,
    /// Timeout for calls to the listing source.
    pub source_timeout: Duration,
    /// Candidates with less remaining lifetime than this are never admitted.
    pub min_admit_lifetime: Duration,
    /// Queue length below which a refill is kicked off.
    pub min_pool_size: usize,
    /// Timeout for a single liveness probe.
    pub probe_timeout: Duration,
    /// URL fetched through a candidate to prove it is live.
    pub probe_url: String,
    /// Substring the probe response body must contain.
    pub probe_marker: String,
    /// Refuse addresses that already hold a live dedup marker.
    pub dedup: bool,
    /// Upper bound for one blocking pop from the ready queue.
    pub pop_timeout: Duration,
    /// How long a caller waits on a refill started by someone else.
    pub refill_wait: Duration,
    /// Key of the ready queue in the store.
    pub queue_key: String,
    /// Prefix for dedup marker keys.
    pub marker_prefix: String,
    /// Interval of the background top-up task. `None` disables it.
    pub maintenance_interval: Option<Duration>,
    /// Store connection URL. `None` keeps the queue in process memory.
    pub store_url: Option<String>,
    /// Number of times the middleware retries a request with a different proxy.
    pub retry_count: usize,
    /// Timeout for one request the middleware sends through a proxy.
    pub request_timeout: Duration,
}

impl ProxyPoolConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ProxyPoolConfigBuilder {
        ProxyPoolConfigBuilder::new()
    }

    /// Load the configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse the configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(content)?;
        let config = file.into_builder().build();
        config.validate()?;
        Ok(config)
    }

    /// Check the values a pool cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_url.trim().is_empty() {
            return Err(ConfigError::Invalid("source_url is empty".into()));
        }
        url::Url::parse(&self.source_url)
            .map_err(|e| ConfigError::Invalid(format!("source_url: {}", e)))?;
        if self.probe_timeout.is_zero() || self.source_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.queue_key.is_empty() {
            return Err(ConfigError::Invalid("queue_key is empty".into()));
        }
        Ok(())
    }
}

/// Builder for `ProxyPoolConfig`.
#[derive(Default)]
pub struct ProxyPoolConfigBuilder {
    source_url: String,
    source_timeout: Option<Duration>,
    min_admit_lifetime: Option<Duration>,
    min_pool_size: Option<usize>,
    probe_timeout: Option<Duration>,
    probe_url: Option<String>,
    probe_marker: Option<String>,
    dedup: Option<bool>,
    pop_timeout: Option<Duration>,
    refill_wait: Option<Duration>,
    queue_key: Option<String>,
    marker_prefix: Option<String>,
    maintenance_interval: Option<Duration>,
    store_url: Option<String>,
    retry_count: Option<usize>,
    request_timeout: Option<Duration>,
}

impl ProxyPoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the upstream listing URL.
    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = url.into();
        self
    }

    /// Set the timeout for listing calls.
    pub fn source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = Some(timeout);
        self
    }

    /// Set the minimum remaining lifetime a candidate needs to be admitted.
    pub fn min_admit_lifetime(mut self, lifetime: Duration) -> Self {
        self.min_admit_lifetime = Some(lifetime);
        self
    }

    /// Set the queue length below which a refill is triggered.
    pub fn min_pool_size(mut self, count: usize) -> Self {
        self.min_pool_size = Some(count);
        self
    }

    /// Set the liveness probe timeout.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Set the URL fetched through each candidate.
    pub fn probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = Some(url.into());
        self
    }

    /// Set the substring the probe response must contain.
    pub fn probe_marker(mut self, marker: impl Into<String>) -> Self {
        self.probe_marker = Some(marker.into());
        self
    }

    /// Enable or disable duplicate suppression.
    pub fn dedup(mut self, enabled: bool) -> Self {
        self.dedup = Some(enabled);
        self
    }

    /// Set the bound for one blocking pop.
    pub fn pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout = Some(timeout);
        self
    }

    /// Set how long to wait on someone else's refill.
    pub fn refill_wait(mut self, wait: Duration) -> Self {
        self.refill_wait = Some(wait);
        self
    }

    /// Set the ready queue key.
    pub fn queue_key(mut self, key: impl Into<String>) -> Self {
        self.queue_key = Some(key.into());
        self
    }

    /// Set the dedup marker key prefix.
    pub fn marker_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.marker_prefix = Some(prefix.into());
        self
    }

    /// Enable the background top-up task.
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = Some(interval);
        self
    }

    /// Set the store connection URL.
    pub fn store_url(mut self, url: impl Into<String>) -> Self {
        self.store_url = Some(url.into());
        self
    }

    /// Set the number of times to retry a request with different proxies.
    pub fn retry_count(mut self, count: usize) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// Set the timeout for requests sent through the middleware.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyPoolConfig {
        ProxyPoolConfig {
            source_url: self.source_url,
            source_timeout: self.source_timeout.unwrap_or(Duration::from_secs(5)),
            min_admit_lifetime: self.min_admit_lifetime.unwrap_or(Duration::from_secs(60)),
            min_pool_size: self.min_pool_size.unwrap_or(3),
            probe_timeout: self.probe_timeout.unwrap_or(Duration::from_secs(5)),
            probe_url: self.probe_url.unwrap_or_else(|| "http://www.soso.com/".to_string()),
            probe_marker: self.probe_marker.unwrap_or_else(|| "soso".to_string()),
            dedup: self.dedup.unwrap_or(true),
            pop_timeout: self.pop_timeout.unwrap_or(Duration::from_secs(10)),
            refill_wait: self.refill_wait.unwrap_or(Duration::from_secs(10)),
            queue_key: self.queue_key.unwrap_or_else(|| "okproxy".to_string()),
            marker_prefix: self.marker_prefix.unwrap_or_else(|| "proxy:".to_string()),
            maintenance_interval: self.maintenance_interval,
            store_url: self.store_url,
            retry_count: self.retry_count.unwrap_or(3),
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(30)),
        }
    }
}

/// On-disk form of the configuration. Durations are whole seconds except
/// where the key says otherwise.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    source_url: String,
    source_timeout_secs: Option<u64>,
    min_admit_lifetime_secs: Option<u64>,
    min_pool_size: Option<usize>,
    probe_timeout_ms: Option<u64>,
    probe_url: Option<String>,
    probe_marker: Option<String>,
    dedup: Option<bool>,
    pop_timeout_secs: Option<u64>,
    refill_wait_secs: Option<u64>,
    queue_key: Option<String>,
    marker_prefix: Option<String>,
    maintenance_interval_secs: Option<u64>,
    store_url: Option<String>,
    retry_count: Option<usize>,
    request_timeout_secs: Option<u64>,
}

impl FileConfig {
    fn into_builder(self) -> ProxyPoolConfigBuilder {
        ProxyPoolConfigBuilder {
            source_url: self.source_url,
            source_timeout: self.source_timeout_secs.map(Duration::from_secs),
            min_admit_lifetime: self.min_admit_lifetime_secs.map(Duration::from_secs),
            min_pool_size: self.min_pool_size,
            probe_timeout: self.probe_timeout_ms.map(Duration::from_millis),
            probe_url: self.probe_url,
            probe_marker: self.probe_marker,
            dedup: self.dedup,
            pop_timeout: self.pop_timeout_secs.map(Duration::from_secs),
            refill_wait: self.refill_wait_secs.map(Duration::from_secs),
            queue_key: self.queue_key,
            marker_prefix: self.marker_prefix,
            maintenance_interval: self.maintenance_interval_secs.map(Duration::from_secs),
            store_url: self.store_url,
            retry_count: self.retry_count,
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }
}
