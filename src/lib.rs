//! # proxy-refill-pool
//!
//! A self-replenishing pool of verified, expiring proxies.
//!
//! Proxies are fetched in batches from a listing API, checked for liveness
//! through a known page, and queued. Callers ask for a proxy that stays usable
//! for at least a given number of seconds; an empty or short queue triggers a
//! refill, and only one refill ever runs at a time.

pub mod config;
pub mod error;
pub mod middleware;
pub mod pool;
pub mod probe;
pub mod proxy;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod source;
pub mod store;

pub use config::{ProxyPoolConfig, ProxyPoolConfigBuilder};
pub use error::{ConfigError, FetchError, NoProxyAvailable, ParseError, StartupError, StoreError};
pub use middleware::ProxyPoolMiddleware;
pub use pool::{ProxyPool, RefillReport};
pub use probe::{HttpProbe, LivenessProbe};
pub use proxy::Proxy;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use source::{ApiSource, ProxySource};
pub use store::{MemoryStore, ProxyStore};
