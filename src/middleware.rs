//! Middleware implementation for reqwest.

use crate::error::NoProxyAvailable;
use crate::pool::ProxyPool;

use anyhow::anyhow;
use async_trait::async_trait;
use log::{info, warn};
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::sync::Arc;

/// Middleware that sends every request through a proxy taken from the pool.
///
/// A proxy that carried a request successfully goes back to the queue; one
/// that failed is dropped.
#[derive(Clone)]
pub struct ProxyPoolMiddleware {
    /// The proxy pool.
    pool: Arc<ProxyPool>,
    /// Remaining lifetime, in seconds, a proxy needs to be used for a request.
    min_remaining: i64,
}

impl ProxyPoolMiddleware {
    /// Create a middleware drawing from `pool`.
    pub fn new(pool: Arc<ProxyPool>, min_remaining: i64) -> Self {
        Self { pool, min_remaining }
    }
}

#[async_trait]
impl Middleware for ProxyPoolMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        _extensions: &mut http::Extensions,
        _next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let max_retries = self.pool.config.retry_count;
        let mut retry_count = 0;

        loop {
            let proxied_request = req.try_clone().ok_or_else(|| {
                Error::Middleware(anyhow!(
                    "Request object is not cloneable. Are you passing a streaming body?"
                        .to_string()
                ))
            })?;

            let proxy = match self.pool.get_proxy(self.min_remaining).await {
                Ok(proxy) => proxy,
                Err(_) => {
                    warn!("No proxy available. Queued: {}", self.pool.queue_len().await);
                    return Err(Error::Middleware(anyhow!(NoProxyAvailable)));
                }
            };

            info!("Using proxy: {} (attempt {})", proxy.address(), retry_count + 1);

            let client = match proxy
                .to_reqwest_proxy()
                .and_then(|p| {
                    reqwest::Client::builder()
                        .proxy(p)
                        .timeout(self.pool.config.request_timeout)
                        .build()
                })
            {
                Ok(c) => c,
                Err(e) => {
                    warn!("Failed to build client with proxy {}: {}", proxy.address(), e);
                    retry_count += 1;
                    if retry_count > max_retries {
                        return Err(Error::Reqwest(e));
                    }
                    continue;
                }
            };

            match client.execute(proxied_request).await {
                Ok(response) => {
                    self.pool.requeue(&proxy).await;
                    return Ok(response);
                }
                Err(err) => {
                    warn!(
                        "Request failed with proxy {} (attempt {}): {}",
                        proxy.address(),
                        retry_count + 1,
                        err
                    );
                    retry_count += 1;
                    if retry_count > max_retries {
                        return Err(Error::Reqwest(err));
                    }
                }
            }
        }
    }
}
