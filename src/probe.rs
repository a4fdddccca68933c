//! Liveness checks for candidate proxies.

use async_trait::async_trait;
use log::debug;
use std::time::Duration;

/// Judges whether a proxy currently works.
///
/// A probe never fails: transport errors, timeouts and bad responses all
/// collapse to `false`.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_live(&self, address: &str, timeout: Duration) -> bool;
}

/// Fetches a known page through the candidate and looks for a marker in the body.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    target_url: String,
    marker: String,
}

impl HttpProbe {
    pub fn new(target_url: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            marker: marker.into(),
        }
    }
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    async fn is_live(&self, address: &str, timeout: Duration) -> bool {
        let proxy = match reqwest::Proxy::all(format!("http://{}", address)) {
            Ok(proxy) => proxy,
            Err(e) => {
                debug!("Invalid proxy address {}: {}", address, e);
                return false;
            }
        };

        // Create a client using this proxy
        let client = match reqwest::Client::builder()
            .timeout(timeout)
            .proxy(proxy)
            .build()
        {
            Ok(client) => client,
            Err(_) => return false,
        };

        let body = match client.get(&self.target_url).send().await {
            Ok(resp) => resp.text().await,
            Err(e) => {
                debug!("Probe through {} failed: {}", address, e);
                return false;
            }
        };

        match body {
            Ok(body) => body.contains(&self.marker),
            Err(_) => false,
        }
    }
}
