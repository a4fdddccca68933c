//! Upstream proxy listing source.

use crate::error::FetchError;
use crate::proxy::Proxy;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const EXPIRE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Supplies batches of candidate proxies.
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Fetch one batch of candidates.
    async fn fetch(&self) -> Result<Vec<Proxy>, FetchError>;

    /// Ask for a single record to confirm the source is reachable and answers
    /// in the expected shape.
    async fn probe(&self) -> Result<(), FetchError>;
}

/// JSON listing API answering `{success, data: [{ip, port, expire_time}]}`.
#[derive(Debug, Clone)]
pub struct ApiSource {
    url: String,
    client: Client,
}

impl ApiSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    async fn get(&self, url: &str) -> Result<Vec<Proxy>, FetchError> {
        let body = self.client.get(url).send().await?.text().await?;
        parse_listing(&body)
    }
}

#[async_trait]
impl ProxySource for ApiSource {
    async fn fetch(&self) -> Result<Vec<Proxy>, FetchError> {
        self.get(&self.url).await
    }

    async fn probe(&self) -> Result<(), FetchError> {
        let url = single_record_url(&self.url)?;
        self.get(&url).await.map(|_| ())
    }
}

/// Rewrite a `count` query parameter to `1`, leaving everything else intact.
pub fn single_record_url(source: &str) -> Result<String, FetchError> {
    let mut url = url::Url::parse(source)?;
    let has_count = url.query_pairs().any(|(k, _)| k == "count");
    if has_count {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == "count" { "1".into() } else { v.into_owned() };
                (k.into_owned(), v)
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    Ok(url.into())
}

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    ip: String,
    port: Port,
    expire_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Port {
    Number(u16),
    Text(String),
}

impl ListingEntry {
    fn into_proxy(self) -> Option<Proxy> {
        let port = match self.port {
            Port::Number(port) => port,
            Port::Text(text) => text.trim().parse().ok()?,
        };
        let naive = NaiveDateTime::parse_from_str(self.expire_time.trim(), EXPIRE_TIME_FORMAT).ok()?;
        let expire_at = naive.and_local_timezone(Local).earliest()?.timestamp();
        Some(Proxy::new(format!("{}:{}", self.ip.trim(), port), expire_at))
    }
}

/// Parse a listing response body into candidates.
///
/// A body without `success: true` is a [`FetchError::Rejected`]. Entries that
/// do not parse are skipped; the rest of the batch is kept.
pub fn parse_listing(body: &str) -> Result<Vec<Proxy>, FetchError> {
    let listing: Listing = serde_json::from_str(body)?;
    if !listing.success {
        return Err(FetchError::Rejected { body: body.to_string() });
    }

    Ok(listing
        .data
        .into_iter()
        .filter_map(|value| {
            let parsed = serde_json::from_value::<ListingEntry>(value.clone())
                .ok()
                .and_then(ListingEntry::into_proxy);
            if parsed.is_none() {
                debug!("Skipping unparseable listing entry: {}", value);
            }
            parsed
        })
        .collect())
}
