//! Proxy record and its queue representation.

use crate::error::{ParseError, StoreError};
use crate::store::ProxyStore;

use serde::{Deserialize, Serialize};

/// One proxy endpoint together with the instant it stops working.
///
/// Records are values: they are never changed once built, only replaced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Proxy {
    /// Endpoint as `host:port`.
    #[serde(rename = "Proxy")]
    address: String,
    /// Expiry as unix seconds.
    #[serde(rename = "expireTime")]
    expire_at: i64,
}

impl Proxy {
    /// Create a record for `address` expiring at `expire_at` (unix seconds).
    pub fn new(address: impl Into<String>, expire_at: i64) -> Self {
        Self {
            address: address.into(),
            expire_at,
        }
    }

    /// The `host:port` endpoint.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Expiry instant in unix seconds.
    pub fn expire_at(&self) -> i64 {
        self.expire_at
    }

    /// Seconds left before the proxy expires. Zero or negative once expired.
    pub fn remaining_lifetime(&self) -> i64 {
        self.remaining_lifetime_at(chrono::Utc::now().timestamp())
    }

    /// Seconds left relative to `now` (unix seconds).
    pub fn remaining_lifetime_at(&self, now: i64) -> i64 {
        self.expire_at - now
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_lifetime() <= 0
    }

    /// Queue form: `{"Proxy":"host:port","expireTime":<secs>}`.
    pub fn serialize(&self) -> String {
        serde_json::json!({
            "Proxy": self.address,
            "expireTime": self.expire_at,
        })
        .to_string()
    }

    /// Decode the queue form produced by [`Proxy::serialize`].
    pub fn deserialize(raw: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Append this record to the tail of the ready queue, bypassing validation.
    pub async fn enqueue(&self, store: &dyn ProxyStore, queue_key: &str) -> Result<(), StoreError> {
        store.push_tail(queue_key, self.serialize()).await
    }

    /// Convert the address to a reqwest::Proxy routing all traffic through it.
    pub fn to_reqwest_proxy(&self) -> Result<reqwest::Proxy, reqwest::Error> {
        reqwest::Proxy::all(format!("http://{}", self.address))
    }
}
