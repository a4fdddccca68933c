//! Redis-backed store: the ready queue is a list, markers are `SET NX EX` keys.

use crate::error::StoreError;
use crate::store::ProxyStore;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Store backed by a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to the server at `url` (e.g. `redis://:password@host:6379/10`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ProxyStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn len(&self, key: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let len: usize = redis::cmd("LLEN").arg(key).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn push_tail(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("RPUSH").arg(key).arg(value).query_async(&mut conn).await?;
        Ok(())
    }

    async fn pop_head(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        // BLPOP treats 0 as "forever"; keep at least one millisecond.
        let secs = timeout.as_secs_f64().max(0.001);
        let reply: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(key)
            .arg(secs)
            .query_async(&mut conn)
            .await?;
        Ok(reply.map(|(_, value)| value))
    }

    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }
}
