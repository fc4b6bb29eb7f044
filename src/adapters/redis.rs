//! Redis Cache Tier Adapter
//!
//! Implements the `CacheTier` port over a Redis connection manager. The
//! adapter is deliberately thin: keys and values are opaque here, all
//! business meaning lives above the port.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::domain::ports::CacheTier;
use crate::error::Result;

/// Redis-backed cache tier.
///
/// `ConnectionManager` multiplexes and reconnects internally, so the adapter
/// is `Clone` and safe to share across tasks.
#[derive(Clone)]
pub struct RedisCacheTier {
    conn: ConnectionManager,
}

impl RedisCacheTier {
    /// Wrap an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to a Redis URL, e.g. `redis://127.0.0.1:6379`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

impl std::fmt::Debug for RedisCacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheTier").finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheTier for RedisCacheTier {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let created: bool = conn.set_nx(key, value).await?;
        Ok(created)
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        // MGET keeps reply order aligned with the key order.
        let values: Vec<Option<String>> = conn.mget(keys).await?;
        Ok(values)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _deleted: u64 = conn.del(key).await?;
        Ok(())
    }
}
