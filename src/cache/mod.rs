//! The cache substrate (spec §6): key-value with optional TTL, plus a list
//! primitive with `LPUSH`/`BRPOP` semantics. Tolerant of sentinel-backed
//! master failover because `redis::aio::ConnectionManager` reconnects and
//! retries transparently underneath this thin wrapper.

pub mod keys;

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use serde::{de::DeserializeOwned, Serialize};

/// A handle to the shared cache.
#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
}

impl Cache {
    /// Connects to the cache at `url`, following the same `tokio-comp`
    /// client setup `ItsKorayYT-antarcticom` uses for its `redis` dependency.
    pub async fn connect(url: &str) -> Result<Cache, RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Cache { conn })
    }

    /// `Get`.
    pub async fn get(&self, key: &str) -> Result<Option<String>, RedisError> {
        self.conn.clone().get(key).await
    }

    /// `Set`, with an optional TTL.
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), RedisError> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn.set_ex(key, value, ttl.as_secs().max(1)).await,
            None => conn.set(key, value).await,
        }
    }

    /// `Delete`.
    pub async fn delete(&self, key: &str) -> Result<(), RedisError> {
        self.conn.clone().del(key).await
    }

    /// `GetJSON<T>`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, GetJsonError> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// `SetJSON<T>`, with an optional TTL.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), GetJsonError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw, ttl).await?;
        Ok(())
    }

    /// `LPUSH`.
    pub async fn lpush(&self, key: &str, value: &str) -> Result<(), RedisError> {
        self.conn.clone().lpush(key, value).await
    }

    /// `BRPOP`, blocking up to `timeout`. Returns `None` on timeout.
    pub async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, RedisError> {
        let result: Option<(String, String)> = self
            .conn
            .clone()
            .brpop(key, timeout.as_secs_f64())
            .await?;
        Ok(result.map(|(_, value)| value))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GetJsonError {
    #[error("cache error: {0}")]
    Redis(#[from] RedisError),
    #[error("malformed JSON in cache: {0}")]
    Json(#[from] serde_json::Error),
}
