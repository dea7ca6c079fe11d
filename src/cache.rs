//! Key-value cache over Redis.
//!
//! Two namespaces live here: resolved user profiles (`user:<id>`) and
//! thread summaries (`thread-summary:<ts>`), each written with its own TTL.
//! Expiry is server-side; a read past expiry is indistinguishable from a
//! never-set key. The cache is an optimization layer: callers degrade reads
//! to a miss and skip writes when the backend is unreachable.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::errors::PipelineError;

#[must_use]
pub fn user_key(user_id: &str) -> String {
    format!("user:{user_id}")
}

#[must_use]
pub fn summary_key(thread_ts: &str) -> String {
    format!("thread-summary:{thread_ts}")
}

#[async_trait]
pub trait KvCache: Send + Sync {
    /// `Ok(None)` if the key was never set or its TTL elapsed.
    async fn get_json(&self, key: &str) -> Result<Option<Value>, PipelineError>;

    /// Overwrites any existing value and resets the expiry.
    async fn set_json(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), PipelineError>;
}

pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    /// # Errors
    ///
    /// Returns `PipelineError::CacheUnavailable` if the backend cannot be
    /// reached; callers are expected to fall back to an empty cache rather
    /// than abort.
    pub async fn connect(redis_url: &str) -> Result<Self, PipelineError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvCache for RedisCache {
    async fn get_json(&self, key: &str) -> Result<Option<Value>, PipelineError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(payload) => match serde_json::from_str(&payload) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    // Unparseable payloads count as a miss, same as the TTL case.
                    warn!("Discarding unparseable cache entry {key}: {e}");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn set_json(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), PipelineError> {
        let payload = serde_json::to_string(value)
            .map_err(|e| PipelineError::CacheUnavailable(format!("serialize {key}: {e}")))?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, payload, ttl.as_secs()).await?;
        Ok(())
    }
}

/// Stand-in used when the backend could not be reached at startup. Every
/// operation reports `CacheUnavailable`, so the pipeline's degrade paths
/// apply uniformly.
pub struct UnavailableCache;

#[async_trait]
impl KvCache for UnavailableCache {
    async fn get_json(&self, _key: &str) -> Result<Option<Value>, PipelineError> {
        Err(PipelineError::CacheUnavailable("no backend connection".to_string()))
    }

    async fn set_json(
        &self,
        _key: &str,
        _value: &Value,
        _ttl: Duration,
    ) -> Result<(), PipelineError> {
        Err(PipelineError::CacheUnavailable("no backend connection".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_by_kind() {
        assert_eq!(user_key("U123"), "user:U123");
        assert_eq!(summary_key("1721609600.000100"), "thread-summary:1721609600.000100");
    }

    #[tokio::test]
    async fn unavailable_cache_errors_on_both_operations() {
        let cache = UnavailableCache;
        assert!(matches!(
            cache.get_json("user:U1").await,
            Err(PipelineError::CacheUnavailable(_))
        ));
        assert!(matches!(
            cache
                .set_json("user:U1", &serde_json::json!({}), Duration::from_secs(1))
                .await,
            Err(PipelineError::CacheUnavailable(_))
        ));
    }
}
