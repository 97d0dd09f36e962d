//! Redis caching service for dashboard aggregates.
//!
//! Values are stored as serde JSON with a TTL; a failing Redis never
//! fails a request, reads degrade to a miss.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Redis cache client with connection pooling.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    default_ttl: Duration,
}

impl RedisCache {
    /// Create a new Redis cache connection.
    pub async fn new(redis_url: &str, default_ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!(ttl_secs = default_ttl_seconds, "Redis cache connected");

        Ok(Self {
            conn,
            default_ttl: Duration::from_secs(default_ttl_seconds),
        })
    }

    /// Get a value from cache.
    #[instrument(skip(self), fields(cache_hit))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone();

        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => match serde_json::from_str(&data) {
                Ok(value) => {
                    debug!(key = key, "Cache hit");
                    tracing::Span::current().record("cache_hit", true);
                    Some(value)
                }
                Err(e) => {
                    warn!(key = key, error = %e, "Failed to deserialize cached value");
                    tracing::Span::current().record("cache_hit", false);
                    None
                }
            },
            Ok(None) => {
                debug!(key = key, "Cache miss");
                tracing::Span::current().record("cache_hit", false);
                None
            }
            Err(e) => {
                error!(key = key, error = %e, "Redis get error");
                tracing::Span::current().record("cache_hit", false);
                None
            }
        }
    }

    /// Set a value in cache with the default TTL.
    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let mut conn = self.conn.clone();

        let data = serde_json::to_string(value).context("Failed to serialize value for cache")?;

        conn.set_ex::<_, _, ()>(key, data, self.default_ttl.as_secs())
            .await
            .context("Failed to set cache value")?;

        debug!(key = key, ttl_secs = self.default_ttl.as_secs(), "Cached value");
        Ok(())
    }

    /// Delete all keys matching a pattern (e.g. `dashboard:12:*`).
    #[instrument(skip(self))]
    pub async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut conn)
                .await
                .context("Failed to scan cache keys")?;

            if !keys.is_empty() {
                let n: i64 = conn.del(&keys).await.context("Failed to delete cache keys")?;
                deleted += n.max(0) as usize;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern = pattern, deleted = deleted, "Cache pattern delete");
        Ok(deleted)
    }

    /// Check if Redis is healthy.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;
        Ok(())
    }
}

/// Drops every cached dashboard of a company. Errors are logged only.
pub async fn invalidate_dashboard(cache: Option<&RedisCache>, company_id: i64) {
    if let Some(cache) = cache {
        if let Err(e) = cache.delete_pattern(&keys::dashboard_pattern(company_id)).await {
            warn!(company_id, error = %e, "Failed to invalidate dashboard cache");
        }
    }
}

/// Cache key builders.
pub mod keys {
    /// Dashboard payload of one user within a company
    pub fn dashboard(company_id: i64, user_id: i64) -> String {
        format!("dashboard:{}:{}", company_id, user_id)
    }

    /// Every dashboard entry of a company
    pub fn dashboard_pattern(company_id: i64) -> String {
        format!("dashboard:{}:*", company_id)
    }
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn dashboard_keys_share_company_prefix() {
        let key = keys::dashboard(7, 42);
        assert_eq!(key, "dashboard:7:42");
        let pattern = keys::dashboard_pattern(7);
        assert!(key.starts_with(pattern.trim_end_matches('*')));
        assert!(!keys::dashboard(70, 1).starts_with(pattern.trim_end_matches('*')));
    }
}
