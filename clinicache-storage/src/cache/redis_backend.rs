//! Redis cache backend.
//!
//! The shared, networked backend for multi-process deployments. Uses a
//! `ConnectionManager`, which reconnects transparently; the engine's
//! per-call timeout bounds every command.
//!
//! ## Example
//!
//! ```ignore
//! let backend = RedisCacheBackend::connect("redis://localhost:6379").await?;
//! let engine = CacheEngine::new(Arc::new(backend), &CacheConfig::from_env())?;
//! ```

use async_trait::async_trait;
use clinicache_core::CacheError;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use std::time::Duration;

/// Keys requested per SCAN iteration.
const SCAN_COUNT: usize = 200;

fn backend_error(operation: &str, err: RedisError) -> CacheError {
    if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        CacheError::Unavailable {
            reason: format!("{operation}: {err}"),
        }
    } else {
        CacheError::Backend {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Redis TTLs are whole seconds; never send 0, which Redis rejects.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Redis-backed cache.
#[derive(Clone)]
pub struct RedisCacheBackend {
    conn: ConnectionManager,
}

impl RedisCacheBackend {
    /// Open a client and establish the managed connection.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(|e| CacheError::Unavailable {
            reason: format!("invalid redis url: {e}"),
        })?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| backend_error("connect", e))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl super::traits::CacheBackend for RedisCacheBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(|e| backend_error("get", e))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| backend_error("set", e))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_error("del", e))?;
        Ok(removed > 0)
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let mut cursor = 0u64;
        let mut removed = 0u64;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|e| backend_error("scan", e))?;

            if !keys.is_empty() {
                let count: u64 = redis::cmd("DEL")
                    .arg(keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| backend_error("del", e))?;
                removed += count;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(removed)
    }

    async fn is_available(&self) -> bool {
        let mut conn = self.conn.clone();
        let pong: Result<String, RedisError> = redis::cmd("PING").query_async(&mut conn).await;
        pong.is_ok()
    }

    async fn set_many(
        &self,
        entries: Vec<(String, String)>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        let secs = ttl_secs(ttl);
        for (key, value) in entries {
            pipe.cmd("SET").arg(key).arg(value).arg("EX").arg(secs).ignore();
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| backend_error("pipeline", e))
    }
}
