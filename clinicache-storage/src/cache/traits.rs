//! Cache backend trait.
//!
//! A backend is a shared key-value store reachable by every process. It
//! knows nothing about tenants: isolation lives entirely in the keys the
//! engine hands it.

use async_trait::async_trait;
use clinicache_core::CacheError;
use std::time::Duration;

/// Cache backend trait for pluggable cache implementations.
///
/// Implementations must be thread-safe and support concurrent access.
/// Values are opaque strings (the engine stores JSON). Errors are reported,
/// never retried; the engine decides how to degrade.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Get a value, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Set a value with a time-to-live.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Delete every key matching a glob pattern, returning the count.
    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, CacheError>;

    /// Liveness probe.
    async fn is_available(&self) -> bool;

    /// Set a batch of values in one round trip.
    async fn set_many(
        &self,
        entries: Vec<(String, String)>,
        ttl: Duration,
    ) -> Result<(), CacheError>;
}
