//! Process-local cache backend.
//!
//! Used by tests, the isolation harness and single-node deployments. Honors
//! ttl with `tokio::time::Instant`, so paused-clock tests can expire entries
//! deterministically. Availability and latency can be toggled to exercise
//! the engine's fallback paths.

use async_trait::async_trait;
use clinicache_core::CacheError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use super::pattern::GlobPattern;
use super::traits::CacheBackend;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory cache backend.
#[derive(Debug)]
pub struct InMemoryCacheBackend {
    entries: DashMap<String, Entry>,
    available: AtomicBool,
    latency_micros: AtomicU64,
}

impl Default for InMemoryCacheBackend {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            available: AtomicBool::new(true),
            latency_micros: AtomicU64::new(0),
        }
    }
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Add artificial latency to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_micros
            .store(latency.as_micros() as u64, Ordering::Relaxed);
    }

    /// Force-evict a key, bypassing the engine.
    pub fn evict(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Live keys matching a glob pattern, sorted.
    pub fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let glob = GlobPattern::compile(pattern)?;
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_live(now) && glob.matches(e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Raw stored value, ignoring availability.
    pub fn peek(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    async fn enter(&self, operation: &str) -> Result<(), CacheError> {
        let micros = self.latency_micros.load(Ordering::Relaxed);
        if micros > 0 {
            tokio::time::sleep(Duration::from_micros(micros)).await;
        }
        if !self.available.load(Ordering::Acquire) {
            return Err(CacheError::Unavailable {
                reason: format!("in-memory backend offline during {operation}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.enter("get").await?;
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, e| !e.is_live(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.enter("set").await?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.enter("delete").await?;
        Ok(self.entries.remove(key).is_some())
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        self.enter("delete_by_pattern").await?;
        let glob = GlobPattern::compile(pattern)?;
        // Collect first: removing while iterating a DashMap deadlocks its shard.
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|e| glob.matches(e.key()))
            .map(|e| e.key().clone())
            .collect();
        let mut removed = 0u64;
        for key in doomed {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn is_available(&self) -> bool {
        self.enter("ping").await.is_ok()
    }

    async fn set_many(
        &self,
        entries: Vec<(String, String)>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.enter("set_many").await?;
        let expires_at = Instant::now() + ttl;
        for (key, value) in entries {
            self.entries.insert(key, Entry { value, expires_at });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let backend = InMemoryCacheBackend::new();
        backend
            .set("k", "v".to_string(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_ok() {
        let backend = InMemoryCacheBackend::new();
        assert!(!backend.delete("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_by_pattern_counts_matches() {
        let backend = InMemoryCacheBackend::new();
        let ttl = Duration::from_secs(60);
        backend
            .set_many(
                vec![
                    ("ns:contacts:clinic_1:a".into(), "1".into()),
                    ("ns:contacts:clinic_1:b".into(), "2".into()),
                    ("ns:contacts:clinic_12:a".into(), "3".into()),
                ],
                ttl,
            )
            .await
            .unwrap();

        let removed = backend
            .delete_by_pattern("ns:contacts:clinic_1:*")
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            backend.keys_matching("ns:*").unwrap(),
            vec!["ns:contacts:clinic_12:a".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unavailable_backend_errors() {
        let backend = InMemoryCacheBackend::new();
        backend.set_available(false);
        assert!(matches!(
            backend.get("k").await,
            Err(CacheError::Unavailable { .. })
        ));
        assert!(!backend.is_available().await);
        backend.set_available(true);
        assert!(backend.is_available().await);
    }

    #[tokio::test]
    async fn test_evict_bypasses_availability() {
        let backend = InMemoryCacheBackend::new();
        backend
            .set("k", "v".into(), Duration::from_secs(60))
            .await
            .unwrap();
        backend.set_available(false);
        assert!(backend.evict("k"));
        assert!(backend.peek("k").is_none());
    }
}
