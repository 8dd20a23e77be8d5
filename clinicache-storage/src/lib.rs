//! Clinicache Storage - Persistence Contract and Cache Engine
//!
//! Defines the persistence collaborator trait the cached repository wraps,
//! an in-memory reference store, the cache backends and the tenant-scoped
//! cache engine.

pub mod cache;
pub mod clinic_storage;
pub mod events;
pub mod memory_store;

pub use cache::{
    trace_keys, CacheBackend, CacheEngine, CacheKey, CacheMetrics, CacheWriteFailure,
    GlobPattern, InMemoryCacheBackend, MetricsSnapshot, TenantMetrics,
};
#[cfg(feature = "redis")]
pub use cache::RedisCacheBackend;
pub use clinic_storage::ClinicStorage;
pub use events::{EventSink, NoopEventSink, TracingEventSink};
pub use memory_store::InMemoryClinicStore;

use clinicache_core::{CacheConfig, ClinicResult};
use std::sync::Arc;

/// Build the backend selected by `config`: Redis when a URL is set and the
/// `redis` feature is enabled, otherwise the in-process backend.
pub async fn backend_from_config(config: &CacheConfig) -> ClinicResult<Arc<dyn CacheBackend>> {
    match &config.redis_url {
        #[cfg(feature = "redis")]
        Some(url) => {
            let backend = RedisCacheBackend::connect(url).await?;
            tracing::info!(backend = "redis", "cache backend connected");
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!(
                "CLINICACHE_REDIS_URL is set but the redis feature is disabled; using in-memory cache"
            );
            Ok(Arc::new(InMemoryCacheBackend::new()))
        }
        None => Ok(Arc::new(InMemoryCacheBackend::new())),
    }
}
