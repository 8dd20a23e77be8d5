//! The cached repository and its shared read/write paths.

use std::future::Future;
use std::sync::Arc;

use clinicache_core::{
    CacheStrategy, ClinicError, ClinicResult, Domain, EntityId, EntityType, StorageError,
    TenantContext,
};
use clinicache_storage::{CacheEngine, ClinicStorage, EventSink};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::debug;

use crate::keys;

/// Storage wrapper that applies each domain's cache policy.
///
/// Reads go through cache-aside or read-through as the domain's policy says
/// (write-through domains read cache-aside). Writes go write-through where
/// the policy says so, otherwise straight to storage followed by
/// invalidation. Either way a write clears the entity's detail key, every
/// list-shaped key of the tenant in that domain, and the policy's fan-out
/// targets.
///
/// # Usage
///
/// ```ignore
/// let repo = CachedRepository::new(Arc::new(store), engine.clone());
/// let contact = repo.get_contact(&ctx, contact_id).await?;
/// let updated = repo.update_contact(&ctx, contact_id, &update).await?;
/// ```
pub struct CachedRepository<S> {
    pub(crate) storage: Arc<S>,
    pub(crate) engine: Arc<CacheEngine>,
    events: Arc<dyn EventSink>,
}

impl<S> Clone for CachedRepository<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            engine: Arc::clone(&self.engine),
            events: Arc::clone(&self.events),
        }
    }
}

impl<S> std::fmt::Debug for CachedRepository<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedRepository")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

pub(crate) fn found<T>(value: Option<T>, entity_type: EntityType, id: EntityId) -> ClinicResult<T> {
    value.ok_or(ClinicError::Storage(StorageError::NotFound { entity_type, id }))
}

impl<S: ClinicStorage> CachedRepository<S> {
    /// Wrap `storage`. Events go to the engine's sink.
    pub fn new(storage: Arc<S>, engine: Arc<CacheEngine>) -> Self {
        let events = engine.events();
        Self {
            storage,
            engine,
            events,
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }

    // ========================================================================
    // SHARED PATHS
    // ========================================================================

    pub(crate) async fn read<T, F, Fut>(
        &self,
        domain: Domain,
        identifier: &str,
        ctx: &TenantContext,
        loader: F,
    ) -> ClinicResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClinicResult<T>>,
    {
        match self.engine.policy(domain).strategy {
            CacheStrategy::ReadThrough => {
                self.engine
                    .read_through(domain, identifier, ctx, loader)
                    .await
            }
            CacheStrategy::CacheAside | CacheStrategy::WriteThrough => {
                self.engine
                    .cache_aside(domain, identifier, ctx, loader)
                    .await
            }
        }
    }

    /// Write an entity whose detail identifier comes from the result.
    pub(crate) async fn write<T, D, W, Fut, K>(
        &self,
        domain: Domain,
        ctx: &TenantContext,
        operation: &'static str,
        data: D,
        writer: W,
        identify: K,
    ) -> ClinicResult<T>
    where
        T: Serialize,
        W: FnOnce(D) -> Fut,
        Fut: Future<Output = ClinicResult<T>>,
        K: FnOnce(&T) -> String,
    {
        let started = Instant::now();
        let result = match self.engine.policy(domain).strategy {
            CacheStrategy::WriteThrough => {
                self.engine
                    .write_through_keyed(domain, ctx, data, writer, identify)
                    .await?
            }
            CacheStrategy::CacheAside | CacheStrategy::ReadThrough => {
                let result = writer(data).await?;
                self.engine.invalidate(domain, &identify(&result), ctx).await;
                result
            }
        };
        self.invalidate_lists(domain, ctx).await;
        self.record_write(domain, operation, ctx, started);
        Ok(result)
    }

    /// Write straight to storage, then invalidate. Used for deletes and
    /// pass-through writes, which leave nothing to cache.
    pub(crate) async fn write_direct<T, Fut>(
        &self,
        domain: Domain,
        identifier: String,
        ctx: &TenantContext,
        operation: &'static str,
        write: Fut,
    ) -> ClinicResult<T>
    where
        Fut: Future<Output = ClinicResult<T>>,
    {
        let started = Instant::now();
        let result = write.await?;
        self.engine.invalidate(domain, &identifier, ctx).await;
        self.invalidate_lists(domain, ctx).await;
        self.record_write(domain, operation, ctx, started);
        Ok(result)
    }

    async fn invalidate_lists(&self, domain: Domain, ctx: &TenantContext) {
        for pattern in keys::LIST_PATTERNS {
            self.engine.invalidate_pattern(domain, ctx, pattern).await;
        }
    }

    pub(crate) fn record_write(
        &self,
        domain: Domain,
        operation: &'static str,
        ctx: &TenantContext,
        started: Instant,
    ) {
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            domain = %domain,
            operation,
            tenant_id = %ctx.tenant_id,
            duration_ms,
            "repository write"
        );
        self.events.emit(
            "repository",
            "write",
            json!({
                "domain": domain,
                "operation": operation,
                "tenant_id": ctx.tenant_id,
                "user_id": ctx.user_id,
                "duration_ms": duration_ms,
            }),
        );
    }
}
