//! Tenant-scoped cache engine.
//!
//! Implements the three consistency strategies over a shared
//! `CacheBackend`. Every backend call carries a timeout, and a failing
//! backend never turns into a failing business operation: reads fall back to
//! the loader, and writes and invalidations are logged and counted.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clinicache_core::{
    CacheConfig, CacheError, ClinicResult, Domain, DomainPolicy, HealthCheck, HealthStatus,
    PolicyTable, TenantContext, TenantId, Timestamp,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::key_trace;
use super::metrics::{CacheMetrics, MetricsSnapshot, TenantMetrics};
use super::tenant_key::CacheKey;
use super::traits::CacheBackend;
use crate::events::{EventSink, TracingEventSink};

const FAILURE_CHANNEL_CAPACITY: usize = 256;

const DEGRADED_RESPONSE_MS: f64 = 10.0;
const UNHEALTHY_RESPONSE_MS: f64 = 50.0;
const DEGRADED_HIT_RATE: f64 = 0.5;
const UNHEALTHY_HIT_RATE: f64 = 0.2;

/// A cache write that did not land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheWriteFailure {
    pub key: String,
    pub domain: Domain,
    pub tenant_id: TenantId,
    pub error: String,
    pub at: Timestamp,
}

/// State shared with detached write tasks.
struct Shared {
    metrics: CacheMetrics,
    events: Arc<dyn EventSink>,
    failures: broadcast::Sender<CacheWriteFailure>,
    pending: watch::Sender<usize>,
}

impl Shared {
    fn write_failed(&self, key: String, domain: Domain, tenant_id: TenantId, err: &CacheError) {
        self.metrics.record_write_failure();
        warn!(
            key = %key,
            domain = %domain,
            tenant_id = %tenant_id,
            error = %err,
            "cache write failed"
        );
        self.events.emit(
            "cache",
            "write_failed",
            json!({
                "key": key,
                "domain": domain,
                "tenant_id": tenant_id,
                "error": err.to_string(),
            }),
        );
        // No subscribers is fine.
        let _ = self.failures.send(CacheWriteFailure {
            key,
            domain,
            tenant_id,
            error: err.to_string(),
            at: Utc::now(),
        });
    }
}

/// Counts a detached write from spawn until the task ends, even on panic.
struct PendingWrite(Arc<Shared>);

impl PendingWrite {
    fn begin(shared: &Arc<Shared>) -> Self {
        shared.pending.send_modify(|n| *n += 1);
        Self(Arc::clone(shared))
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        self.0.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    operation: &str,
    fut: impl Future<Output = Result<T, CacheError>>,
) -> Result<T, CacheError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Timeout {
            operation: operation.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Population {
    Detached,
    Awaited,
}

/// Multi-tenant cache engine.
///
/// Construct once at process start and share by `Arc`. The policy table is
/// frozen at construction.
pub struct CacheEngine {
    backend: Arc<dyn CacheBackend>,
    policies: PolicyTable,
    namespace: String,
    timeout: Duration,
    accepting: AtomicBool,
    shared: Arc<Shared>,
}

impl fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEngine")
            .field("backend", &self.backend.name())
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CacheEngine {
    /// Create an engine that reports events through `tracing`.
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> ClinicResult<Self> {
        Self::with_event_sink(backend, config, Arc::new(TracingEventSink))
    }

    /// Create an engine with an explicit event sink.
    pub fn with_event_sink(
        backend: Arc<dyn CacheBackend>,
        config: &CacheConfig,
        events: Arc<dyn EventSink>,
    ) -> ClinicResult<Self> {
        config.validate()?;
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        let (pending, _) = watch::channel(0usize);
        Ok(Self {
            backend,
            policies: config.policy_table(),
            namespace: config.namespace.clone(),
            timeout: config.operation_timeout,
            accepting: AtomicBool::new(true),
            shared: Arc::new(Shared {
                metrics: CacheMetrics::new(config.metrics_window),
                events,
                failures,
                pending,
            }),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn policy(&self, domain: Domain) -> &DomainPolicy {
        self.policies.get(domain)
    }

    pub fn events(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.shared.events)
    }

    /// Derive the tenant-scoped key for an identifier.
    pub fn key(&self, domain: Domain, ctx: &TenantContext, identifier: &str) -> CacheKey {
        CacheKey::new(self.namespace.as_str(), domain, ctx.tenant_id, identifier)
    }

    // ========================================================================
    // READ STRATEGIES
    // ========================================================================

    /// Cache-aside read.
    ///
    /// On a miss the loaded value is returned immediately and written to the
    /// backend on a detached task. Use `flush_pending_writes` to wait for it.
    pub async fn cache_aside<T, F, Fut>(
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
        self.read_path(domain, identifier, ctx, loader, Population::Detached)
            .await
    }

    /// Read-through read. A miss is written to the backend before returning.
    pub async fn read_through<T, F, Fut>(
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
        self.read_path(domain, identifier, ctx, loader, Population::Awaited)
            .await
    }

    async fn read_path<T, F, Fut>(
        &self,
        domain: Domain,
        identifier: &str,
        ctx: &TenantContext,
        loader: F,
        population: Population,
    ) -> ClinicResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClinicResult<T>>,
    {
        let tenant_id = ctx.tenant_id;
        let key = self.key(domain, ctx, identifier).render();
        key_trace::record(&key);
        let started = Instant::now();

        let lookup = with_timeout(self.timeout, "get", self.backend.get(&key)).await;
        match lookup {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    self.shared.metrics.record_hit(tenant_id, elapsed_ms(started));
                    debug!(key = %key, "cache hit");
                    return Ok(value);
                }
                Err(err) => {
                    self.shared.metrics.record_miss(tenant_id, elapsed_ms(started));
                    warn!(key = %key, error = %err, "discarding undecodable cache entry");
                }
            },
            Ok(None) => {
                self.shared.metrics.record_miss(tenant_id, elapsed_ms(started));
                debug!(key = %key, "cache miss");
            }
            Err(err) => {
                self.shared.metrics.record_error();
                warn!(key = %key, error = %err, "cache read failed, loading from store");
                return loader().await;
            }
        }

        let value = loader().await?;
        let payload = match serde_json::to_string(&value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key = %key, error = %err, "loaded value is not cacheable");
                return Ok(value);
            }
        };

        let ttl = self.policy(domain).ttl();
        match population {
            Population::Detached => self.spawn_write(key, payload, ttl, domain, tenant_id),
            Population::Awaited => {
                self.store(key, payload, ttl, domain, tenant_id).await;
            }
        }
        Ok(value)
    }

    // ========================================================================
    // WRITE STRATEGY
    // ========================================================================

    /// Write-through with a caller-supplied identifier.
    ///
    /// Order: `writer`, then the cache write, then fan-out invalidation. A
    /// failing writer aborts before the cache is touched.
    pub async fn write_through<T, D, W, Fut>(
        &self,
        domain: Domain,
        identifier: &str,
        ctx: &TenantContext,
        data: D,
        writer: W,
    ) -> ClinicResult<T>
    where
        T: Serialize,
        W: FnOnce(D) -> Fut,
        Fut: Future<Output = ClinicResult<T>>,
    {
        self.write_through_keyed(domain, ctx, data, writer, |_| identifier.to_string())
            .await
    }

    /// Write-through whose identifier is derived from the written result,
    /// for creates where the store assigns the id.
    pub async fn write_through_keyed<T, D, W, Fut, K>(
        &self,
        domain: Domain,
        ctx: &TenantContext,
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
        let result = writer(data).await?;

        let key = self.key(domain, ctx, &identify(&result)).render();
        key_trace::record(&key);
        match serde_json::to_string(&result) {
            Ok(payload) => {
                let ttl = self.policy(domain).ttl();
                self.store(key, payload, ttl, domain, ctx.tenant_id).await;
            }
            Err(err) => warn!(key = %key, error = %err, "written value is not cacheable"),
        }

        self.fan_out(domain, ctx).await;
        Ok(result)
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    /// Delete one key, then fan out. Absent keys are fine.
    pub async fn invalidate(&self, domain: Domain, identifier: &str, ctx: &TenantContext) {
        let key = self.key(domain, ctx, identifier).render();
        key_trace::record(&key);
        match with_timeout(self.timeout, "delete", self.backend.delete(&key)).await {
            Ok(removed) => {
                if removed {
                    self.shared.metrics.record_delete(1);
                }
                debug!(key = %key, removed, "cache key invalidated");
            }
            Err(err) => {
                self.shared.metrics.record_error();
                warn!(key = %key, error = %err, "cache invalidation failed");
            }
        }
        self.fan_out(domain, ctx).await;
    }

    /// Delete every key of the tenant in `domain` whose identifier matches
    /// `identifier_glob`, e.g. `list:*`. Returns the number removed.
    pub async fn invalidate_pattern(
        &self,
        domain: Domain,
        ctx: &TenantContext,
        identifier_glob: &str,
    ) -> u64 {
        let pattern =
            CacheKey::identifier_pattern(&self.namespace, domain, ctx.tenant_id, identifier_glob);
        self.delete_pattern(&pattern).await
    }

    /// Delete the whole tenant namespace of a domain.
    ///
    /// Refused without a tenant: a pattern delete with no tenant segment
    /// would be a global wipe.
    pub async fn bulk_invalidate(
        &self,
        domain: Domain,
        ctx: Option<&TenantContext>,
    ) -> ClinicResult<u64> {
        let ctx = TenantContext::resolve(None, ctx, "bulk_invalidate")?;
        let pattern = CacheKey::tenant_pattern(&self.namespace, domain, ctx.tenant_id);
        let removed = self.delete_pattern(&pattern).await;

        info!(
            domain = %domain,
            tenant_id = %ctx.tenant_id,
            user_id = %ctx.user_id,
            removed,
            "bulk cache invalidation"
        );
        self.shared.events.emit(
            "cache",
            "bulk_invalidate",
            json!({
                "domain": domain,
                "tenant_id": ctx.tenant_id,
                "user_id": ctx.user_id,
                "removed": removed,
            }),
        );
        Ok(removed)
    }

    async fn fan_out(&self, domain: Domain, ctx: &TenantContext) {
        for target in &self.policy(domain).fan_out {
            let pattern = CacheKey::tenant_pattern(&self.namespace, *target, ctx.tenant_id);
            let removed = self.delete_pattern(&pattern).await;
            debug!(
                source = %domain,
                target = %target,
                tenant_id = %ctx.tenant_id,
                removed,
                "fan-out invalidation"
            );
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> u64 {
        key_trace::record(pattern);
        match with_timeout(
            self.timeout,
            "delete_by_pattern",
            self.backend.delete_by_pattern(pattern),
        )
        .await
        {
            Ok(removed) => {
                self.shared.metrics.record_delete(removed);
                removed
            }
            Err(err) => {
                self.shared.metrics.record_error();
                warn!(pattern = %pattern, error = %err, "pattern invalidation failed");
                0
            }
        }
    }

    // ========================================================================
    // WARMING
    // ========================================================================

    /// Populate a batch of entries in one pipelined round trip.
    ///
    /// Returns how many entries were written; 0 if the backend failed.
    pub async fn warm_cache<T: Serialize>(
        &self,
        domain: Domain,
        ctx: &TenantContext,
        entries: &[(String, T)],
    ) -> usize {
        let batch: Vec<(String, String)> = entries
            .iter()
            .filter_map(|(identifier, value)| {
                let key = self.key(domain, ctx, identifier).render();
                key_trace::record(&key);
                match serde_json::to_string(value) {
                    Ok(payload) => Some((key, payload)),
                    Err(err) => {
                        warn!(key = %key, error = %err, "skipping uncacheable warm entry");
                        None
                    }
                }
            })
            .collect();
        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        let ttl = self.policy(domain).ttl();
        match with_timeout(self.timeout, "set_many", self.backend.set_many(batch, ttl)).await {
            Ok(()) => {
                self.shared.metrics.record_set(count as u64);
                debug!(domain = %domain, tenant_id = %ctx.tenant_id, count, "cache warmed");
                count
            }
            Err(err) => {
                self.shared.metrics.record_error();
                warn!(domain = %domain, tenant_id = %ctx.tenant_id, error = %err, "cache warming failed");
                0
            }
        }
    }

    // ========================================================================
    // BACKEND WRITES
    // ========================================================================

    async fn store(
        &self,
        key: String,
        payload: String,
        ttl: Duration,
        domain: Domain,
        tenant_id: TenantId,
    ) -> bool {
        let result = with_timeout(self.timeout, "set", self.backend.set(&key, payload, ttl)).await;
        match result {
            Ok(()) => {
                self.shared.metrics.record_set(1);
                true
            }
            Err(err) => {
                self.shared.write_failed(key, domain, tenant_id, &err);
                false
            }
        }
    }

    fn spawn_write(
        &self,
        key: String,
        payload: String,
        ttl: Duration,
        domain: Domain,
        tenant_id: TenantId,
    ) {
        if !self.accepting.load(Ordering::Acquire) {
            debug!(key = %key, "engine shut down, skipping cache population");
            return;
        }
        let guard = PendingWrite::begin(&self.shared);
        let backend = Arc::clone(&self.backend);
        let timeout = self.timeout;

        tokio::spawn(async move {
            let result = with_timeout(timeout, "set", backend.set(&key, payload, ttl)).await;
            match result {
                Ok(()) => guard.0.metrics.record_set(1),
                Err(err) => guard.0.write_failed(key, domain, tenant_id, &err),
            }
        });
    }

    /// Wait until every detached cache write has finished.
    pub async fn flush_pending_writes(&self) {
        let mut rx = self.shared.pending.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }

    pub fn pending_writes(&self) -> usize {
        *self.shared.pending.borrow()
    }

    /// Receive every failed cache write from now on.
    pub fn subscribe_write_failures(&self) -> broadcast::Receiver<CacheWriteFailure> {
        self.shared.failures.subscribe()
    }

    // ========================================================================
    // OBSERVABILITY
    // ========================================================================

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn tenant_metrics(&self, tenant_id: TenantId) -> TenantMetrics {
        self.shared.metrics.tenant(tenant_id)
    }

    /// Clear all metrics. Test isolation only.
    pub fn reset_metrics(&self) {
        self.shared.metrics.reset();
    }

    /// Tri-state health from liveness, average response time and hit rate.
    ///
    /// The hit-rate thresholds only apply once at least one lookup has been
    /// recorded.
    pub async fn health_check(&self) -> HealthCheck {
        let snapshot = self.metrics();
        let available = tokio::time::timeout(self.timeout, self.backend.is_available())
            .await
            .unwrap_or(false);

        let mut check = HealthCheck::healthy(format!("cache:{}", self.backend.name()))
            .with_response_time(snapshot.avg_response_ms)
            .with_metadata("hit_rate", json!(snapshot.hit_rate))
            .with_metadata("lookups", json!(snapshot.lookups()))
            .with_metadata("p95_response_ms", json!(snapshot.p95_response_ms))
            .with_metadata("write_failures", json!(snapshot.write_failures));

        if !available {
            check.downgrade(HealthStatus::Unhealthy, "cache backend unavailable");
        }

        let avg = snapshot.avg_response_ms;
        if avg > UNHEALTHY_RESPONSE_MS {
            check.downgrade(
                HealthStatus::Unhealthy,
                format!("average response time {avg:.2}ms exceeds {UNHEALTHY_RESPONSE_MS}ms"),
            );
        } else if avg > DEGRADED_RESPONSE_MS {
            check.downgrade(
                HealthStatus::Degraded,
                format!("average response time {avg:.2}ms exceeds {DEGRADED_RESPONSE_MS}ms"),
            );
        }

        if snapshot.lookups() > 0 {
            let rate = snapshot.hit_rate;
            if rate < UNHEALTHY_HIT_RATE {
                check.downgrade(
                    HealthStatus::Unhealthy,
                    format!("hit rate {:.1}% below {}%", rate * 100.0, UNHEALTHY_HIT_RATE * 100.0),
                );
            } else if rate < DEGRADED_HIT_RATE {
                check.downgrade(
                    HealthStatus::Degraded,
                    format!("hit rate {:.1}% below {}%", rate * 100.0, DEGRADED_HIT_RATE * 100.0),
                );
            }
        }

        check
    }

    /// Stop spawning detached writes and wait for the in-flight ones.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);
        self.flush_pending_writes().await;
        info!(namespace = %self.namespace, "cache engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key_trace::trace_keys;
    use crate::cache::memory_backend::InMemoryCacheBackend;
    use clinicache_core::{ClinicError, ConfigError, Role, StorageError};
    use std::sync::atomic::AtomicUsize;

    fn ctx(tenant: u64) -> TenantContext {
        TenantContext::new(TenantId::new(tenant).unwrap(), "user-1", Role::Clinician)
    }

    fn engine() -> (Arc<InMemoryCacheBackend>, CacheEngine) {
        let backend = Arc::new(InMemoryCacheBackend::new());
        let engine = CacheEngine::new(backend.clone(), &CacheConfig::default()).unwrap();
        (backend, engine)
    }

    #[tokio::test]
    async fn test_read_through_populates_before_returning() {
        let (backend, engine) = engine();
        let c = ctx(4);

        let value: String = engine
            .read_through(Domain::MedicalRecords, "detail:1", &c, || async {
                Ok("record".to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, "record");
        assert_eq!(engine.pending_writes(), 0);
        assert_eq!(
            backend
                .peek("clinicache:medical_records:clinic_4:detail:1")
                .as_deref(),
            Some("\"record\"")
        );
    }

    #[tokio::test]
    async fn test_outage_falls_back_to_loader() {
        let (backend, engine) = engine();
        backend.set_available(false);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: u32 = engine
                .cache_aside(Domain::Contacts, "summary", &ctx(1), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.metrics().errors, 2);
        assert_eq!(engine.metrics().lookups(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out_and_falls_back() {
        let (backend, engine) = engine();
        backend.set_latency(Duration::from_millis(500));

        let value: u32 = engine
            .read_through(Domain::Directory, "clinic", &ctx(1), || async { Ok(3) })
            .await
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(engine.metrics().errors, 1);
    }

    #[tokio::test]
    async fn test_loader_error_propagates_unchanged() {
        let (_backend, engine) = engine();
        let expected = ClinicError::Storage(StorageError::Unavailable {
            reason: "db down".to_string(),
        });
        let err = engine
            .cache_aside::<u32, _, _>(Domain::Contacts, "summary", &ctx(1), || async {
                Err(ClinicError::Storage(StorageError::Unavailable {
                    reason: "db down".to_string(),
                }))
            })
            .await
            .unwrap_err();
        assert_eq!(err, expected);
    }

    #[tokio::test]
    async fn test_failed_writer_leaves_cache_untouched() {
        let (backend, engine) = engine();
        let result = engine
            .write_through(Domain::Appointments, "detail:1", &ctx(3), 5u32, |_| async {
                Err::<u32, _>(ClinicError::Storage(StorageError::LockPoisoned))
            })
            .await;
        assert!(result.is_err());
        assert!(backend.is_empty());
        assert_eq!(engine.metrics().sets, 0);
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_reported_not_returned() {
        let (backend, engine) = engine();
        let mut failures = engine.subscribe_write_failures();
        backend.set_available(false);

        let written = engine
            .write_through(Domain::Directory, "clinic", &ctx(2), 9u32, |n| async move { Ok(n) })
            .await
            .unwrap();
        assert_eq!(written, 9);

        let failure = failures.try_recv().unwrap();
        assert_eq!(failure.key, "clinicache:directory:clinic_2:clinic");
        assert_eq!(failure.tenant_id, TenantId::new(2).unwrap());
        assert_eq!(engine.metrics().write_failures, 1);
    }

    #[tokio::test]
    async fn test_detached_write_failure_reaches_channel() {
        let (backend, engine) = engine();
        let mut failures = engine.subscribe_write_failures();
        // Lookup succeeds, the detached write then hits an outage.
        let value = engine
            .cache_aside(Domain::Contacts, "summary", &ctx(1), || async {
                backend.set_available(false);
                Ok(1u32)
            })
            .await
            .unwrap();
        assert_eq!(value, 1);
        engine.flush_pending_writes().await;

        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.domain, Domain::Contacts);
        assert_eq!(engine.pending_writes(), 0);
    }

    #[tokio::test]
    async fn test_bulk_invalidate_without_tenant_is_refused() {
        let (_backend, engine) = engine();
        let err = engine
            .bulk_invalidate(Domain::Contacts, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClinicError::Config(ConfigError::TenantRequired { .. })
        ));
    }

    #[tokio::test]
    async fn test_traced_write_reports_key_then_fan_out_patterns() {
        let (_backend, engine) = engine();
        let c = ctx(3);

        let (result, keys) = trace_keys(engine.write_through(
            Domain::Appointments,
            "detail:a",
            &c,
            5u32,
            |v| async move { Ok::<_, ClinicError>(v) },
        ))
        .await;

        assert_eq!(result.unwrap(), 5);
        assert_eq!(
            keys,
            vec![
                "clinicache:appointments:clinic_3:detail:a".to_string(),
                "clinicache:appointments:clinic_3:*".to_string(),
                "clinicache:analytics:clinic_3:*".to_string(),
                "clinicache:dashboard:clinic_3:*".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalidate_absent_key_is_noop_for_other_tenants() {
        let (backend, engine) = engine();
        engine
            .warm_cache(Domain::Analytics, &ctx(2), &[("summary".to_string(), 1u32)])
            .await;

        engine.invalidate(Domain::Analytics, "summary", &ctx(1)).await;
        engine.invalidate(Domain::Analytics, "summary", &ctx(1)).await;

        assert!(backend
            .peek("clinicache:analytics:clinic_2:summary")
            .is_some());
    }

    #[tokio::test]
    async fn test_warm_cache_then_hit() {
        let (_backend, engine) = engine();
        let c = ctx(6);
        let warmed = engine
            .warm_cache(
                Domain::Appointments,
                &c,
                &[("detail:a".to_string(), 1u32), ("detail:b".to_string(), 2u32)],
            )
            .await;
        assert_eq!(warmed, 2);

        let loads = AtomicUsize::new(0);
        let value: u32 = engine
            .cache_aside(Domain::Appointments, "detail:b", &c, || async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(engine.tenant_metrics(c.tenant_id).hits, 1);
    }

    #[tokio::test]
    async fn test_health_check_states() {
        let (backend, engine) = engine();
        assert_eq!(engine.health_check().await.status, HealthStatus::Healthy);

        // Three misses, no hits: hit rate 0%.
        for i in 0..3 {
            let _: u32 = engine
                .read_through(Domain::Contacts, &format!("detail:{i}"), &ctx(1), || async {
                    Ok(1)
                })
                .await
                .unwrap();
        }
        let check = engine.health_check().await;
        assert_eq!(check.status, HealthStatus::Unhealthy);
        assert!(check.reasons.iter().any(|r| r.contains("hit rate")));

        engine.reset_metrics();
        backend.set_available(false);
        let check = engine.health_check().await;
        assert_eq!(check.status, HealthStatus::Unhealthy);
        assert_eq!(check.reasons, vec!["cache backend unavailable".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_degrades_on_latency() {
        let (backend, engine) = engine();
        backend.set_latency(Duration::from_millis(20));
        let c = ctx(1);

        let _: u32 = engine
            .read_through(Domain::Contacts, "detail:x", &c, || async { Ok(1) })
            .await
            .unwrap();
        let _: u32 = engine
            .read_through(Domain::Contacts, "detail:x", &c, || async { Ok(1) })
            .await
            .unwrap();

        let check = engine.health_check().await;
        assert_eq!(check.status, HealthStatus::Degraded);
        assert!(check.reasons[0].contains("average response time"));
    }

    #[tokio::test]
    async fn test_shutdown_stops_detached_writes() {
        let (backend, engine) = engine();
        engine.shutdown().await;
        let _: u32 = engine
            .cache_aside(Domain::Contacts, "summary", &ctx(1), || async { Ok(1) })
            .await
            .unwrap();
        engine.flush_pending_writes().await;
        assert!(backend.is_empty());
    }
}
