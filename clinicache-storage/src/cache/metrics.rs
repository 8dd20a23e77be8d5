//! Cache metrics record.
//!
//! Process-wide counters plus a bounded window of response-time samples and
//! per-tenant hit/miss counters. Increments are lock-free; the sample window
//! takes a short mutex. Lost updates under contention are acceptable.

use clinicache_core::TenantId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct TenantCounters {
    hits: u64,
    misses: u64,
}

/// Shared metrics record.
#[derive(Debug)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
    write_failures: AtomicU64,
    samples: Mutex<VecDeque<f64>>,
    window: usize,
    tenants: DashMap<TenantId, TenantCounters>,
}

/// Point-in-time view of the metrics record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub write_failures: u64,
    /// hits / (hits + misses); 0.0 before the first lookup.
    pub hit_rate: f64,
    pub avg_response_ms: f64,
    pub p95_response_ms: f64,
    pub p99_response_ms: f64,
    pub sample_count: usize,
}

impl MetricsSnapshot {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Per-tenant view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantMetrics {
    pub tenant_id: TenantId,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

fn ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct * sorted.len() as f64 / 100.0).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

impl CacheMetrics {
    pub fn new(window: usize) -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            samples: Mutex::new(VecDeque::with_capacity(window)),
            window: window.max(1),
            tenants: DashMap::new(),
        }
    }

    pub fn record_hit(&self, tenant: TenantId, elapsed_ms: f64) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.tenants.entry(tenant).or_default().hits += 1;
        self.record_sample(elapsed_ms);
    }

    pub fn record_miss(&self, tenant: TenantId, elapsed_ms: f64) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.tenants.entry(tenant).or_default().misses += 1;
        self.record_sample(elapsed_ms);
    }

    pub fn record_set(&self, count: u64) {
        self.sets.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_delete(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_sample(&self, elapsed_ms: f64) {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.len() == self.window {
            samples.pop_front();
        }
        samples.push_back(elapsed_ms);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut sorted: Vec<f64> = self
            .samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let avg = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        MetricsSnapshot {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            hit_rate: ratio(hits, misses),
            avg_response_ms: avg,
            p95_response_ms: percentile(&sorted, 95.0),
            p99_response_ms: percentile(&sorted, 99.0),
            sample_count: sorted.len(),
        }
    }

    /// Counters for one tenant; zeros if it has never been seen.
    pub fn tenant(&self, tenant: TenantId) -> TenantMetrics {
        let (hits, misses) = self
            .tenants
            .get(&tenant)
            .map(|c| (c.hits, c.misses))
            .unwrap_or((0, 0));
        TenantMetrics {
            tenant_id: tenant,
            hits,
            misses,
            hit_rate: ratio(hits, misses),
        }
    }

    /// Clear everything. Test isolation only.
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.sets,
            &self.deletes,
            &self.errors,
            &self.write_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.tenants.clear();
    }
}
