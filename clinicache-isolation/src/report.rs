//! Run results, aggregation and JSON export.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use clinicache_core::TenantId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::config::IsolationTestConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::harness::SessionOutcome;
use crate::violation::{IsolationViolation, Severity, ViolationKind};

/// Recommendation reported when a run has no findings.
pub const CLEAN_RUN_RECOMMENDATION: &str =
    "Tenant isolation held for every operation; keep this suite in the release gate";

/// Latency and cache figures for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceImpact {
    pub avg_response_ms: f64,
    pub max_response_ms: f64,
    /// `None` when the executor cannot observe the cache.
    pub cache_hit_rate: Option<f64>,
    /// Validation time as a percentage of response time.
    pub isolation_overhead_pct: f64,
}

/// Result for one tenant of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTestResult {
    pub test_id: String,
    pub test_name: String,
    pub tenant_id: TenantId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub total_operations: u64,
    pub violations: Vec<IsolationViolation>,
    pub performance: PerformanceImpact,
    pub recommendations: Vec<String>,
}

/// Count of findings per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl SeveritySummary {
    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Low => self.low += 1,
            Severity::Medium => self.medium += 1,
            Severity::High => self.high += 1,
            Severity::Critical => self.critical += 1,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
            Severity::Critical => self.critical,
        }
    }

    fn to_json(self) -> Value {
        Severity::ALL
            .iter()
            .map(|severity| (severity.as_str().to_string(), json!(self.count(*severity))))
            .collect::<serde_json::Map<_, _>>()
            .into()
    }
}

/// Recommendations for a set of findings: one per distinct kind, or a single
/// affirmative line when there are none.
pub fn recommendations<'a>(violations: impl IntoIterator<Item = &'a IsolationViolation>) -> Vec<String> {
    let kinds: BTreeSet<ViolationKind> = violations.into_iter().map(|v| v.kind).collect();
    if kinds.is_empty() {
        return vec![CLEAN_RUN_RECOMMENDATION.to_string()];
    }
    kinds
        .into_iter()
        .map(|kind| kind.recommendation().to_string())
        .collect()
}

/// Outcome of a whole harness run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationReport {
    pub test_id: String,
    pub test_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub users_per_tenant: usize,
    pub results: Vec<IsolationTestResult>,
}

impl IsolationReport {
    /// Fold session outcomes into one result per configured tenant.
    pub fn build(
        config: &IsolationTestConfig,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        sessions: Vec<SessionOutcome>,
        hit_rate: impl Fn(TenantId) -> Option<f64>,
    ) -> Self {
        let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;

        let results = config
            .tenant_ids
            .iter()
            .map(|tenant| {
                let mut operations = 0;
                let mut total_response_ms = 0.0;
                let mut max_response_ms: f64 = 0.0;
                let mut validation_ms = 0.0;
                let mut violations = Vec::new();

                for session in sessions.iter().filter(|s| s.tenant_id == *tenant) {
                    operations += session.operations;
                    total_response_ms += session.total_response_ms;
                    max_response_ms = max_response_ms.max(session.max_response_ms);
                    validation_ms += session.validation_ms;
                    violations.extend(session.violations.iter().cloned());
                }
                violations.sort_by_key(|v: &IsolationViolation| v.timestamp);

                let performance = PerformanceImpact {
                    avg_response_ms: if operations == 0 {
                        0.0
                    } else {
                        total_response_ms / operations as f64
                    },
                    max_response_ms,
                    cache_hit_rate: hit_rate(*tenant),
                    isolation_overhead_pct: if total_response_ms > 0.0 {
                        validation_ms / total_response_ms * 100.0
                    } else {
                        0.0
                    },
                };

                IsolationTestResult {
                    test_id: config.tenant_test_id(*tenant),
                    test_name: config.test_name.clone(),
                    tenant_id: *tenant,
                    started_at,
                    ended_at,
                    duration_ms,
                    success: violations.is_empty(),
                    total_operations: operations,
                    recommendations: recommendations(&violations),
                    violations,
                    performance,
                }
            })
            .collect();

        Self {
            test_id: config.test_id.clone(),
            test_name: config.test_name.clone(),
            started_at,
            ended_at,
            users_per_tenant: config.users_per_tenant,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn result_for(&self, tenant: TenantId) -> Option<&IsolationTestResult> {
        self.results.iter().find(|r| r.tenant_id == tenant)
    }

    pub fn violations(&self) -> Vec<&IsolationViolation> {
        self.results.iter().flat_map(|r| r.violations.iter()).collect()
    }

    pub fn total_operations(&self) -> u64 {
        self.results.iter().map(|r| r.total_operations).sum()
    }

    pub fn severity_summary(&self) -> SeveritySummary {
        let mut summary = SeveritySummary::default();
        for violation in self.violations() {
            summary.add(violation.severity);
        }
        summary
    }

    /// Any CRITICAL or HIGH finding.
    pub fn has_blocking_findings(&self) -> bool {
        self.violations().iter().any(|v| v.severity.is_blocking())
    }

    pub fn to_json(&self) -> Value {
        let violations = self.violations();
        let summary = self.severity_summary();
        json!({
            "metadata": {
                "test_id": self.test_id,
                "test_name": self.test_name,
                "started_at": self.started_at,
                "ended_at": self.ended_at,
                "duration_ms": (self.ended_at - self.started_at).num_milliseconds().max(0),
                "tenant_ids": self.results.iter().map(|r| r.tenant_id).collect::<Vec<_>>(),
                "users_per_tenant": self.users_per_tenant,
            },
            "results": self.results,
            "violations": violations,
            "summary": {
                "success": self.success(),
                "total_operations": self.total_operations(),
                "total_violations": violations.len(),
                "by_severity": summary.to_json(),
                "recommendations": recommendations(violations.iter().copied()),
            },
        })
    }

    pub fn to_json_string(&self) -> HarnessResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }

    pub fn export_json(&self, path: impl AsRef<Path>) -> HarnessResult<()> {
        let path = path.as_ref();
        let body = self.to_json_string()?;
        std::fs::write(path, body).map_err(|e| HarnessError::Export {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        info!(path = %path.display(), "isolation report exported");
        Ok(())
    }
}
