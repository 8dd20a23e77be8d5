//! Isolation findings.

use chrono::{DateTime, Utc};
use clinicache_core::TenantId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Finding severity. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    /// CRITICAL and HIGH findings fail a CI gate.
    pub fn is_blocking(&self) -> bool {
        *self >= Severity::High
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Another tenant's record appeared in a result.
    DataLeak,
    /// A cross-tenant probe succeeded.
    UnauthorizedAccess,
    /// A cache key was built without the tenant segment.
    CacheKeyLeak,
    /// A regular operation failed unexpectedly.
    AuditFailure,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::DataLeak => "data_leak",
            ViolationKind::UnauthorizedAccess => "unauthorized_access",
            ViolationKind::CacheKeyLeak => "cache_key_leak",
            ViolationKind::AuditFailure => "audit_failure",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            ViolationKind::DataLeak => {
                "Scope every persistence query by tenant id and reject rows whose tenant does not match the caller"
            }
            ViolationKind::UnauthorizedAccess => {
                "Verify tenant ownership before returning or mutating a record looked up by id"
            }
            ViolationKind::CacheKeyLeak => {
                "Build every cache key through the tenant key builder so the clinic segment is always present"
            }
            ViolationKind::AuditFailure => {
                "Investigate operations that failed under a valid tenant context; they hide isolation checks"
            }
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single isolation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationViolation {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub test_id: String,
    pub tenant_id: TenantId,
    pub user_id: String,
    pub operation: String,
    pub kind: ViolationKind,
    pub evidence: Value,
    pub severity: Severity,
}

impl IsolationViolation {
    pub fn new(
        test_id: &str,
        tenant_id: TenantId,
        user_id: &str,
        operation: &str,
        kind: ViolationKind,
        severity: Severity,
        evidence: Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            test_id: test_id.to_string(),
            tenant_id,
            user_id: user_id.to_string(),
            operation: operation.to_string(),
            kind,
            evidence,
            severity,
        }
    }
}
