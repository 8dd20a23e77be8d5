//! Health check types
//!
//! Shared by the cache engine and anything that reports on it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health status for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,
    /// Component is operational but slow or ineffective
    Degraded,
    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// The worse of two statuses.
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        self.max(other)
    }
}

/// Detailed health check result for a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub component: String,
    /// Reasons for a non-healthy status, in evaluation order.
    pub reasons: Vec<String>,
    pub response_time_ms: Option<f64>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl HealthCheck {
    /// Create a healthy check result.
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            component: component.into(),
            reasons: Vec::new(),
            response_time_ms: None,
            metadata: HashMap::new(),
        }
    }

    /// Lower the status to at least `status`, recording why.
    pub fn downgrade(&mut self, status: HealthStatus, reason: impl Into<String>) {
        self.status = self.status.worst(status);
        self.reasons.push(reason.into());
    }

    pub fn with_response_time(mut self, ms: f64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downgrade_keeps_worst_status() {
        let mut check = HealthCheck::healthy("cache");
        check.downgrade(HealthStatus::Unhealthy, "backend down");
        check.downgrade(HealthStatus::Degraded, "slow");
        assert_eq!(check.status, HealthStatus::Unhealthy);
        assert_eq!(check.reasons.len(), 2);
        assert!(!check.is_healthy());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&HealthStatus::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }
}
