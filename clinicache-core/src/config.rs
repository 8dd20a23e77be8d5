//! Cache Configuration Module
//!
//! Configuration for the cache engine. Loaded from environment variables
//! with defaults suitable for development.

use std::collections::HashMap;
use std::time::Duration;

use crate::domain::{Domain, PolicyTable};
use crate::error::ConfigError;

/// Default application namespace, the first segment of every cache key.
pub const DEFAULT_NAMESPACE: &str = "clinicache";

// ============================================================================
// CACHE CONFIGURATION
// ============================================================================

/// Cache engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Application namespace. Restricted to `[A-Za-z0-9_-]`.
    pub namespace: String,

    /// Timeout applied to every individual backend call.
    pub operation_timeout: Duration,

    /// Number of response-time samples kept for percentile computation.
    pub metrics_window: usize,

    /// Redis connection URL. `None` selects the in-process backend.
    pub redis_url: Option<String>,

    /// Per-domain ttl overrides, in seconds.
    pub ttl_overrides: HashMap<Domain, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            operation_timeout: Duration::from_millis(100),
            metrics_window: 1000,
            redis_url: None,
            ttl_overrides: HashMap::new(),
        }
    }
}

impl CacheConfig {
    /// Create CacheConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CLINICACHE_NAMESPACE`: Key namespace (default: "clinicache")
    /// - `CLINICACHE_OPERATION_TIMEOUT_MS`: Per-call backend timeout (default: 100)
    /// - `CLINICACHE_METRICS_WINDOW`: Response-time samples kept (default: 1000)
    /// - `CLINICACHE_REDIS_URL`: Redis URL (default: unset, in-process backend)
    /// - `CLINICACHE_TTL_<DOMAIN>`: TTL override in seconds, e.g. `CLINICACHE_TTL_CONTACTS`
    pub fn from_env() -> Self {
        let namespace = std::env::var("CLINICACHE_NAMESPACE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let operation_timeout_ms = std::env::var("CLINICACHE_OPERATION_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        let metrics_window = std::env::var("CLINICACHE_METRICS_WINDOW")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);

        let redis_url = std::env::var("CLINICACHE_REDIS_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let ttl_overrides = Domain::ALL
            .iter()
            .filter_map(|domain| {
                let var = format!("CLINICACHE_TTL_{}", domain.as_str().to_ascii_uppercase());
                std::env::var(var)
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|ttl| (*domain, ttl))
            })
            .collect();

        Self {
            namespace,
            operation_timeout: Duration::from_millis(operation_timeout_ms),
            metrics_window,
            redis_url,
            ttl_overrides,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_metrics_window(mut self, window: usize) -> Self {
        self.metrics_window = window;
        self
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn with_ttl(mut self, domain: Domain, ttl_secs: u64) -> Self {
        self.ttl_overrides.insert(domain, ttl_secs);
        self
    }

    /// Build the frozen policy table for this configuration.
    pub fn policy_table(&self) -> PolicyTable {
        PolicyTable::with_ttl_overrides(&self.ttl_overrides)
    }

    /// Validate the configuration.
    ///
    /// The namespace must not contain `:` or glob metacharacters, otherwise
    /// tenant patterns could match keys outside the tenant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "namespace".to_string(),
            });
        }
        if !self
            .namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::InvalidValue {
                field: "namespace".to_string(),
                value: self.namespace.clone(),
                reason: "only ASCII letters, digits, '_' and '-' are allowed".to_string(),
            });
        }
        if self.operation_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "operation_timeout".to_string(),
                value: "0".to_string(),
                reason: "backend calls need a non-zero timeout".to_string(),
            });
        }
        if self.metrics_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "metrics_window".to_string(),
                value: "0".to_string(),
                reason: "at least one sample must be kept".to_string(),
            });
        }
        if let Some((domain, _)) = self.ttl_overrides.iter().find(|(_, ttl)| **ttl == 0) {
            return Err(ConfigError::InvalidValue {
                field: format!("ttl.{}", domain),
                value: "0".to_string(),
                reason: "ttl must be at least one second".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let previous = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.operation_timeout, Duration::from_millis(100));
        assert_eq!(config.metrics_window, 1000);
    }

    #[test]
    fn test_namespace_with_separator_is_rejected() {
        let config = CacheConfig::default().with_namespace("clinic:prod");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "namespace"
        ));
        let config = CacheConfig::default().with_namespace("clinic*");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ttl_override_is_rejected() {
        let config = CacheConfig::default().with_ttl(Domain::Contacts, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_reads_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let _ns = EnvVarGuard::set("CLINICACHE_NAMESPACE", "staging");
        let _timeout = EnvVarGuard::set("CLINICACHE_OPERATION_TIMEOUT_MS", "250");
        let _ttl = EnvVarGuard::set("CLINICACHE_TTL_MEDICAL_RECORDS", "42");

        let config = CacheConfig::from_env();
        assert_eq!(config.namespace, "staging");
        assert_eq!(config.operation_timeout, Duration::from_millis(250));
        assert_eq!(config.ttl_overrides.get(&Domain::MedicalRecords), Some(&42));
        assert_eq!(config.policy_table().get(Domain::MedicalRecords).ttl_secs, 42);
    }
}
