//! Error types for Clinicache operations

use crate::tenant::TenantId;
use crate::EntityType;
use thiserror::Error;
use uuid::Uuid;

/// Persistence collaborator errors.
///
/// These pass through the cache layer unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Insert failed for {entity_type}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Update failed for {entity_type} with id {id}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        id: Uuid,
        reason: String,
    },

    #[error("No clinic registered for tenant {tenant_id}")]
    ClinicNotRegistered { tenant_id: TenantId },

    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache backend errors.
///
/// The engine never returns these from a business operation; they are
/// logged and counted, then the call falls back to the authoritative store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Cache operation {operation} failed: {reason}")]
    Backend { operation: String, reason: String },

    #[error("Cache value serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Invalid cache key pattern: {pattern}")]
    InvalidPattern { pattern: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid date range: {from} is after {to}")]
    InvalidDateRange { from: String, to: String },
}

/// Configuration errors.
///
/// `TenantRequired` is a programming error: the caller reached a tenant-scoped
/// operation without a tenant. It is never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Tenant context required for {operation}")]
    TenantRequired { operation: String },

    #[error("Invalid tenant id: {value}")]
    InvalidTenantId { value: String },

    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Clinicache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClinicError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Clinicache operations.
pub type ClinicResult<T> = Result<T, ClinicError>;

impl ClinicError {
    /// True when the error came from the authoritative store.
    pub fn is_storage(&self) -> bool {
        matches!(self, ClinicError::Storage(_))
    }

    /// Shorthand for the missing-tenant configuration fault.
    pub fn tenant_required(operation: impl Into<String>) -> Self {
        ConfigError::TenantRequired {
            operation: operation.into(),
        }
        .into()
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_converts_into_clinic_error() {
        let id = Uuid::nil();
        let err: ClinicError = StorageError::NotFound {
            entity_type: EntityType::Contact,
            id,
        }
        .into();
        assert!(err.is_storage());
        assert!(err.to_string().contains("contact"));
    }

    #[test]
    fn test_tenant_required_message_names_operation() {
        let err = ClinicError::tenant_required("bulk_invalidate");
        assert_eq!(
            err,
            ClinicError::Config(ConfigError::TenantRequired {
                operation: "bulk_invalidate".to_string()
            })
        );
        assert!(err.to_string().contains("bulk_invalidate"));
    }

    #[test]
    fn test_timeout_message() {
        let err = CacheError::Timeout {
            operation: "get".to_string(),
            timeout_ms: 100,
        };
        assert_eq!(err.to_string(), "Cache operation get timed out after 100ms");
    }
}
