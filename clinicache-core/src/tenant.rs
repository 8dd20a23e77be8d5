//! Tenant context carried through every call boundary.
//!
//! A clinic is a tenant. There is no ambient or thread-local tenant: every
//! cache and repository operation takes a `&TenantContext`, so a call site
//! that forgets the tenant does not compile.

use crate::error::{ClinicError, ClinicResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a clinic. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct TenantId(u64);

impl TenantId {
    /// Create a tenant id, rejecting zero.
    pub fn new(value: u64) -> Result<Self, ConfigError> {
        if value == 0 {
            return Err(ConfigError::InvalidTenantId {
                value: value.to_string(),
            });
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for TenantId {
    type Error = ConfigError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for u64 {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

impl FromStr for TenantId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidTenantId {
                value: s.to_string(),
            })?;
        Self::new(value)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of the acting user within the clinic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Clinician,
    Receptionist,
    /// Background jobs and the isolation harness.
    System,
}

/// The active tenant, user and role for one logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub user_id: String,
    pub role: Role,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId, user_id: impl Into<String>, role: Role) -> Self {
        Self {
            tenant_id,
            user_id: user_id.into(),
            role,
        }
    }

    /// Context for system work performed on behalf of a tenant.
    pub fn system(tenant_id: TenantId) -> Self {
        Self::new(tenant_id, "system", Role::System)
    }

    /// Resolve the context for an operation.
    ///
    /// An explicit tenant id wins over the caller's context; when only an
    /// explicit id is given the acting user is `system`. Neither present is
    /// a configuration error.
    pub fn resolve(
        explicit: Option<TenantId>,
        current: Option<&TenantContext>,
        operation: &str,
    ) -> ClinicResult<TenantContext> {
        match (explicit, current) {
            (Some(tenant_id), Some(ctx)) => Ok(TenantContext {
                tenant_id,
                ..ctx.clone()
            }),
            (Some(tenant_id), None) => Ok(TenantContext::system(tenant_id)),
            (None, Some(ctx)) => Ok(ctx.clone()),
            (None, None) => Err(ClinicError::tenant_required(operation)),
        }
    }

    /// Same user and role acting against another tenant.
    pub fn with_tenant(&self, tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(id: u64) -> TenantId {
        TenantId::new(id).unwrap()
    }

    #[test]
    fn test_tenant_id_rejects_zero() {
        assert!(TenantId::new(0).is_err());
        assert!("0".parse::<TenantId>().is_err());
        assert!("abc".parse::<TenantId>().is_err());
        assert_eq!(" 12 ".parse::<TenantId>().unwrap(), tenant(12));
    }

    #[test]
    fn test_tenant_id_serde_rejects_zero() {
        assert!(serde_json::from_str::<TenantId>("0").is_err());
        assert_eq!(serde_json::from_str::<TenantId>("7").unwrap(), tenant(7));
    }

    #[test]
    fn test_resolve_prefers_explicit_tenant() {
        let ctx = TenantContext::new(tenant(3), "u-1", Role::Clinician);
        let resolved = TenantContext::resolve(Some(tenant(5)), Some(&ctx), "read").unwrap();
        assert_eq!(resolved.tenant_id, tenant(5));
        assert_eq!(resolved.user_id, "u-1");
        assert_eq!(resolved.role, Role::Clinician);
    }

    #[test]
    fn test_resolve_falls_back_to_current_context() {
        let ctx = TenantContext::new(tenant(3), "u-1", Role::Admin);
        let resolved = TenantContext::resolve(None, Some(&ctx), "read").unwrap();
        assert_eq!(resolved, ctx);
    }

    #[test]
    fn test_resolve_without_tenant_is_config_error() {
        let err = TenantContext::resolve(None, None, "bulk_invalidate").unwrap_err();
        assert!(matches!(
            err,
            ClinicError::Config(ConfigError::TenantRequired { ref operation })
                if operation == "bulk_invalidate"
        ));
    }

    #[test]
    fn test_resolve_explicit_only_is_system_user() {
        let resolved = TenantContext::resolve(Some(tenant(9)), None, "warm").unwrap();
        assert_eq!(resolved.role, Role::System);
        assert_eq!(resolved.user_id, "system");
    }
}
