//! Harness Configuration Module
//!
//! A test run is a set of tenants, a number of simulated users per tenant,
//! a duration and the operations each user cycles through.

use std::time::Duration;

use clinicache_core::{ConfigError, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// OPERATIONS
// ============================================================================

/// Repository operation a simulated user performs.
///
/// The `*Foreign*` variants and `BulkInvalidateWithoutTenant` are probes:
/// they reach for data the acting tenant must not see and are expected to
/// fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetOperation {
    ListContacts,
    GetContact,
    SearchContactsByPhone,
    CreateContact,
    ListAppointments,
    GetAppointment,
    ListMedicalRecords,
    GetMedicalRecord,
    ListConversations,
    GetClinic,
    ListStaff,
    GetDashboard,
    GetAppointmentAnalytics,
    GetForeignContact,
    GetForeignAppointment,
    GetForeignMedicalRecord,
    UpdateForeignContact,
    BulkInvalidateWithoutTenant,
}

impl TargetOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetOperation::ListContacts => "list_contacts",
            TargetOperation::GetContact => "get_contact",
            TargetOperation::SearchContactsByPhone => "search_contacts_by_phone",
            TargetOperation::CreateContact => "create_contact",
            TargetOperation::ListAppointments => "list_appointments",
            TargetOperation::GetAppointment => "get_appointment",
            TargetOperation::ListMedicalRecords => "list_medical_records",
            TargetOperation::GetMedicalRecord => "get_medical_record",
            TargetOperation::ListConversations => "list_conversations",
            TargetOperation::GetClinic => "get_clinic",
            TargetOperation::ListStaff => "list_staff",
            TargetOperation::GetDashboard => "get_dashboard",
            TargetOperation::GetAppointmentAnalytics => "get_appointment_analytics",
            TargetOperation::GetForeignContact => "get_foreign_contact",
            TargetOperation::GetForeignAppointment => "get_foreign_appointment",
            TargetOperation::GetForeignMedicalRecord => "get_foreign_medical_record",
            TargetOperation::UpdateForeignContact => "update_foreign_contact",
            TargetOperation::BulkInvalidateWithoutTenant => "bulk_invalidate_without_tenant",
        }
    }

    pub fn is_probe(&self) -> bool {
        matches!(
            self,
            TargetOperation::GetForeignContact
                | TargetOperation::GetForeignAppointment
                | TargetOperation::GetForeignMedicalRecord
                | TargetOperation::UpdateForeignContact
                | TargetOperation::BulkInvalidateWithoutTenant
        )
    }
}

impl std::fmt::Display for TargetOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a simulated user's operation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOperation {
    pub name: String,
    pub target: TargetOperation,
    /// Results must contain only the acting tenant's data.
    pub expect_isolation: bool,
    /// Deliberately crosses the tenant boundary.
    pub cross_tenant_probe: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl TestOperation {
    /// A regular operation whose results are checked for foreign data.
    pub fn new(target: TargetOperation) -> Self {
        Self {
            name: target.as_str().to_string(),
            target,
            expect_isolation: true,
            cross_tenant_probe: target.is_probe(),
            payload: None,
        }
    }

    /// A cross-tenant probe that must be refused.
    pub fn probe(target: TargetOperation) -> Self {
        Self {
            cross_tenant_probe: true,
            ..Self::new(target)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Success of this operation is itself a violation.
    pub fn expects_failure(&self) -> bool {
        self.cross_tenant_probe && self.expect_isolation
    }
}

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

/// Default simulated users per tenant.
pub const DEFAULT_USERS_PER_TENANT: usize = 5;
/// Default run duration.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(30);
/// Default think-time bounds between operations, in milliseconds.
pub const DEFAULT_THINK_TIME_MS: (u64, u64) = (5, 50);

/// Isolation test run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationTestConfig {
    pub test_id: String,
    pub test_name: String,
    pub tenant_ids: Vec<TenantId>,
    pub users_per_tenant: usize,
    pub duration: Duration,
    pub operations: Vec<TestOperation>,
    /// Per-user cap on operation cycles. `None` runs until the deadline.
    pub max_iterations: Option<u64>,
    /// Inclusive bounds of the random pause between operations.
    pub think_time_ms: (u64, u64),
}

impl IsolationTestConfig {
    pub fn new(test_id: impl Into<String>, tenant_ids: Vec<TenantId>) -> Self {
        let test_id = test_id.into();
        Self {
            test_name: test_id.clone(),
            test_id,
            tenant_ids,
            users_per_tenant: DEFAULT_USERS_PER_TENANT,
            duration: DEFAULT_DURATION,
            operations: Vec::new(),
            max_iterations: None,
            think_time_ms: DEFAULT_THINK_TIME_MS,
        }
    }

    /// Every regular read plus every probe.
    pub fn comprehensive(test_id: impl Into<String>, tenant_ids: Vec<TenantId>) -> Self {
        use TargetOperation::*;

        let mut operations: Vec<TestOperation> = [
            ListContacts,
            GetContact,
            SearchContactsByPhone,
            CreateContact,
            ListAppointments,
            GetAppointment,
            ListMedicalRecords,
            GetMedicalRecord,
            ListConversations,
            GetClinic,
            ListStaff,
            GetDashboard,
            GetAppointmentAnalytics,
        ]
        .into_iter()
        .map(TestOperation::new)
        .collect();
        operations.extend(
            [
                GetForeignContact,
                GetForeignAppointment,
                GetForeignMedicalRecord,
                UpdateForeignContact,
                BulkInvalidateWithoutTenant,
            ]
            .into_iter()
            .map(TestOperation::probe),
        );

        Self::new(test_id, tenant_ids)
            .with_name("comprehensive tenant isolation")
            .with_operations(operations)
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CLINICACHE_ISOLATION_TEST_ID`: Run identifier (default: "isolation-<timestamp>")
    /// - `CLINICACHE_ISOLATION_TENANTS`: Comma-separated tenant ids (default: "1,2")
    /// - `CLINICACHE_ISOLATION_USERS`: Users per tenant (default: 5)
    /// - `CLINICACHE_ISOLATION_DURATION_SECS`: Run duration (default: 30)
    /// - `CLINICACHE_ISOLATION_MAX_ITERATIONS`: Per-user cycle cap (default: unset)
    /// - `CLINICACHE_ISOLATION_THINK_MIN_MS` / `_THINK_MAX_MS`: Pause bounds (default: 5 / 50)
    ///
    /// The operation set is always the comprehensive suite.
    pub fn from_env() -> Result<Self, ConfigError> {
        let test_id = std::env::var("CLINICACHE_ISOLATION_TEST_ID").unwrap_or_else(|_| {
            format!("isolation-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S"))
        });
        let tenants = std::env::var("CLINICACHE_ISOLATION_TENANTS")
            .unwrap_or_else(|_| "1,2".to_string());
        let tenant_ids = parse_tenants(&tenants)?;

        let mut config = Self::comprehensive(test_id, tenant_ids);
        if let Some(users) = env_number::<usize>("CLINICACHE_ISOLATION_USERS")? {
            config.users_per_tenant = users;
        }
        if let Some(secs) = env_number::<u64>("CLINICACHE_ISOLATION_DURATION_SECS")? {
            config.duration = Duration::from_secs(secs);
        }
        config.max_iterations = env_number::<u64>("CLINICACHE_ISOLATION_MAX_ITERATIONS")?;
        let min = env_number::<u64>("CLINICACHE_ISOLATION_THINK_MIN_MS")?
            .unwrap_or(DEFAULT_THINK_TIME_MS.0);
        let max = env_number::<u64>("CLINICACHE_ISOLATION_THINK_MAX_MS")?
            .unwrap_or(DEFAULT_THINK_TIME_MS.1);
        config.think_time_ms = (min, max);

        config.validate()?;
        Ok(config)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = name.into();
        self
    }

    pub fn with_users_per_tenant(mut self, users: usize) -> Self {
        self.users_per_tenant = users;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_operations(mut self, operations: Vec<TestOperation>) -> Self {
        self.operations = operations;
        self
    }

    pub fn with_max_iterations(mut self, iterations: u64) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    pub fn with_think_time(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.think_time_ms = (min_ms, max_ms);
        self
    }

    /// Test id of one tenant's result, `<test_id>-clinic_<tenant>`.
    pub fn tenant_test_id(&self, tenant: TenantId) -> String {
        format!("{}-clinic_{tenant}", self.test_id)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.test_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "test_id".to_string(),
            });
        }
        if self.tenant_ids.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "tenant_ids".to_string(),
            });
        }
        let mut sorted = self.tenant_ids.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != self.tenant_ids.len() {
            return Err(invalid("tenant_ids", &self.tenant_ids, "tenant ids must be distinct"));
        }
        if self.users_per_tenant == 0 {
            return Err(invalid(
                "users_per_tenant",
                &self.users_per_tenant,
                "at least one simulated user is required",
            ));
        }
        if self.duration.is_zero() {
            return Err(invalid("duration", &self.duration, "must be greater than zero"));
        }
        if self.operations.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "operations".to_string(),
            });
        }
        if self.max_iterations == Some(0) {
            return Err(invalid("max_iterations", &0, "must be greater than zero when set"));
        }
        let (min, max) = self.think_time_ms;
        if min > max {
            return Err(invalid(
                "think_time_ms",
                &self.think_time_ms,
                "minimum exceeds maximum",
            ));
        }
        if self.operations.iter().any(|op| op.cross_tenant_probe) && self.tenant_ids.len() < 2 {
            return Err(invalid(
                "tenant_ids",
                &self.tenant_ids,
                "cross-tenant probes need at least two tenants",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &impl std::fmt::Debug, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: format!("{value:?}"),
        reason: reason.to_string(),
    }
}

fn parse_tenants(raw: &str) -> Result<Vec<TenantId>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse::<TenantId>)
        .collect()
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw,
                reason: "not a number".to_string(),
            }),
        Err(_) => Ok(None),
    }
}
