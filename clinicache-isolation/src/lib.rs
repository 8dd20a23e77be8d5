//! Clinicache Isolation - Tenant Isolation Validation Harness
//!
//! Simulates concurrent users of several clinics against a cached
//! repository, checks every result for data belonging to another tenant and
//! for cache keys built without the tenant segment, and reports the
//! findings by severity.
//!
//! ```no_run
//! # async fn run(executor: std::sync::Arc<impl clinicache_isolation::OperationExecutor + 'static>) -> clinicache_isolation::HarnessResult<()> {
//! use clinicache_core::TenantId;
//! use clinicache_isolation::{IsolationHarness, IsolationTestConfig};
//!
//! let tenants = vec![TenantId::new(1)?, TenantId::new(2)?];
//! let config = IsolationTestConfig::comprehensive("nightly", tenants);
//! let report = IsolationHarness::new(config, executor)?.run().await?;
//! assert!(!report.has_blocking_findings());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod harness;
pub mod report;
pub mod telemetry;
pub mod validator;
pub mod violation;

pub use config::{IsolationTestConfig, TargetOperation, TestOperation};
pub use error::{HarnessError, HarnessResult};
pub use executor::{
    seed_tenants, OperationExecutor, OperationOutcome, RepositoryExecutor, SeedIndex, TenantSeed,
};
pub use harness::{IsolationHarness, RunState, SessionOutcome};
pub use report::{IsolationReport, IsolationTestResult, PerformanceImpact, SeveritySummary};
pub use telemetry::{init_tracing, TelemetryConfig};
pub use validator::validate_operation;
pub use violation::{IsolationViolation, Severity, ViolationKind};
