//! Isolation Check Entry Point
//!
//! Seeds an in-memory clinic store, runs the comprehensive isolation suite
//! through the cached repository and exits non-zero on CRITICAL or HIGH
//! findings.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clinicache_core::{CacheConfig, Clinic, Role, StaffUser};
use clinicache_isolation::{
    init_tracing, seed_tenants, HarnessResult, IsolationHarness, IsolationTestConfig,
    RepositoryExecutor, TelemetryConfig,
};
use clinicache_repository::CachedRepository;
use clinicache_storage::{backend_from_config, CacheEngine, InMemoryClinicStore};

/// Contacts seeded per tenant before the run.
const SEED_CONTACTS_PER_TENANT: usize = 3;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = init_tracing(&TelemetryConfig::from_env()) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            tracing::error!(error = %err, "isolation check aborted");
            ExitCode::from(2)
        }
    }
}

/// Returns whether the run passed the gate.
async fn run() -> HarnessResult<bool> {
    let cache_config = CacheConfig::from_env();
    cache_config.validate()?;
    let test_config = IsolationTestConfig::from_env()?;

    let backend = backend_from_config(&cache_config).await?;
    let engine = Arc::new(CacheEngine::new(backend, &cache_config)?);
    let store = Arc::new(register_clinics(&test_config)?);
    let seeds = seed_tenants(
        store.as_ref(),
        &test_config.tenant_ids,
        SEED_CONTACTS_PER_TENANT,
    )
    .await?;

    let repo = CachedRepository::new(store, Arc::clone(&engine));
    let executor = Arc::new(RepositoryExecutor::new(repo, seeds));
    let harness = Arc::new(IsolationHarness::new(test_config, executor)?);

    let stopper = Arc::clone(&harness);
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            stopper.stop();
        }
    });
    let report = harness.run().await;
    signal.abort();
    engine.shutdown().await;
    let report = report?;

    match std::env::var("CLINICACHE_ISOLATION_REPORT") {
        Ok(path) => report.export_json(path)?,
        Err(_) => println!("{}", report.to_json_string()?),
    }

    let summary = report.severity_summary();
    tracing::info!(
        success = report.success(),
        critical = summary.critical,
        high = summary.high,
        medium = summary.medium,
        low = summary.low,
        "isolation check finished"
    );
    Ok(!report.has_blocking_findings())
}

fn register_clinics(config: &IsolationTestConfig) -> HarnessResult<InMemoryClinicStore> {
    let store = InMemoryClinicStore::new();
    for tenant in &config.tenant_ids {
        store.seed_clinic(Clinic {
            tenant_id: *tenant,
            name: format!("Clinic {tenant}"),
            timezone: "UTC".to_string(),
            phone: None,
            updated_at: Utc::now(),
        })?;
        store.seed_staff(StaffUser {
            id: format!("admin-{tenant}"),
            tenant_id: *tenant,
            name: "Clinic Admin".to_string(),
            role: Role::Admin,
            active: true,
        })?;
    }
    Ok(store)
}
