//! End-to-end harness runs against correct and leaky clinic stores.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clinicache_core::{ClinicResult, Domain, TenantContext, TenantId};
use clinicache_isolation::{
    seed_tenants, HarnessError, IsolationHarness, IsolationTestConfig, OperationExecutor,
    OperationOutcome, RepositoryExecutor, RunState, Severity, TargetOperation, TestOperation,
    ViolationKind,
};
use clinicache_repository::CachedRepository;
use clinicache_test_utils::fixtures::{cache_engine, registered_store, tenant};
use clinicache_storage::{trace_keys, CacheEngine};
use clinicache_test_utils::{ClinicStorage, InMemoryClinicStore, LeakyStore};
use serde_json::json;

fn tenants(ids: &[u64]) -> Vec<TenantId> {
    ids.iter().map(|id| tenant(*id)).collect()
}

async fn correct_executor(ids: &[u64]) -> Arc<RepositoryExecutor<InMemoryClinicStore>> {
    let store = Arc::new(registered_store(ids));
    executor_over(Arc::clone(&store), &store, ids).await
}

async fn leaky_executor(ids: &[u64]) -> Arc<RepositoryExecutor<LeakyStore>> {
    let inner = Arc::new(registered_store(ids));
    let leaky = Arc::new(LeakyStore::new(Arc::clone(&inner)));
    executor_over(leaky, &inner, ids).await
}

async fn executor_over<S: ClinicStorage + 'static>(
    storage: Arc<S>,
    seed_into: &InMemoryClinicStore,
    ids: &[u64],
) -> Arc<RepositoryExecutor<S>> {
    let seeds = seed_tenants(seed_into, &tenants(ids), 2).await.unwrap();
    let (_, engine) = cache_engine();
    Arc::new(RepositoryExecutor::new(
        CachedRepository::new(storage, engine),
        seeds,
    ))
}

/// Run capped at `iterations` cycles per user, no think time.
fn capped(config: IsolationTestConfig, iterations: u64) -> IsolationTestConfig {
    config
        .with_duration(Duration::from_secs(60))
        .with_max_iterations(iterations)
        .with_think_time(0, 0)
}

#[tokio::test]
async fn test_correct_store_passes_comprehensive_suite() {
    let executor = correct_executor(&[1, 2, 12]).await;
    let config = capped(
        IsolationTestConfig::comprehensive("clean", tenants(&[1, 2, 12])).with_users_per_tenant(2),
        2,
    );
    let operations_per_user = config.operations.len() as u64 * 2;

    let harness = IsolationHarness::new(config, executor).unwrap();
    let report = harness.run().await.unwrap();

    assert_eq!(harness.state(), RunState::Completed);
    assert!(report.success(), "unexpected findings: {:#?}", report.violations());
    assert!(!report.has_blocking_findings());
    assert_eq!(report.results.len(), 3);
    for result in &report.results {
        assert_eq!(result.total_operations, operations_per_user * 2);
        assert!(result.performance.cache_hit_rate.is_some());
        assert_eq!(result.recommendations.len(), 1);
    }
    assert_eq!(
        report.result_for(tenant(12)).unwrap().test_id,
        "clean-clinic_12"
    );
}

#[tokio::test]
async fn test_leaky_store_is_flagged_critical() {
    let executor = leaky_executor(&[1, 2]).await;
    let config = capped(
        IsolationTestConfig::comprehensive("leaky", tenants(&[1, 2])).with_users_per_tenant(1),
        1,
    );

    let report = IsolationHarness::new(config, executor)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(!report.success());
    assert!(report.has_blocking_findings());
    assert!(report.severity_summary().critical >= 1);

    let kinds: Vec<_> = report.violations().iter().map(|v| v.kind).collect();
    assert!(kinds.contains(&ViolationKind::DataLeak));
    assert!(kinds.contains(&ViolationKind::UnauthorizedAccess));
    assert!(!kinds.contains(&ViolationKind::CacheKeyLeak));

    let body = report.to_json();
    assert!(body["summary"]["by_severity"]["CRITICAL"].as_u64().unwrap() >= 1);
    assert_eq!(body["summary"]["success"], false);
}

#[tokio::test]
async fn test_foreign_contact_probe_yields_one_critical_per_execution() {
    let executor = leaky_executor(&[3, 5]).await;
    let config = capped(
        IsolationTestConfig::new("probe", tenants(&[3, 5]))
            .with_users_per_tenant(5)
            .with_operations(vec![TestOperation::probe(TargetOperation::GetForeignContact)]),
        1,
    );

    let report = IsolationHarness::new(config, executor)
        .unwrap()
        .run()
        .await
        .unwrap();

    let result = report.result_for(tenant(5)).unwrap();
    assert!(!result.success);
    assert_eq!(result.total_operations, 5);
    assert_eq!(result.violations.len() as u64, result.total_operations);
    assert!(result.violations.iter().all(|v| {
        v.severity == Severity::Critical && v.kind == ViolationKind::UnauthorizedAccess
    }));
    assert_eq!(
        result.recommendations,
        vec![ViolationKind::UnauthorizedAccess.recommendation().to_string()]
    );
}

#[tokio::test]
async fn test_single_probe_execution_reports_exactly_one_critical() {
    let executor = leaky_executor(&[3, 5]).await;
    let config = capped(
        IsolationTestConfig::new("probe-once", tenants(&[3, 5]))
            .with_users_per_tenant(1)
            .with_operations(vec![TestOperation::probe(TargetOperation::GetForeignContact)]),
        1,
    );

    let report = IsolationHarness::new(config, executor)
        .unwrap()
        .run()
        .await
        .unwrap();

    let result = report.result_for(tenant(5)).unwrap();
    assert_eq!(result.total_operations, 1);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].severity, Severity::Critical);
    assert_eq!(result.violations[0].tenant_id, tenant(5));
    assert_eq!(result.test_id, "probe-once-clinic_5");
    assert_eq!(result.violations[0].test_id, result.test_id);
}

#[tokio::test]
async fn test_probes_against_correct_store_pass() {
    let executor = correct_executor(&[3, 5]).await;
    let probes = [
        TargetOperation::GetForeignContact,
        TargetOperation::GetForeignAppointment,
        TargetOperation::GetForeignMedicalRecord,
        TargetOperation::UpdateForeignContact,
        TargetOperation::BulkInvalidateWithoutTenant,
    ]
    .into_iter()
    .map(TestOperation::probe)
    .collect();
    let config = capped(
        IsolationTestConfig::new("probes", tenants(&[3, 5]))
            .with_users_per_tenant(3)
            .with_operations(probes),
        2,
    );

    let report = IsolationHarness::new(config, executor)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(report.total_operations(), 2 * 3 * 5 * 2);
}

/// Executor whose cache invalidation is keyed under one fixed clinic no
/// matter which tenant is acting. Rows still belong to the acting tenant.
struct FixedClinicKeyExecutor {
    engine: Arc<CacheEngine>,
    keyed_as: TenantContext,
}

#[async_trait]
impl OperationExecutor for FixedClinicKeyExecutor {
    async fn execute(
        &self,
        ctx: &TenantContext,
        _operation: &TestOperation,
    ) -> ClinicResult<OperationOutcome> {
        let ((), keys) = trace_keys(self.engine.invalidate(
            Domain::Directory,
            "clinic",
            &self.keyed_as,
        ))
        .await;
        Ok(OperationOutcome::new(
            json!({ "tenant_id": ctx.tenant_id }),
            keys,
        ))
    }
}

#[tokio::test]
async fn test_keys_built_for_another_clinic_are_flagged_high() {
    let (_, engine) = cache_engine();
    let executor = Arc::new(FixedClinicKeyExecutor {
        engine,
        keyed_as: TenantContext::system(tenant(1)),
    });
    let config = capped(
        IsolationTestConfig::new("fixed-key", tenants(&[1, 2]))
            .with_users_per_tenant(1)
            .with_operations(vec![TestOperation::new(TargetOperation::GetClinic)]),
        1,
    );

    let report = IsolationHarness::new(config, executor)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(report.has_blocking_findings());
    assert!(report.result_for(tenant(1)).unwrap().success);

    let result = report.result_for(tenant(2)).unwrap();
    assert_eq!(result.violations.len(), 1);
    let violation = &result.violations[0];
    assert_eq!(violation.kind, ViolationKind::CacheKeyLeak);
    assert_eq!(violation.severity, Severity::High);
    assert_eq!(violation.test_id, "fixed-key-clinic_2");
    assert_eq!(
        violation.evidence["cache_keys"],
        json!(["clinicache:directory:clinic_1:clinic"])
    );

    let summary = report.severity_summary();
    assert_eq!(summary.high, 1);
    assert_eq!(summary.critical, 0);
}

// ============================================================================
// LIFECYCLE
// ============================================================================

/// Executor whose operations never complete.
struct StallingExecutor;

#[async_trait]
impl OperationExecutor for StallingExecutor {
    async fn execute(
        &self,
        _ctx: &TenantContext,
        _operation: &TestOperation,
    ) -> ClinicResult<OperationOutcome> {
        std::future::pending().await
    }
}

/// Executor that answers instantly with the caller's tenant.
#[derive(Default)]
struct CountingExecutor {
    calls: AtomicU64,
}

#[async_trait]
impl OperationExecutor for CountingExecutor {
    async fn execute(
        &self,
        ctx: &TenantContext,
        _operation: &TestOperation,
    ) -> ClinicResult<OperationOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(OperationOutcome::new(
            json!({ "tenant_id": ctx.tenant_id }),
            Vec::new(),
        ))
    }
}

fn list_contacts_only(test_id: &str, ids: &[u64]) -> IsolationTestConfig {
    IsolationTestConfig::new(test_id, tenants(ids))
        .with_users_per_tenant(2)
        .with_operations(vec![TestOperation::new(TargetOperation::ListContacts)])
}

#[tokio::test(start_paused = true)]
async fn test_deadline_is_honored_when_operations_stall() {
    let config = list_contacts_only("stall", &[1]).with_duration(Duration::from_secs(10));
    let harness = IsolationHarness::new(config, Arc::new(StallingExecutor)).unwrap();

    let started = tokio::time::Instant::now();
    let report = harness.run().await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(started.elapsed() < Duration::from_secs(11));
    assert_eq!(report.total_operations(), 0);
    assert!(report.success());
    assert_eq!(harness.state(), RunState::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_a_long_run() {
    let executor = Arc::new(CountingExecutor::default());
    let config = list_contacts_only("stop", &[1, 2])
        .with_duration(Duration::from_secs(3600))
        .with_think_time(10, 10);
    let harness = Arc::new(IsolationHarness::new(config, Arc::clone(&executor)).unwrap());

    let running = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move { harness.run().await })
    };
    tokio::time::sleep(Duration::from_millis(55)).await;
    harness.stop();

    let report = running.await.unwrap().unwrap();
    assert_eq!(harness.state(), RunState::Completed);
    assert!(report.total_operations() > 0);
    assert_eq!(report.total_operations(), executor.calls.load(Ordering::SeqCst));
    assert!(report.success());
}

#[tokio::test]
async fn test_harness_runs_once() {
    let config = capped(list_contacts_only("once", &[1]), 1);
    let harness = IsolationHarness::new(config, Arc::new(CountingExecutor::default())).unwrap();

    harness.run().await.unwrap();
    let again = harness.run().await;
    assert!(matches!(
        again,
        Err(HarnessError::InvalidState {
            state: RunState::Completed
        })
    ));
}

#[tokio::test]
async fn test_iteration_cap_bounds_operations() {
    let executor = Arc::new(CountingExecutor::default());
    let config = capped(list_contacts_only("cap", &[1, 2]), 3);

    let report = IsolationHarness::new(config, Arc::clone(&executor))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.total_operations(), 2 * 2 * 3);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 12);
    assert!(report.results.iter().all(|r| r.performance.cache_hit_rate.is_none()));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = list_contacts_only("bad", &[1]).with_users_per_tenant(0);
    let result = IsolationHarness::new(config, Arc::new(CountingExecutor::default()));
    assert!(matches!(result, Err(HarnessError::Clinic(_))));
}
