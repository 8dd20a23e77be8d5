//! Per-operation isolation checks.

use clinicache_core::{ClinicResult, TenantContext, TenantId};
use clinicache_storage::CacheKey;
use serde_json::{json, Value};

use crate::config::TestOperation;
use crate::executor::OperationOutcome;
use crate::violation::{IsolationViolation, Severity, ViolationKind};

/// Check one operation result against the acting tenant.
///
/// A probe that errors passes. A probe that succeeds is a CRITICAL
/// unauthorized access and suppresses the data-leak scan, so one operation
/// yields at most one CRITICAL finding.
pub fn validate_operation(
    test_id: &str,
    ctx: &TenantContext,
    operation: &TestOperation,
    result: &ClinicResult<OperationOutcome>,
) -> Vec<IsolationViolation> {
    let finding = |kind: ViolationKind, severity: Severity, evidence: Value| {
        IsolationViolation::new(
            test_id,
            ctx.tenant_id,
            &ctx.user_id,
            &operation.name,
            kind,
            severity,
            evidence,
        )
    };

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(_) if operation.cross_tenant_probe => return Vec::new(),
        Err(err) => {
            return vec![finding(
                ViolationKind::AuditFailure,
                Severity::Medium,
                json!({
                    "target": operation.target,
                    "error": err.to_string(),
                }),
            )]
        }
    };

    let mut violations = Vec::new();

    if operation.expects_failure() {
        violations.push(finding(
            ViolationKind::UnauthorizedAccess,
            Severity::Critical,
            json!({
                "target": operation.target,
                "reason": "cross-tenant probe succeeded",
                "response": outcome.payload,
            }),
        ));
    } else if operation.expect_isolation {
        let foreign = foreign_tenant_ids(&outcome.payload, ctx.tenant_id);
        if !foreign.is_empty() {
            violations.push(finding(
                ViolationKind::DataLeak,
                Severity::Critical,
                json!({
                    "target": operation.target,
                    "expected_tenant": ctx.tenant_id,
                    "foreign_tenants": foreign,
                }),
            ));
        }
    }

    let token = CacheKey::tenant_token(ctx.tenant_id);
    let unscoped: Vec<&String> = outcome
        .cache_keys
        .iter()
        .filter(|key| !key.contains(&token))
        .collect();
    if !unscoped.is_empty() {
        violations.push(finding(
            ViolationKind::CacheKeyLeak,
            Severity::High,
            json!({
                "target": operation.target,
                "cache_keys": unscoped,
                "expected_segment": token,
            }),
        ));
    }

    violations
}

/// Distinct `tenant_id` values anywhere in `payload` that differ from
/// `expected`, in first-seen order.
pub fn foreign_tenant_ids(payload: &Value, expected: TenantId) -> Vec<u64> {
    let mut found = Vec::new();
    collect_foreign(payload, expected.get(), &mut found);
    found
}

fn collect_foreign(value: &Value, expected: u64, found: &mut Vec<u64>) {
    match value {
        Value::Object(map) => {
            for (field, nested) in map {
                if field == "tenant_id" {
                    if let Some(id) = nested.as_u64() {
                        if id != expected && !found.contains(&id) {
                            found.push(id);
                        }
                        continue;
                    }
                }
                collect_foreign(nested, expected, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_foreign(item, expected, found);
            }
        }
        _ => {}
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::config::TargetOperation;
    use clinicache_core::Role;
    use proptest::prelude::*;

    fn arb_tenant() -> impl Strategy<Value = u64> {
        1u64..=50
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        /// A list result is flagged exactly when some item belongs to
        /// another tenant, and then with a single CRITICAL finding.
        #[test]
        fn prop_list_leak_detection_matches_ownership(
            own in arb_tenant(),
            owners in prop::collection::vec(arb_tenant(), 0..12),
        ) {
            let ctx = TenantContext::new(TenantId::new(own).unwrap(), "u", Role::System);
            let payload = Value::Array(
                owners.iter().map(|t| json!({ "id": "x", "tenant_id": t })).collect(),
            );
            let result = Ok(OperationOutcome::new(payload, Vec::new()));
            let op = TestOperation::new(TargetOperation::ListAppointments);

            let violations = validate_operation("prop", &ctx, &op, &result);
            let leaked = owners.iter().any(|t| *t != own);
            prop_assert_eq!(violations.len(), usize::from(leaked));
            if leaked {
                prop_assert_eq!(violations[0].severity, Severity::Critical);
                prop_assert_eq!(violations[0].kind, ViolationKind::DataLeak);
            }
        }

        /// Keys built for the acting tenant never trip the key check.
        #[test]
        fn prop_own_tenant_keys_pass(own in arb_tenant(), identifier in "[a-z0-9:_-]{1,24}") {
            let tenant_id = TenantId::new(own).unwrap();
            let ctx = TenantContext::new(tenant_id, "u", Role::System);
            let key = CacheKey::new("clinicache", clinicache_core::Domain::Contacts, tenant_id, identifier);
            let result = Ok(OperationOutcome::new(
                json!({ "tenant_id": own }),
                vec![key.render()],
            ));
            let op = TestOperation::new(TargetOperation::GetContact);

            prop_assert!(validate_operation("prop", &ctx, &op, &result).is_empty());
        }
    }
}
