//! Concurrent isolation test runner.
//!
//! One task per (tenant, user slot). Each task cycles through the configured
//! operations under its own tenant context until the deadline passes, the
//! iteration cap is reached or the run is stopped.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use clinicache_core::{Role, TenantContext, TenantId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{IsolationTestConfig, TestOperation};
use crate::error::{HarnessError, HarnessResult};
use crate::executor::OperationExecutor;
use crate::report::IsolationReport;
use crate::validator::validate_operation;
use crate::violation::IsolationViolation;

/// Lifecycle of a harness: `Configured → Running → Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Configured,
    Running,
    Completed,
    Failed,
}

/// Totals for one simulated user.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub tenant_id: TenantId,
    pub user_id: String,
    pub operations: u64,
    pub total_response_ms: f64,
    pub max_response_ms: f64,
    pub validation_ms: f64,
    pub violations: Vec<IsolationViolation>,
}

impl SessionOutcome {
    fn new(tenant_id: TenantId, user_id: String) -> Self {
        Self {
            tenant_id,
            user_id,
            operations: 0,
            total_response_ms: 0.0,
            max_response_ms: 0.0,
            validation_ms: 0.0,
            violations: Vec::new(),
        }
    }

    fn record_response(&mut self, elapsed_ms: f64) {
        self.operations += 1;
        self.total_response_ms += elapsed_ms;
        self.max_response_ms = self.max_response_ms.max(elapsed_ms);
    }
}

/// Runs an [`IsolationTestConfig`] against an executor.
pub struct IsolationHarness<E> {
    config: IsolationTestConfig,
    executor: Arc<E>,
    state: Mutex<RunState>,
    stop: watch::Sender<bool>,
}

impl<E: OperationExecutor + 'static> IsolationHarness<E> {
    /// Fails when the configuration is invalid.
    pub fn new(config: IsolationTestConfig, executor: Arc<E>) -> HarnessResult<Self> {
        config.validate()?;
        let (stop, _) = watch::channel(false);
        Ok(Self {
            config,
            executor,
            state: Mutex::new(RunState::Configured),
            stop,
        })
    }

    pub fn config(&self) -> &IsolationTestConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Ask every session to finish after its current operation.
    pub fn stop(&self) {
        self.stop.send_replace(true);
        info!(test_id = %self.config.test_id, "isolation run stop requested");
    }

    /// Run the test to completion. A harness runs once.
    pub async fn run(&self) -> HarnessResult<IsolationReport> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != RunState::Configured {
                return Err(HarnessError::InvalidState { state: *state });
            }
            *state = RunState::Running;
        }

        let config = &self.config;
        let started_at = Utc::now();
        let deadline = Instant::now() + config.duration;
        info!(
            test_id = %config.test_id,
            tenants = config.tenant_ids.len(),
            users_per_tenant = config.users_per_tenant,
            duration_ms = config.duration.as_millis() as u64,
            "isolation run started"
        );

        let operations: Arc<[TestOperation]> = config.operations.clone().into();
        let mut sessions = JoinSet::new();
        for tenant in &config.tenant_ids {
            let test_id: Arc<str> = config.tenant_test_id(*tenant).into();
            for slot in 0..config.users_per_tenant {
                let session = Session {
                    ctx: TenantContext::new(*tenant, format!("isolation-user-{slot}"), Role::System),
                    executor: Arc::clone(&self.executor),
                    operations: Arc::clone(&operations),
                    test_id: Arc::clone(&test_id),
                    stop: self.stop.subscribe(),
                    deadline,
                    max_iterations: config.max_iterations,
                    think_time_ms: config.think_time_ms,
                };
                sessions.spawn(session.run());
            }
        }

        let mut outcomes = Vec::with_capacity(config.tenant_ids.len() * config.users_per_tenant);
        while let Some(joined) = sessions.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    sessions.abort_all();
                    self.set_state(RunState::Failed);
                    error!(test_id = %config.test_id, error = %err, "isolation session failed");
                    return Err(HarnessError::SessionFailed {
                        reason: err.to_string(),
                    });
                }
            }
        }

        let ended_at = Utc::now();
        let executor = &self.executor;
        let report = IsolationReport::build(config, started_at, ended_at, outcomes, |tenant| {
            executor.cache_hit_rate(tenant)
        });
        self.set_state(RunState::Completed);

        let summary = report.severity_summary();
        info!(
            test_id = %config.test_id,
            success = report.success(),
            operations = report.total_operations(),
            violations = report.violations().len(),
            critical = summary.critical,
            high = summary.high,
            "isolation run completed"
        );
        Ok(report)
    }
}

/// One simulated user.
struct Session<E> {
    ctx: TenantContext,
    executor: Arc<E>,
    operations: Arc<[TestOperation]>,
    test_id: Arc<str>,
    stop: watch::Receiver<bool>,
    deadline: Instant,
    max_iterations: Option<u64>,
    think_time_ms: (u64, u64),
}

impl<E: OperationExecutor> Session<E> {
    async fn run(mut self) -> SessionOutcome {
        let mut outcome = SessionOutcome::new(self.ctx.tenant_id, self.ctx.user_id.clone());
        let mut iteration: u64 = 0;

        'cycle: loop {
            if self.max_iterations.is_some_and(|cap| iteration >= cap) {
                break;
            }
            for operation in self.operations.iter() {
                if *self.stop.borrow() || Instant::now() >= self.deadline {
                    break 'cycle;
                }

                let started = Instant::now();
                let result = tokio::select! {
                    biased;
                    _ = self.stop.wait_for(|stopped| *stopped) => break 'cycle,
                    executed = tokio::time::timeout_at(
                        self.deadline,
                        self.executor.execute(&self.ctx, operation),
                    ) => match executed {
                        Ok(result) => result,
                        Err(_) => break 'cycle,
                    },
                };
                outcome.record_response(elapsed_ms(started));

                let validating = Instant::now();
                let violations = validate_operation(&self.test_id, &self.ctx, operation, &result);
                outcome.validation_ms += elapsed_ms(validating);
                for violation in &violations {
                    warn!(
                        test_id = %self.test_id,
                        tenant_id = %violation.tenant_id,
                        user_id = %violation.user_id,
                        operation = %violation.operation,
                        kind = %violation.kind,
                        severity = %violation.severity,
                        "isolation violation"
                    );
                }
                outcome.violations.extend(violations);

                let pause = think_time(self.think_time_ms);
                if !pause.is_zero() {
                    let wake = (Instant::now() + pause).min(self.deadline);
                    tokio::select! {
                        biased;
                        _ = self.stop.wait_for(|stopped| *stopped) => break 'cycle,
                        _ = tokio::time::sleep_until(wake) => {}
                    }
                }
            }
            iteration += 1;
        }

        debug!(
            tenant_id = %outcome.tenant_id,
            user_id = %outcome.user_id,
            operations = outcome.operations,
            iterations = iteration,
            "isolation session finished"
        );
        outcome
    }
}

fn think_time((min, max): (u64, u64)) -> Duration {
    if max == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(min..=max))
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_think_time_stays_in_bounds() {
        for _ in 0..100 {
            let pause = think_time((5, 50));
            assert!(pause >= Duration::from_millis(5));
            assert!(pause <= Duration::from_millis(50));
        }
        assert_eq!(think_time((0, 0)), Duration::ZERO);
        assert_eq!(think_time((7, 7)), Duration::from_millis(7));
    }

    #[test]
    fn test_session_outcome_tracks_max() {
        let mut outcome = SessionOutcome::new(TenantId::new(1).unwrap(), "u".to_string());
        outcome.record_response(3.0);
        outcome.record_response(9.5);
        outcome.record_response(1.0);
        assert_eq!(outcome.operations, 3);
        assert_eq!(outcome.max_response_ms, 9.5);
        assert!((outcome.total_response_ms - 13.5).abs() < 1e-9);
    }
}
