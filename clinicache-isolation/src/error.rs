//! Harness error types.

use clinicache_core::{ClinicError, ConfigError};
use thiserror::Error;

use crate::harness::RunState;

/// Errors that stop a harness run. Isolation violations are findings, not
/// errors, and never appear here.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Clinic(#[from] ClinicError),

    #[error("Harness cannot start from state {state:?}")]
    InvalidState { state: RunState },

    #[error("Simulated session failed: {reason}")]
    SessionFailed { reason: String },

    #[error("Report export to {path} failed: {reason}")]
    Export { path: String, reason: String },

    #[error("Report serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Telemetry initialization failed: {reason}")]
    Telemetry { reason: String },
}

impl From<ConfigError> for HarnessError {
    fn from(err: ConfigError) -> Self {
        HarnessError::Clinic(ClinicError::Config(err))
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        HarnessError::Serialization {
            reason: err.to_string(),
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
