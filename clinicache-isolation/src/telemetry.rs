//! Tracing Subscriber Initialization
//!
//! Structured logs for the harness binary. JSON output for CI log
//! collectors, human-readable text for local runs.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{HarnessError, HarnessResult};

/// Default directives when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "clinicache_isolation=info,clinicache_storage=warn,info";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Emit JSON lines instead of text.
    pub json: bool,
    /// Filter directives used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json: false,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Environment variables:
    /// - `CLINICACHE_LOG_FORMAT`: `json` or `text` (default: text)
    /// - `CLINICACHE_LOG_FILTER`: Fallback filter directives
    pub fn from_env() -> Self {
        let json = std::env::var("CLINICACHE_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let default_filter =
            std::env::var("CLINICACHE_LOG_FILTER").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
        Self {
            json,
            default_filter,
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> HarnessResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .map_err(|e| HarnessError::Telemetry {
            reason: format!("invalid filter directives: {e}"),
        })?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| HarnessError::Telemetry {
        reason: format!("failed to init subscriber: {e}"),
    })?;

    tracing::debug!(json = config.json, "telemetry initialized");
    Ok(())
}
