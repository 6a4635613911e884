//! Tracing Subscriber Initialization
//!
//! Structured logging for the server: an `EnvFilter` driven by `RUST_LOG`
//! and a fmt layer that emits JSON in deployed environments and
//! human-readable lines in development.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "ledgerline_api=debug,ledgerline_pool=debug,tower_http=info,info";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Environment (production, staging, development)
    pub environment: String,
    /// Emit JSON lines instead of pretty output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let environment = std::env::var("LEDGERLINE_ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string());
        let json = std::env::var("LEDGERLINE_LOG_JSON")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(environment != "development");
        Self {
            service_name: std::env::var("LEDGERLINE_SERVICE_NAME")
                .unwrap_or_else(|_| "ledgerline-api".to_string()),
            environment,
            json,
        }
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_tracing(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = config.service_name,
        environment = config.environment,
        json = config.json,
        "Telemetry initialized"
    );

    Ok(())
}
