use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::rotation::ObjectKey;

/// Initialize structured logging.
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    if config.json_logs {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .try_init()?;
    }

    tracing::info!("Credential rotator telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking the logs of one invocation
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping one reconcile invocation. `phase` is filled in once the
/// request has been loaded.
pub fn create_reconcile_span(key: &ObjectKey, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "reconcile",
        request.namespace = %key.namespace,
        request.name = %key.name,
        phase = tracing::field::Empty,
        correlation.id = correlation_id,
        otel.kind = "internal"
    )
}

/// Shutdown telemetry gracefully
pub fn shutdown_telemetry() {
    tracing::info!("Credential rotator telemetry shutdown complete");
}
