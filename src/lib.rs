// Credential Rotator Library - Resumable Credential Rotation for Kubernetes
// This exposes the engine, its adapters and the ambient stack for the binary and tests

pub mod config;
pub mod ibmcloud;
pub mod kubernetes;
pub mod observability;
pub mod rotation;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{ObservabilityConfig, RotatorConfig};
pub use ibmcloud::{IbmCloudIssuer, RateLimitedHttpClient};
pub use kubernetes::{build_reconciler, CredentialRotator, CredentialRotatorSpec, CredentialRotatorStatus};
pub use observability::{OperationTimer, RotationMetrics, RotationStats};
pub use rotation::{
    ObjectKey, Phase, ReconcileAction, ReconcileError, Reconciler, RotationSettings,
};
pub use telemetry::{create_reconcile_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
