// Traits for dependency injection - the engine only talks to its collaborators through these

use async_trait::async_trait;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::rotation::errors::{IssuerError, StoreError};
use crate::rotation::types::*;

/// Durable home of rotation requests
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Load a request, `None` when it has been deleted
    async fn get(&self, key: &ObjectKey) -> Result<Option<RotationRequest>, StoreError>;

    /// Write `status` only if the stored request still has
    /// `request.resource_version`; a stale version yields [`StoreError::Conflict`]
    async fn update_status(
        &self,
        request: &RotationRequest,
        status: &RotationStatus,
    ) -> Result<(), StoreError>;
}

/// Remote service that mints and retires credentials
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    /// Open a short-lived session for the given issuer API key
    async fn authenticate(&self, api_key: &str) -> Result<Box<dyn IssuerSession>, IssuerError>;
}

/// Authenticated handle on the issuer, scoped to one invocation
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait IssuerSession: Send + Sync {
    async fn create_credential(
        &self,
        resource_id: &str,
        name: &str,
        role: &str,
    ) -> Result<IssuedCredential, IssuerError>;

    /// Deleting a credential that no longer exists is not an error
    async fn delete_credential(&self, credential_id: &str) -> Result<DeleteOutcome, IssuerError>;
}

/// Namespaced secret records handed to consumers
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str)
        -> Result<Option<CredentialRecord>, StoreError>;

    async fn create(&self, record: &CredentialRecord) -> Result<(), StoreError>;

    /// Update in place, conditional on `record.version`
    async fn update(&self, record: &CredentialRecord) -> Result<(), StoreError>;
}

/// Restarts consumer workloads so they reload their credentials
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait WorkloadNotifier: Send + Sync {
    async fn get(&self, name: &str, namespace: &str)
        -> Result<Option<WorkloadDescriptor>, StoreError>;

    /// Stamp `marker` on the workload so its orchestrator performs a rolling restart
    async fn trigger_restart(
        &self,
        workload: &WorkloadDescriptor,
        marker: &str,
    ) -> Result<(), StoreError>;
}

/// Fire-and-forget audit trail. Implementations swallow their own failures.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, request: &RotationRequest, event: RotationEvent);
}
