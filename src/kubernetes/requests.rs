use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::crd::CredentialRotator;
use super::store_error;
use crate::rotation::{ObjectKey, RequestStore, RotationRequest, RotationStatus, StoreError};

const KIND: &str = "CredentialRotator";

/// CredentialRotator objects as rotation requests
#[derive(Clone)]
pub struct KubeRequestStore {
    client: Client,
}

impl KubeRequestStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<CredentialRotator> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Merge patch writing every status field. Absent values are sent as null so
/// they are cleared, and the observed resourceVersion makes the write
/// conditional.
pub fn status_patch(request: &RotationRequest, status: &RotationStatus) -> Value {
    let mut patch = json!({
        "status": {
            "phase": status.phase.as_str(),
            "previousResourceKeyID": status.previous_credential_id,
            "rotationID": status.rotation_id,
        }
    });
    if let Some(version) = &request.resource_version {
        patch["metadata"] = json!({ "resourceVersion": version });
    }
    patch
}

#[async_trait]
impl RequestStore for KubeRequestStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<RotationRequest>, StoreError> {
        let object = self
            .api(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| store_error(KIND, key, "get", e))?;
        Ok(object.map(|object| object.to_request(key.clone())))
    }

    async fn update_status(
        &self,
        request: &RotationRequest,
        status: &RotationStatus,
    ) -> Result<(), StoreError> {
        let patch = status_patch(request, status);
        self.api(&request.key.namespace)
            .patch_status(&request.key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| store_error(KIND, &request.key, "patch status of", e))?;
        debug!(phase = %status.phase, "Rotation status written");
        Ok(())
    }
}
