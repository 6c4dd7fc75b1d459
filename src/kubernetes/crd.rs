use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rotation::{ObjectKey, Phase, RotationRequest, RotationSpec, RotationStatus};

/// Desired credential rotation for one IBM Cloud service instance
#[derive(CustomResource, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "security.example.com",
    version = "v1alpha1",
    kind = "CredentialRotator",
    plural = "credentialrotators",
    shortname = "credrot",
    namespaced,
    status = "CredentialRotatorStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"App","type":"string","jsonPath":".spec.appName"}"#
)]
pub struct CredentialRotatorSpec {
    /// IBM Cloud API key allowed to manage the service's resource keys
    #[serde(rename = "userAPIKey", default)]
    pub user_api_key: String,
    /// GUID of the service instance whose resource key is rotated
    #[serde(rename = "serviceGUID", default)]
    pub service_guid: String,
    /// Endpoint stored next to the credential for consumers
    #[serde(rename = "serviceURL", default)]
    pub service_url: String,
    /// Deployment restarted after the credential changes
    #[serde(rename = "appName", default)]
    pub app_name: String,
    /// Namespace of the deployment and of the credential secret
    #[serde(rename = "appNameSpace", default)]
    pub app_namespace: String,
}

impl fmt::Debug for CredentialRotatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRotatorSpec")
            .field("user_api_key", &"<redacted>")
            .field("service_guid", &self.service_guid)
            .field("service_url", &self.service_url)
            .field("app_name", &self.app_name)
            .field("app_namespace", &self.app_namespace)
            .finish()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct CredentialRotatorStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(
        rename = "previousResourceKeyID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub previous_resource_key_id: Option<String>,
    #[serde(rename = "rotationID", default, skip_serializing_if = "Option::is_none")]
    pub rotation_id: Option<String>,
}

impl From<&CredentialRotatorSpec> for RotationSpec {
    fn from(spec: &CredentialRotatorSpec) -> Self {
        RotationSpec {
            issuer_api_key: spec.user_api_key.clone(),
            resource_id: spec.service_guid.clone(),
            destination_url: spec.service_url.clone(),
            workload_name: spec.app_name.clone(),
            workload_namespace: spec.app_namespace.clone(),
        }
    }
}

impl From<Option<&CredentialRotatorStatus>> for RotationStatus {
    fn from(status: Option<&CredentialRotatorStatus>) -> Self {
        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
        RotationStatus {
            phase: Phase::parse(status.and_then(|s| s.phase.as_deref())),
            previous_credential_id: status.and_then(|s| non_empty(&s.previous_resource_key_id)),
            rotation_id: status.and_then(|s| non_empty(&s.rotation_id)),
        }
    }
}

impl CredentialRotator {
    /// Engine view of this object
    pub fn to_request(&self, key: ObjectKey) -> RotationRequest {
        RotationRequest {
            key,
            uid: self.metadata.uid.clone(),
            resource_version: self.metadata.resource_version.clone(),
            spec: RotationSpec::from(&self.spec),
            status: RotationStatus::from(self.status.as_ref()),
        }
    }
}
