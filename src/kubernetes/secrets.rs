use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::store_error;
use crate::rotation::record::LABEL_MODIFIED_AT;
use crate::rotation::{CredentialRecord, CredentialStore, RotationMarker, StoreError};

const KIND: &str = "Secret";

pub const DATA_URL: &str = "url";
pub const DATA_API_KEY: &str = "iamApiKey";
pub const DATA_CREDENTIAL_ID: &str = "resourceKeyID";

pub const ANNOTATION_ROTATION_ID: &str = "security.example.com/rotation-id";
pub const ANNOTATION_PREVIOUS_ID: &str = "security.example.com/previous-resource-key-id";

/// Credential records kept in Kubernetes secrets
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
    secret_type: String,
}

impl KubeSecretStore {
    pub fn new(client: Client, secret_type: impl Into<String>) -> Self {
        Self {
            client,
            secret_type: secret_type.into(),
        }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn data_string(data: &BTreeMap<String, ByteString>, key: &str) -> String {
    data.get(key)
        .map(|value| String::from_utf8_lossy(&value.0).into_owned())
        .unwrap_or_default()
}

/// Read a secret as a credential record. Missing keys read as empty.
pub fn record_from_secret(secret: &Secret) -> CredentialRecord {
    let empty = BTreeMap::new();
    let data = secret.data.as_ref().unwrap_or(&empty);
    let labels = secret.metadata.labels.clone().unwrap_or_default();
    let annotations = secret.metadata.annotations.as_ref();

    let marker = annotations
        .and_then(|a| a.get(ANNOTATION_ROTATION_ID))
        .filter(|id| !id.is_empty())
        .map(|rotation_id| RotationMarker {
            rotation_id: rotation_id.clone(),
            previous_credential_id: annotations
                .and_then(|a| a.get(ANNOTATION_PREVIOUS_ID))
                .filter(|id| !id.is_empty())
                .cloned(),
        });

    CredentialRecord {
        namespace: secret.metadata.namespace.clone().unwrap_or_default(),
        name: secret.metadata.name.clone().unwrap_or_default(),
        destination_url: data_string(data, DATA_URL),
        api_key: data_string(data, DATA_API_KEY),
        credential_id: data_string(data, DATA_CREDENTIAL_ID),
        modified_at: labels.get(LABEL_MODIFIED_AT).and_then(|v| v.parse().ok()),
        labels,
        marker,
        version: secret.metadata.resource_version.clone(),
    }
}

fn record_data(record: &CredentialRecord) -> BTreeMap<String, ByteString> {
    BTreeMap::from([
        (
            DATA_URL.to_string(),
            ByteString(record.destination_url.clone().into_bytes()),
        ),
        (
            DATA_API_KEY.to_string(),
            ByteString(record.api_key.clone().into_bytes()),
        ),
        (
            DATA_CREDENTIAL_ID.to_string(),
            ByteString(record.credential_id.clone().into_bytes()),
        ),
    ])
}

fn marker_annotations(marker: Option<&RotationMarker>) -> BTreeMap<String, Option<String>> {
    BTreeMap::from([
        (
            ANNOTATION_ROTATION_ID.to_string(),
            marker.map(|m| m.rotation_id.clone()),
        ),
        (
            ANNOTATION_PREVIOUS_ID.to_string(),
            marker.and_then(|m| m.previous_credential_id.clone()),
        ),
    ])
}

/// A brand new secret holding `record`
pub fn secret_from_record(record: &CredentialRecord, secret_type: &str) -> Secret {
    let annotations: BTreeMap<String, String> = marker_annotations(record.marker.as_ref())
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect();

    Secret {
        metadata: ObjectMeta {
            name: Some(record.name.clone()),
            namespace: Some(record.namespace.clone()),
            labels: Some(record.labels.clone()),
            annotations: Some(annotations).filter(|a| !a.is_empty()),
            ..Default::default()
        },
        data: Some(record_data(record)),
        type_: Some(secret_type.to_string()),
        immutable: Some(false),
        ..Default::default()
    }
}

/// Merge patch rewriting the credential fields of an existing secret. Keys
/// and labels owned by others are left in place.
pub fn update_patch(record: &CredentialRecord) -> Value {
    let mut metadata = json!({
        "labels": record.labels,
        "annotations": marker_annotations(record.marker.as_ref()),
    });
    if let Some(version) = &record.version {
        metadata["resourceVersion"] = json!(version);
    }
    json!({
        "metadata": metadata,
        "data": record_data(record),
    })
}

#[async_trait]
impl CredentialStore for KubeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let secret = self
            .api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| store_error(KIND, format!("{namespace}/{name}"), "get", e))?;
        Ok(secret.as_ref().map(record_from_secret))
    }

    async fn create(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let secret = secret_from_record(record, &self.secret_type);
        self.api(&record.namespace)
            .create(&PostParams::default(), &secret)
            .await
            .map_err(|e| {
                store_error(KIND, format!("{}/{}", record.namespace, record.name), "create", e)
            })?;
        Ok(())
    }

    async fn update(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let patch = update_patch(record);
        self.api(&record.namespace)
            .patch(&record.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| {
                store_error(KIND, format!("{}/{}", record.namespace, record.name), "update", e)
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CredentialRecord {
        CredentialRecord {
            namespace: "apps".to_string(),
            name: "cloudant".to_string(),
            destination_url: "https://db.example.com".to_string(),
            api_key: "apikey-new".to_string(),
            credential_id: "cred-new".to_string(),
            modified_at: Some(1_700_000_000),
            labels: BTreeMap::from([
                ("name".to_string(), "cloudant".to_string()),
                ("owner".to_string(), "credential-rotator-controller".to_string()),
                ("modifiedAt".to_string(), "1700000000".to_string()),
            ]),
            marker: Some(RotationMarker {
                rotation_id: "rot-1".to_string(),
                previous_credential_id: Some("cred-old".to_string()),
            }),
            version: Some("99".to_string()),
        }
    }

    #[test]
    fn new_secret_has_expected_layout() {
        let secret = secret_from_record(&record(), "example/credential-rotator-controller");

        assert_eq!(secret.type_.as_deref(), Some("example/credential-rotator-controller"));
        assert_eq!(secret.immutable, Some(false));
        assert_eq!(secret.metadata.resource_version, None);
        let data = secret.data.as_ref().unwrap();
        assert_eq!(data[DATA_URL].0, b"https://db.example.com");
        assert_eq!(data[DATA_API_KEY].0, b"apikey-new");
        assert_eq!(data[DATA_CREDENTIAL_ID].0, b"cred-new");
        let annotations = secret.metadata.annotations.as_ref().unwrap();
        assert_eq!(annotations[ANNOTATION_ROTATION_ID], "rot-1");
        assert_eq!(annotations[ANNOTATION_PREVIOUS_ID], "cred-old");
    }

    #[test]
    fn secret_reads_back_as_the_same_record() {
        let mut secret = secret_from_record(&record(), "Opaque");
        secret.metadata.resource_version = Some("99".to_string());

        assert_eq!(record_from_secret(&secret), record());
    }

    #[test]
    fn secret_without_data_or_marker_reads_as_empty_record() {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("cloudant".to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let record = record_from_secret(&secret);
        assert_eq!(record.credential_id, "");
        assert_eq!(record.marker, None);
        assert_eq!(record.modified_at, None);
    }

    #[test]
    fn update_patch_is_conditional_and_base64_encodes_data() {
        let patch = update_patch(&record());

        assert_eq!(patch["metadata"]["resourceVersion"], "99");
        assert_eq!(patch["data"][DATA_CREDENTIAL_ID], "Y3JlZC1uZXc=");
        assert_eq!(patch["metadata"]["labels"]["owner"], "credential-rotator-controller");
        assert_eq!(patch["metadata"]["annotations"][ANNOTATION_ROTATION_ID], "rot-1");
    }

    #[test]
    fn update_patch_removes_a_stale_marker() {
        let mut record = record();
        record.marker = None;
        let patch = update_patch(&record);

        assert_eq!(patch["metadata"]["annotations"][ANNOTATION_ROTATION_ID], Value::Null);
        assert_eq!(patch["metadata"]["annotations"][ANNOTATION_PREVIOUS_ID], Value::Null);
    }
}
