// Kubernetes adapters: CRD, secrets, deployments, events and the controller loop

pub mod controller;
pub mod crd;
pub mod deployments;
pub mod events;
pub mod requests;
pub mod secrets;

pub use controller::{run, ControllerSettings};
pub use crd::{CredentialRotator, CredentialRotatorSpec, CredentialRotatorStatus};
pub use deployments::KubeWorkloadNotifier;
pub use events::KubeEventSink;
pub use requests::KubeRequestStore;
pub use secrets::KubeSecretStore;

use anyhow::Result;
use kube::Client;
use std::fmt::Display;
use std::sync::Arc;

use crate::config::RotatorConfig;
use crate::ibmcloud::IbmCloudIssuer;
use crate::rotation::{Reconciler, StoreError};

/// Map an API failure, turning 409 responses into conflicts
pub(crate) fn store_error(
    kind: &'static str,
    key: impl Display,
    operation: &str,
    error: kube::Error,
) -> StoreError {
    match error {
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict {
            kind,
            key: key.to_string(),
        },
        other => StoreError::backend(format!("{operation} {kind} {key}"), other),
    }
}

/// Wire the engine to the cluster and to IBM Cloud
pub fn build_reconciler(client: Client, config: &RotatorConfig) -> Result<Reconciler> {
    let issuer = IbmCloudIssuer::new(&config.issuer)?;
    Ok(Reconciler::new(
        Arc::new(KubeRequestStore::new(client.clone())),
        Arc::new(issuer),
        Arc::new(KubeSecretStore::new(
            client.clone(),
            config.credential_record.secret_type.clone(),
        )),
        Arc::new(KubeWorkloadNotifier::new(
            client.clone(),
            config.workload.restart_label.clone(),
        )),
        Arc::new(KubeEventSink::new(client, config.controller.reporter.clone())),
        config.rotation_settings(),
    ))
}
