use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::{json, Value};

use super::store_error;
use crate::rotation::{StoreError, WorkloadDescriptor, WorkloadNotifier};

const KIND: &str = "Deployment";

/// Restarts deployments by stamping a label on their pod template
#[derive(Clone)]
pub struct KubeWorkloadNotifier {
    client: Client,
    restart_label: String,
}

impl KubeWorkloadNotifier {
    pub fn new(client: Client, restart_label: impl Into<String>) -> Self {
        Self {
            client,
            restart_label: restart_label.into(),
        }
    }
}

pub fn describe(deployment: &Deployment, restart_label: &str) -> WorkloadDescriptor {
    let spec = deployment.spec.as_ref();
    WorkloadDescriptor {
        name: deployment.metadata.name.clone().unwrap_or_default(),
        namespace: deployment.metadata.namespace.clone().unwrap_or_default(),
        replicas: spec.and_then(|s| s.replicas),
        restart_marker: spec
            .and_then(|s| s.template.metadata.as_ref())
            .and_then(|m| m.labels.as_ref())
            .and_then(|labels| labels.get(restart_label))
            .cloned(),
    }
}

/// Changing a pod template label makes the deployment controller roll every pod
pub fn restart_patch(restart_label: &str, marker: &str) -> Value {
    json!({
        "spec": {
            "template": {
                "metadata": {
                    "labels": { restart_label: marker }
                }
            }
        }
    })
}

#[async_trait]
impl WorkloadNotifier for KubeWorkloadNotifier {
    async fn get(&self, name: &str, namespace: &str) -> Result<Option<WorkloadDescriptor>, StoreError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = api
            .get_opt(name)
            .await
            .map_err(|e| store_error(KIND, format!("{namespace}/{name}"), "get", e))?;
        Ok(deployment.map(|d| describe(&d, &self.restart_label)))
    }

    async fn trigger_restart(&self, workload: &WorkloadDescriptor, marker: &str) -> Result<(), StoreError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &workload.namespace);
        let patch = restart_patch(&self.restart_label, marker);
        api.patch(&workload.name, &PatchParams::default(), &Patch::Strategic(&patch))
            .await
            .map_err(|e| {
                store_error(
                    KIND,
                    format!("{}/{}", workload.namespace, workload.name),
                    "restart",
                    e,
                )
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_patch_targets_pod_template_labels() {
        assert_eq!(
            restart_patch("credentials-rotator-redeployed", "1700000000"),
            json!({"spec": {"template": {"metadata": {"labels": {
                "credentials-rotator-redeployed": "1700000000"
            }}}}})
        );
    }

    #[test]
    fn describe_reads_replicas_and_current_marker() {
        let deployment: Deployment = serde_json::from_value(json!({
            "metadata": {"name": "web", "namespace": "apps"},
            "spec": {
                "replicas": 3,
                "selector": {"matchLabels": {"app": "web"}},
                "template": {
                    "metadata": {"labels": {"app": "web", "credentials-rotator-redeployed": "42"}},
                    "spec": {"containers": []}
                }
            }
        }))
        .unwrap();

        let workload = describe(&deployment, "credentials-rotator-redeployed");
        assert_eq!(workload.name, "web");
        assert_eq!(workload.namespace, "apps");
        assert_eq!(workload.replicas, Some(3));
        assert_eq!(workload.restart_marker.as_deref(), Some("42"));
    }
}
