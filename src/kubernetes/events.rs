use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{Api, PostParams};
use kube::{Client, Resource};
use tracing::warn;

use super::crd::CredentialRotator;
use crate::rotation::{EventSink, RotationEvent, RotationRequest};

/// Publishes rotation events as core/v1 Events on the rotator object
#[derive(Clone)]
pub struct KubeEventSink {
    client: Client,
    reporter: String,
    instance: String,
}

impl KubeEventSink {
    pub fn new(client: Client, reporter: impl Into<String>) -> Self {
        let instance = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            client,
            reporter: reporter.into(),
            instance,
        }
    }
}

pub fn build_event(
    request: &RotationRequest,
    event: &RotationEvent,
    reporter: &str,
    instance: &str,
    now: DateTime<Utc>,
) -> Event {
    Event {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", request.key.name)),
            namespace: Some(request.key.namespace.clone()),
            ..Default::default()
        },
        involved_object: ObjectReference {
            api_version: Some(CredentialRotator::api_version(&()).into_owned()),
            kind: Some(CredentialRotator::kind(&()).into_owned()),
            name: Some(request.key.name.clone()),
            namespace: Some(request.key.namespace.clone()),
            uid: request.uid.clone(),
            resource_version: request.resource_version.clone(),
            ..Default::default()
        },
        reason: Some(event.reason.clone()),
        message: Some(event.message.clone()),
        type_: Some(event.kind.as_str().to_string()),
        count: Some(1),
        first_timestamp: Some(Time(now)),
        last_timestamp: Some(Time(now)),
        source: Some(EventSource {
            component: Some(reporter.to_string()),
            host: Some(instance.to_string()),
        }),
        reporting_component: Some(reporter.to_string()),
        reporting_instance: Some(instance.to_string()),
        action: Some("Reconcile".to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn record(&self, request: &RotationRequest, event: RotationEvent) {
        let api: Api<Event> = Api::namespaced(self.client.clone(), &request.key.namespace);
        let object = build_event(request, &event, &self.reporter, &self.instance, Utc::now());
        if let Err(e) = api.create(&PostParams::default(), &object).await {
            warn!(
                error = %e,
                reason = %event.reason,
                request = %request.key,
                "Failed to publish rotation event"
            );
        }
    }
}
