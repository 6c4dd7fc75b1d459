// Reconciliation engine - performs exactly one phase of a rotation per invocation

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn, Instrument};

use crate::observability::{OperationTimer, RotationMetrics};
use crate::rotation::errors::{OperationContext, ReconcileError, StoreError};
use crate::rotation::phase::Phase;
use crate::rotation::record::{self, RecordTemplate};
use crate::rotation::traits::*;
use crate::rotation::types::*;
use crate::telemetry::{create_reconcile_span, generate_correlation_id};

/// Fixed parameters of every rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationSettings {
    /// Role granted to newly created credentials
    pub key_role: String,
    pub key_name_prefix: String,
    pub record: RecordTemplate,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            key_role: "Manager".to_string(),
            key_name_prefix: "creds_for_".to_string(),
            record: RecordTemplate::default(),
        }
    }
}

/// Drives rotation requests through PENDING -> CREATING -> NOTIFYING -> DELETING -> DONE.
///
/// All state lives in the request status; the engine reloads it on every
/// invocation and keeps nothing in memory between calls, so any invocation
/// may be repeated after a crash.
pub struct Reconciler {
    requests: Arc<dyn RequestStore>,
    issuer: Arc<dyn CredentialIssuer>,
    records: Arc<dyn CredentialStore>,
    workloads: Arc<dyn WorkloadNotifier>,
    events: Arc<dyn EventSink>,
    settings: RotationSettings,
    metrics: Arc<RotationMetrics>,
}

impl Reconciler {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        issuer: Arc<dyn CredentialIssuer>,
        records: Arc<dyn CredentialStore>,
        workloads: Arc<dyn WorkloadNotifier>,
        events: Arc<dyn EventSink>,
        settings: RotationSettings,
    ) -> Self {
        Self {
            requests,
            issuer,
            records,
            workloads,
            events,
            settings,
            metrics: Arc::new(RotationMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RotationMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<RotationMetrics> {
        &self.metrics
    }

    /// Perform one step of the rotation identified by `key`.
    ///
    /// A phase that completes is persisted before returning. Errors leave the
    /// stored status untouched and should be retried after a backoff.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileAction, ReconcileError> {
        let correlation_id = generate_correlation_id();
        let span = create_reconcile_span(key, &correlation_id);
        self.reconcile_once(key).instrument(span).await
    }

    async fn reconcile_once(&self, key: &ObjectKey) -> Result<ReconcileAction, ReconcileError> {
        self.metrics.record_reconcile();
        info!("Reconciling rotation request");

        let request = match self.requests.get(key).await.during("load rotation request", key)? {
            Some(request) => request,
            None => {
                debug!("Rotation request no longer exists");
                return Ok(ReconcileAction::Stop);
            }
        };

        let phase = request.status.phase.clone();
        tracing::Span::current().record("phase", phase.as_str());

        let timer = OperationTimer::new(phase.as_str());
        let outcome = self.step(&request).await;
        timer.finish();

        let status = match outcome {
            Ok(Some(status)) => status,
            Ok(None) => return Ok(ReconcileAction::Stop),
            Err(err) => {
                self.metrics.record_error();
                error!(error = %err, "Phase {} failed", phase);
                self.events
                    .record(&request, RotationEvent::failure(&phase, &err))
                    .await;
                return Err(err);
            }
        };

        match self.requests.update_status(&request, &status).await {
            Ok(()) => {
                self.metrics.record_transition();
                if status.phase.is_terminal() {
                    self.metrics.record_rotation_completed();
                }
                info!(from = %phase, to = %status.phase, "Phase advanced");
                Ok(ReconcileAction::Requeue)
            }
            Err(StoreError::Conflict { kind, key: conflicting }) => {
                self.metrics.record_conflict();
                warn!(
                    kind,
                    key = %conflicting,
                    "Rotation request changed while reconciling; retrying from fresh state"
                );
                Ok(ReconcileAction::Backoff)
            }
            Err(source) => {
                self.metrics.record_error();
                Err(ReconcileError::Store {
                    operation: "persist rotation status",
                    target: key.to_string(),
                    source,
                })
            }
        }
    }

    /// Run the work of the current phase. `Ok(None)` means there is nothing to
    /// persist and the request should not be requeued.
    ///
    /// Handlers only update the status fields they own; the phase written back
    /// is always `Phase::next` of the one that was loaded.
    async fn step(&self, request: &RotationRequest) -> Result<Option<RotationStatus>, ReconcileError> {
        let phase = &request.status.phase;
        let status = match phase {
            Phase::Pending => self.begin_rotation(request).await,
            Phase::Creating => self.create_credential(request).await?,
            Phase::Notifying => self.notify_workload(request).await?,
            Phase::Deleting => self.delete_previous_credential(request).await?,
            Phase::Done => {
                self.observe(request, phase).await;
                info!("Rotation complete");
                return Ok(None);
            }
            Phase::Unrecognized(raw) => {
                info!(phase = %raw, "Unrecognized phase, nothing to do");
                return Ok(None);
            }
        };

        Ok(phase.next().map(|next| status.advanced_to(next)))
    }

    async fn observe(&self, request: &RotationRequest, phase: &Phase) {
        info!("Phase: {}", phase);
        self.events
            .record(request, RotationEvent::phase_change(phase))
            .await;
    }

    /// PENDING: start a new rotation lifecycle
    async fn begin_rotation(&self, request: &RotationRequest) -> RotationStatus {
        self.observe(request, &Phase::Pending).await;

        let rotation_id = generate_correlation_id();
        debug!(rotation_id = %rotation_id, "Starting rotation");
        RotationStatus {
            phase: request.status.phase.clone(),
            previous_credential_id: None,
            rotation_id: Some(rotation_id),
        }
    }

    /// CREATING: mint a credential and store it in the consumer's record
    async fn create_credential(&self, request: &RotationRequest) -> Result<RotationStatus, ReconcileError> {
        self.observe(request, &Phase::Creating).await;

        let spec = &request.spec;
        require(request, "userAPIKey", &spec.issuer_api_key)?;
        require(request, "serviceGUID", &spec.resource_id)?;
        require(request, "appNameSpace", &spec.workload_namespace)?;

        let session = self
            .issuer
            .authenticate(&spec.issuer_api_key)
            .await
            .during("authenticate with credential issuer", &request.key)?;

        let now = Utc::now();
        let name = record::credential_name(&self.settings.key_name_prefix, &spec.resource_id, now);
        let credential = session
            .create_credential(&spec.resource_id, &name, &self.settings.key_role)
            .await
            .during("create credential", &spec.resource_id)?;
        self.metrics.record_credential_created();
        info!(credential_id = %credential.id, credential_name = %name, "Credential created");

        let mut status = request.status.clone();
        let record_name = &self.settings.record.record_name;
        let namespace = &spec.workload_namespace;
        let target = format!("{namespace}/{record_name}");

        match self
            .records
            .get(namespace, record_name)
            .await
            .during("read credential record", &target)?
        {
            None => {
                let marker = status.rotation_id.clone().map(|rotation_id| RotationMarker {
                    rotation_id,
                    previous_credential_id: None,
                });
                let record = self.settings.record.shape(
                    namespace,
                    &spec.destination_url,
                    &credential,
                    marker,
                    now,
                );
                self.records
                    .create(&record)
                    .await
                    .during("create credential record", &target)?;
                status.previous_credential_id = None;
                info!(record = %target, "Credential record created");
            }
            Some(mut existing) => {
                let previous = record::previous_credential_id(&existing, status.rotation_id.as_deref());
                let marker = status.rotation_id.clone().map(|rotation_id| RotationMarker {
                    rotation_id,
                    previous_credential_id: previous.clone(),
                });
                record::apply_credential(&mut existing, &credential, marker, now);
                self.records
                    .update(&existing)
                    .await
                    .during("update credential record", &target)?;
                info!(record = %target, previous_credential_id = ?previous, "Credential record updated");
                status.previous_credential_id = previous;
            }
        }

        Ok(status)
    }

    /// NOTIFYING: restart the consumer so it loads the new credential
    async fn notify_workload(&self, request: &RotationRequest) -> Result<RotationStatus, ReconcileError> {
        self.observe(request, &Phase::Notifying).await;

        let spec = &request.spec;
        require(request, "appName", &spec.workload_name)?;
        require(request, "appNameSpace", &spec.workload_namespace)?;
        let target = format!("{}/{}", spec.workload_namespace, spec.workload_name);

        match self
            .workloads
            .get(&spec.workload_name, &spec.workload_namespace)
            .await
            .during("read workload", &target)?
        {
            None => info!(workload = %target, "No workload found, skipping restart"),
            Some(workload) => {
                debug!(
                    workload = %target,
                    replicas = ?workload.replicas,
                    previous_marker = ?workload.restart_marker,
                    "Workload found"
                );
                let marker = Utc::now().timestamp().to_string();
                self.workloads
                    .trigger_restart(&workload, &marker)
                    .await
                    .during("restart workload", &target)?;
                self.metrics.record_restart();
                info!(workload = %target, marker = %marker, "Workload restart triggered");
            }
        }

        Ok(request.status.clone())
    }

    /// DELETING: retire the credential that was replaced
    async fn delete_previous_credential(
        &self,
        request: &RotationRequest,
    ) -> Result<RotationStatus, ReconcileError> {
        self.observe(request, &Phase::Deleting).await;

        let previous = request
            .status
            .previous_credential_id
            .as_deref()
            .filter(|id| !id.is_empty());

        match previous {
            None => info!("No previous credential to delete"),
            Some(credential_id) => {
                let session = self
                    .issuer
                    .authenticate(&request.spec.issuer_api_key)
                    .await
                    .during("authenticate with credential issuer", &request.key)?;
                match session
                    .delete_credential(credential_id)
                    .await
                    .during("delete credential", credential_id)?
                {
                    DeleteOutcome::Deleted => {
                        self.metrics.record_credential_deleted();
                        info!(credential_id, "Previous credential deleted");
                    }
                    DeleteOutcome::AlreadyGone => {
                        info!(credential_id, "Previous credential was already deleted");
                    }
                }
            }
        }

        Ok(request.status.clone())
    }
}

fn require(request: &RotationRequest, field: &str, value: &str) -> Result<(), ReconcileError> {
    if value.trim().is_empty() {
        return Err(ReconcileError::invalid_request(
            &request.key,
            format!("spec.{field} must not be empty"),
        ));
    }
    Ok(())
}
