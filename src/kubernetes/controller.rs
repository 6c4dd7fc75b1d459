use anyhow::{Context as _, Result};
use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::crd::CredentialRotator;
use crate::config::{ControllerConfig, RotatorConfig};
use crate::observability::RotationMetrics;
use crate::rotation::{ObjectKey, ReconcileAction, ReconcileError, Reconciler};

/// How engine outcomes map onto controller requeues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub requeue_backoff: Duration,
    pub error_backoff: Duration,
    pub invalid_request_backoff: Duration,
}

impl From<&ControllerConfig> for ControllerSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            requeue_backoff: Duration::from_secs(config.requeue_backoff_seconds),
            error_backoff: Duration::from_secs(config.error_backoff_seconds),
            invalid_request_backoff: Duration::from_secs(config.invalid_request_backoff_seconds),
        }
    }
}

impl ControllerSettings {
    pub fn action_for(&self, action: ReconcileAction) -> Action {
        match action {
            ReconcileAction::Requeue => Action::requeue(Duration::ZERO),
            ReconcileAction::Backoff => Action::requeue(self.requeue_backoff),
            ReconcileAction::Stop => Action::await_change(),
        }
    }

    pub fn action_for_error(&self, error: &ReconcileError) -> Action {
        if error.is_invalid_request() {
            Action::requeue(self.invalid_request_backoff)
        } else {
            Action::requeue(self.error_backoff)
        }
    }
}

struct Context {
    reconciler: Reconciler,
    settings: ControllerSettings,
}

async fn reconcile(object: Arc<CredentialRotator>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let key = ObjectKey::new(object.namespace().unwrap_or_default(), object.name_any());
    let action = ctx.reconciler.reconcile(&key).await?;
    Ok(ctx.settings.action_for(action))
}

fn error_policy(object: Arc<CredentialRotator>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
    warn!(
        rotator = %object.name_any(),
        namespace = ?object.namespace(),
        error = %error,
        "Reconcile failed, scheduling retry"
    );
    ctx.settings.action_for_error(error)
}

/// Run the controller until SIGINT or SIGTERM
pub async fn run(client: Client, config: &RotatorConfig, metrics: Arc<RotationMetrics>) -> Result<()> {
    let rotators: Api<CredentialRotator> = match &config.controller.namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };
    rotators
        .list(&ListParams::default().limit(1))
        .await
        .context("CredentialRotator CRD is not queryable; is it installed?")?;

    let reconciler = super::build_reconciler(client, config)?.with_metrics(metrics.clone());
    let context = Arc::new(Context {
        reconciler,
        settings: ControllerSettings::from(&config.controller),
    });

    info!(
        namespace = config.controller.namespace.as_deref().unwrap_or("<all>"),
        "Starting credential rotator controller"
    );

    Controller::new(rotators, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(rotator = %object, "Reconciled"),
                Err(e) => debug!(error = %e, "Reconcile attempt did not complete"),
            }
        })
        .await;

    info!("Controller stopped");
    metrics.log_stats();
    Ok(())
}
