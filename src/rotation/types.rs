// Core types for the credential rotation state machine

use std::collections::BTreeMap;
use std::fmt;

use crate::rotation::phase::Phase;

/// Namespace-qualified identity of a rotation request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// What to rotate and who consumes it. Supplied by the operator, never
/// written by the engine.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RotationSpec {
    /// API key used to authenticate with the credential issuer
    pub issuer_api_key: String,
    /// Remote resource whose credential is rotated
    pub resource_id: String,
    /// Address consumers use to reach the resource
    pub destination_url: String,
    /// Consumer workload restarted after the credential changes
    pub workload_name: String,
    /// Namespace of the consumer workload and of its credential record
    pub workload_namespace: String,
}

impl fmt::Debug for RotationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotationSpec")
            .field("issuer_api_key", &"<redacted>")
            .field("resource_id", &self.resource_id)
            .field("destination_url", &self.destination_url)
            .field("workload_name", &self.workload_name)
            .field("workload_namespace", &self.workload_namespace)
            .finish()
    }
}

/// Engine-owned progress of one rotation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationStatus {
    pub phase: Phase,
    /// Credential retired in the DELETING phase
    pub previous_credential_id: Option<String>,
    /// Token identifying the current rotation lifecycle, minted on leaving PENDING
    pub rotation_id: Option<String>,
}

impl RotationStatus {
    /// Copy of this status moved to `phase`
    pub fn advanced_to(&self, phase: Phase) -> Self {
        Self {
            phase,
            ..self.clone()
        }
    }
}

/// A desired rotation as loaded from the request store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationRequest {
    pub key: ObjectKey,
    /// Store-assigned unique id, used to reference the request in events
    pub uid: Option<String>,
    /// Version observed at load time; status writes are conditional on it
    pub resource_version: Option<String>,
    pub spec: RotationSpec,
    pub status: RotationStatus,
}

/// A credential freshly minted by the issuer
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    pub id: String,
    pub name: String,
    pub api_key: String,
}

impl fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Result of asking the issuer to delete a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The credential did not exist any more
    AlreadyGone,
}

/// Which rotation last wrote a credential record, and what it replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationMarker {
    pub rotation_id: String,
    pub previous_credential_id: Option<String>,
}

/// Consumer-facing record of the active credential for a namespace
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialRecord {
    pub namespace: String,
    pub name: String,
    pub destination_url: String,
    pub api_key: String,
    pub credential_id: String,
    /// Unix seconds of the last credential change
    pub modified_at: Option<i64>,
    pub labels: BTreeMap<String, String>,
    pub marker: Option<RotationMarker>,
    /// Store version for conditional updates
    pub version: Option<String>,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("destination_url", &self.destination_url)
            .field("api_key", &"<redacted>")
            .field("credential_id", &self.credential_id)
            .field("modified_at", &self.modified_at)
            .field("labels", &self.labels)
            .field("marker", &self.marker)
            .field("version", &self.version)
            .finish()
    }
}

/// A consumer workload as seen by the notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadDescriptor {
    pub name: String,
    pub namespace: String,
    pub replicas: Option<i32>,
    /// Value of the restart marker currently on the workload, if any
    pub restart_marker: Option<String>,
}

/// What the dispatcher should do after an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Progress was persisted, invoke again right away
    Requeue,
    /// Nothing persisted because of a concurrent write, retry after the default backoff
    Backoff,
    /// Terminal or unrecognized phase, wait for an external change
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Normal => "Normal",
            EventKind::Warning => "Warning",
        }
    }
}

/// Audit observation attached to a rotation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationEvent {
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
}

impl RotationEvent {
    pub const PHASE_CHANGE: &'static str = "PhaseChange";
    pub const ROTATION_FAILED: &'static str = "RotationFailed";

    pub fn phase_change(phase: &Phase) -> Self {
        Self {
            kind: EventKind::Normal,
            reason: Self::PHASE_CHANGE.to_string(),
            message: phase.as_str().to_string(),
        }
    }

    pub fn failure(phase: &Phase, error: &dyn std::error::Error) -> Self {
        Self {
            kind: EventKind::Warning,
            reason: Self::ROTATION_FAILED.to_string(),
            message: format!("{}: {}", phase.as_str(), error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_displays_as_namespace_slash_name() {
        assert_eq!(ObjectKey::new("team-a", "rotate-db").to_string(), "team-a/rotate-db");
    }

    #[test]
    fn debug_output_never_contains_secrets() {
        let spec = RotationSpec {
            issuer_api_key: "super-secret".to_string(),
            resource_id: "svc-123".to_string(),
            ..Default::default()
        };
        let credential = IssuedCredential {
            id: "cred-abc".to_string(),
            name: "creds_for_svc_20240101000000".to_string(),
            api_key: "also-secret".to_string(),
        };
        let record = CredentialRecord {
            api_key: "record-secret".to_string(),
            ..Default::default()
        };

        assert!(!format!("{spec:?}").contains("super-secret"));
        assert!(!format!("{credential:?}").contains("also-secret"));
        assert!(!format!("{record:?}").contains("record-secret"));
        assert!(format!("{credential:?}").contains("cred-abc"));
    }

    #[test]
    fn advanced_status_keeps_rotation_bookkeeping() {
        let status = RotationStatus {
            phase: Phase::Creating,
            previous_credential_id: Some("cred-old".to_string()),
            rotation_id: Some("rot-1".to_string()),
        };
        let next = status.advanced_to(Phase::Notifying);
        assert_eq!(next.phase, Phase::Notifying);
        assert_eq!(next.previous_credential_id.as_deref(), Some("cred-old"));
        assert_eq!(next.rotation_id.as_deref(), Some("rot-1"));
    }
}
