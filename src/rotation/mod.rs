// Rotation Module - Resumable Credential Rotation State Machine
//
// Each reconcile call performs the work of exactly one phase against injected
// collaborators and persists the next phase, so a rotation can be resumed
// from its stored status after any interruption.

pub mod engine;
pub mod errors;
pub mod phase;
pub mod record;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod mocks;


pub use engine::{Reconciler, RotationSettings};
pub use errors::{IssuerError, ReconcileError, StoreError};
pub use phase::Phase;
pub use record::RecordTemplate;
pub use traits::{CredentialIssuer, CredentialStore, EventSink, IssuerSession, RequestStore, WorkloadNotifier};
pub use types::{
    CredentialRecord, DeleteOutcome, EventKind, IssuedCredential, ObjectKey, ReconcileAction,
    RotationEvent, RotationMarker, RotationRequest, RotationSpec, RotationStatus,
    WorkloadDescriptor,
};
