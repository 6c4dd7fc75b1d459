// Shaping of the consumer-facing credential record

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::rotation::types::{CredentialRecord, IssuedCredential, RotationMarker};

pub const LABEL_NAME: &str = "name";
pub const LABEL_OWNER: &str = "owner";
pub const LABEL_MODIFIED_AT: &str = "modifiedAt";

/// Fixed identity of the records this system owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTemplate {
    pub record_name: String,
    pub name_label: String,
    pub owner_label: String,
}

impl Default for RecordTemplate {
    fn default() -> Self {
        Self {
            record_name: "cloudant".to_string(),
            name_label: "cloudant".to_string(),
            owner_label: "credential-rotator-controller".to_string(),
        }
    }
}

impl RecordTemplate {
    /// Build the first record for a namespace around a new credential
    pub fn shape(
        &self,
        namespace: &str,
        destination_url: &str,
        credential: &IssuedCredential,
        marker: Option<RotationMarker>,
        now: DateTime<Utc>,
    ) -> CredentialRecord {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_NAME.to_string(), self.name_label.clone());
        labels.insert(LABEL_OWNER.to_string(), self.owner_label.clone());

        let mut record = CredentialRecord {
            namespace: namespace.to_string(),
            name: self.record_name.clone(),
            destination_url: destination_url.to_string(),
            labels,
            ..Default::default()
        };
        apply_credential(&mut record, credential, marker, now);
        record
    }
}

/// Point an existing record at a new credential. The destination address and
/// any labels not owned by this system are left alone.
pub fn apply_credential(
    record: &mut CredentialRecord,
    credential: &IssuedCredential,
    marker: Option<RotationMarker>,
    now: DateTime<Utc>,
) {
    record.api_key = credential.api_key.clone();
    record.credential_id = credential.id.clone();
    record.modified_at = Some(now.timestamp());
    record
        .labels
        .insert(LABEL_MODIFIED_AT.to_string(), now.timestamp().to_string());
    record.marker = marker;
}

/// Credential to retire when `existing` is about to be overwritten.
///
/// If the record was already rewritten by an earlier attempt of the same
/// rotation, its current credential is one this rotation minted, so the id
/// captured by that attempt is carried forward instead.
pub fn previous_credential_id(
    existing: &CredentialRecord,
    rotation_id: Option<&str>,
) -> Option<String> {
    match (&existing.marker, rotation_id) {
        (Some(marker), Some(current)) if marker.rotation_id == current => {
            marker.previous_credential_id.clone()
        }
        _ => Some(existing.credential_id.clone()).filter(|id| !id.is_empty()),
    }
}

/// Human-readable, time-ordered credential name:
/// `<prefix><first dash-separated segment of the resource id>_<UTC YYYYMMDDHHMMSS>`
pub fn credential_name(prefix: &str, resource_id: &str, at: DateTime<Utc>) -> String {
    let short_id = resource_id.split('-').next().unwrap_or(resource_id);
    format!("{}{}_{}", prefix, short_id, at.format("%Y%m%d%H%M%S"))
}
