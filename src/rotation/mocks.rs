// In-memory collaborators for testing - every external effect is journaled

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::rotation::engine::{Reconciler, RotationSettings};
use crate::rotation::errors::{IssuerError, StoreError};
use crate::rotation::phase::Phase;
use crate::rotation::traits::*;
use crate::rotation::types::*;

/// External effect observed by the fakes, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    CredentialCreated { id: String, name: String },
    CredentialDeleted { id: String },
    RecordCreated { namespace: String, credential_id: String },
    RecordUpdated { namespace: String, credential_id: String },
    WorkloadRestarted { namespace: String, name: String },
    StatusWritten { phase: Phase },
}

pub type Journal = Arc<Mutex<Vec<SideEffect>>>;

fn push(journal: &Journal, effect: SideEffect) {
    journal.lock().unwrap().push(effect);
}

fn simulated(message: &str) -> StoreError {
    StoreError::backend(message, std::io::Error::other("simulated outage"))
}

#[derive(Default)]
pub struct InMemoryRequestStore {
    requests: Mutex<HashMap<ObjectKey, RotationRequest>>,
    version: AtomicU64,
    failing_writes: AtomicUsize,
    journal: Journal,
}

impl InMemoryRequestStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn insert(&self, mut request: RotationRequest) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        request.resource_version = Some(version.to_string());
        self.requests
            .lock()
            .unwrap()
            .insert(request.key.clone(), request);
    }

    pub fn status(&self, key: &ObjectKey) -> Option<RotationStatus> {
        self.requests
            .lock()
            .unwrap()
            .get(key)
            .map(|request| request.status.clone())
    }

    /// Simulate an edit by someone else, bumping the stored version
    pub fn touch(&self, key: &ObjectKey) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(request) = self.requests.lock().unwrap().get_mut(key) {
            request.resource_version = Some(version.to_string());
        }
    }

    /// Fail the next `count` status writes, as if the process died before persisting
    pub fn fail_status_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<RotationRequest>, StoreError> {
        Ok(self.requests.lock().unwrap().get(key).cloned())
    }

    async fn update_status(
        &self,
        request: &RotationRequest,
        status: &RotationStatus,
    ) -> Result<(), StoreError> {
        if self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(simulated("write rotation status"));
        }

        let mut requests = self.requests.lock().unwrap();
        let stored = requests
            .get_mut(&request.key)
            .ok_or_else(|| simulated("rotation request not found"))?;
        if stored.resource_version != request.resource_version {
            return Err(StoreError::Conflict {
                kind: "CredentialRotator",
                key: request.key.to_string(),
            });
        }

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        stored.status = status.clone();
        stored.resource_version = Some(version.to_string());
        push(&self.journal, SideEffect::StatusWritten { phase: status.phase.clone() });
        Ok(())
    }
}

#[derive(Default)]
struct IssuerState {
    live: Mutex<BTreeMap<String, IssuedCredential>>,
    next_ids: Mutex<VecDeque<String>>,
    minted: AtomicU64,
    fail_create: AtomicBool,
    fail_authentication: AtomicBool,
    roles: Mutex<Vec<String>>,
    journal: Journal,
}

/// Issuer whose credentials live in memory
#[derive(Clone)]
pub struct InMemoryIssuer {
    state: Arc<IssuerState>,
}

impl InMemoryIssuer {
    pub fn new(journal: Journal) -> Self {
        Self {
            state: Arc::new(IssuerState {
                journal,
                ..Default::default()
            }),
        }
    }

    /// Ids handed out by subsequent creates, in order
    pub fn queue_ids(&self, ids: &[&str]) {
        self.state
            .next_ids
            .lock()
            .unwrap()
            .extend(ids.iter().map(|id| id.to_string()));
    }

    /// Register a credential that exists before the test starts
    pub fn seed(&self, id: &str) {
        self.state.live.lock().unwrap().insert(
            id.to_string(),
            IssuedCredential {
                id: id.to_string(),
                name: format!("seeded_{id}"),
                api_key: format!("apikey-{id}"),
            },
        );
    }

    pub fn live_ids(&self) -> Vec<String> {
        self.state.live.lock().unwrap().keys().cloned().collect()
    }

    pub fn roles_requested(&self) -> Vec<String> {
        self.state.roles.lock().unwrap().clone()
    }

    pub fn fail_creates(&self, fail: bool) {
        self.state.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn reject_authentication(&self, reject: bool) {
        self.state.fail_authentication.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialIssuer for InMemoryIssuer {
    async fn authenticate(&self, api_key: &str) -> Result<Box<dyn IssuerSession>, IssuerError> {
        if api_key.is_empty() || self.state.fail_authentication.load(Ordering::SeqCst) {
            return Err(IssuerError::Authentication("invalid api key".to_string()));
        }
        Ok(Box::new(InMemorySession {
            state: self.state.clone(),
        }))
    }
}

struct InMemorySession {
    state: Arc<IssuerState>,
}

#[async_trait]
impl IssuerSession for InMemorySession {
    async fn create_credential(
        &self,
        _resource_id: &str,
        name: &str,
        role: &str,
    ) -> Result<IssuedCredential, IssuerError> {
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(IssuerError::Api {
                status: 500,
                message: "simulated failure".to_string(),
            });
        }

        let id = self.state.next_ids.lock().unwrap().pop_front().unwrap_or_else(|| {
            let n = self.state.minted.fetch_add(1, Ordering::SeqCst) + 1;
            format!("cred-{n}")
        });
        let credential = IssuedCredential {
            id: id.clone(),
            name: name.to_string(),
            api_key: format!("apikey-{id}"),
        };
        self.state.roles.lock().unwrap().push(role.to_string());
        self.state
            .live
            .lock()
            .unwrap()
            .insert(id.clone(), credential.clone());
        push(
            &self.state.journal,
            SideEffect::CredentialCreated {
                id,
                name: name.to_string(),
            },
        );
        Ok(credential)
    }

    async fn delete_credential(&self, credential_id: &str) -> Result<DeleteOutcome, IssuerError> {
        let removed = self.state.live.lock().unwrap().remove(credential_id);
        push(
            &self.state.journal,
            SideEffect::CredentialDeleted {
                id: credential_id.to_string(),
            },
        );
        Ok(match removed {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::AlreadyGone,
        })
    }
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    records: Mutex<HashMap<(String, String), CredentialRecord>>,
    version: AtomicU64,
    journal: Journal,
}

impl InMemoryCredentialStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn insert(&self, mut record: CredentialRecord) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        record.version = Some(version.to_string());
        self.records
            .lock()
            .unwrap()
            .insert((record.namespace.clone(), record.name.clone()), record);
    }

    pub fn record(&self, namespace: &str, name: &str) -> Option<CredentialRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.record(namespace, name))
    }

    async fn create(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let key = (record.namespace.clone(), record.name.clone());
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&key) {
            return Err(StoreError::Conflict {
                kind: "Secret",
                key: format!("{}/{}", key.0, key.1),
            });
        }
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stored = record.clone();
        stored.version = Some(version.to_string());
        records.insert(key, stored);
        push(
            &self.journal,
            SideEffect::RecordCreated {
                namespace: record.namespace.clone(),
                credential_id: record.credential_id.clone(),
            },
        );
        Ok(())
    }

    async fn update(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let key = (record.namespace.clone(), record.name.clone());
        let mut records = self.records.lock().unwrap();
        let stored = records
            .get_mut(&key)
            .ok_or_else(|| simulated("credential record not found"))?;
        if stored.version != record.version {
            return Err(StoreError::Conflict {
                kind: "Secret",
                key: format!("{}/{}", key.0, key.1),
            });
        }
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        *stored = record.clone();
        stored.version = Some(version.to_string());
        push(
            &self.journal,
            SideEffect::RecordUpdated {
                namespace: record.namespace.clone(),
                credential_id: record.credential_id.clone(),
            },
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryWorkloads {
    workloads: Mutex<HashMap<(String, String), WorkloadDescriptor>>,
    journal: Journal,
}

impl InMemoryWorkloads {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn add(&self, namespace: &str, name: &str) {
        self.workloads.lock().unwrap().insert(
            (namespace.to_string(), name.to_string()),
            WorkloadDescriptor {
                name: name.to_string(),
                namespace: namespace.to_string(),
                replicas: Some(2),
                restart_marker: None,
            },
        );
    }

    pub fn workload(&self, namespace: &str, name: &str) -> Option<WorkloadDescriptor> {
        self.workloads
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl WorkloadNotifier for InMemoryWorkloads {
    async fn get(&self, name: &str, namespace: &str) -> Result<Option<WorkloadDescriptor>, StoreError> {
        Ok(self.workload(namespace, name))
    }

    async fn trigger_restart(&self, workload: &WorkloadDescriptor, marker: &str) -> Result<(), StoreError> {
        let mut workloads = self.workloads.lock().unwrap();
        let stored = workloads
            .get_mut(&(workload.namespace.clone(), workload.name.clone()))
            .ok_or_else(|| simulated("workload not found"))?;
        stored.restart_marker = Some(marker.to_string());
        push(
            &self.journal,
            SideEffect::WorkloadRestarted {
                namespace: workload.namespace.clone(),
                name: workload.name.clone(),
            },
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(ObjectKey, RotationEvent)>>,
}

impl RecordingEventSink {
    pub fn events(&self) -> Vec<RotationEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.reason).collect()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn record(&self, request: &RotationRequest, event: RotationEvent) {
        self.events.lock().unwrap().push((request.key.clone(), event));
    }
}

/// A complete set of collaborators sharing one journal
pub struct TestWorld {
    pub journal: Journal,
    pub requests: Arc<InMemoryRequestStore>,
    pub issuer: InMemoryIssuer,
    pub records: Arc<InMemoryCredentialStore>,
    pub workloads: Arc<InMemoryWorkloads>,
    pub events: Arc<RecordingEventSink>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    pub fn new() -> Self {
        let journal: Journal = Arc::default();
        Self {
            requests: Arc::new(InMemoryRequestStore::new(journal.clone())),
            issuer: InMemoryIssuer::new(journal.clone()),
            records: Arc::new(InMemoryCredentialStore::new(journal.clone())),
            workloads: Arc::new(InMemoryWorkloads::new(journal.clone())),
            events: Arc::new(RecordingEventSink::default()),
            journal,
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.requests.clone(),
            Arc::new(self.issuer.clone()),
            self.records.clone(),
            self.workloads.clone(),
            self.events.clone(),
            RotationSettings::default(),
        )
    }

    pub fn effects(&self) -> Vec<SideEffect> {
        self.journal.lock().unwrap().clone()
    }

    /// Effects other than status writes
    pub fn external_effects(&self) -> Vec<SideEffect> {
        self.effects()
            .into_iter()
            .filter(|effect| !matches!(effect, SideEffect::StatusWritten { .. }))
            .collect()
    }
}

pub fn spec(resource_id: &str, workload_name: &str, workload_namespace: &str) -> RotationSpec {
    RotationSpec {
        issuer_api_key: "issuer-api-key".to_string(),
        resource_id: resource_id.to_string(),
        destination_url: "https://db.example.com".to_string(),
        workload_name: workload_name.to_string(),
        workload_namespace: workload_namespace.to_string(),
    }
}

pub fn request(key: &ObjectKey, spec: RotationSpec, status: RotationStatus) -> RotationRequest {
    RotationRequest {
        key: key.clone(),
        uid: Some(format!("uid-{}", key.name)),
        resource_version: None,
        spec,
        status,
    }
}
