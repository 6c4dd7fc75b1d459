use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters for rotation activity
#[derive(Debug, Default)]
pub struct RotationMetrics {
    pub reconciles: AtomicU64,
    pub phase_transitions: AtomicU64,
    pub credentials_created: AtomicU64,
    pub credentials_deleted: AtomicU64,
    pub restarts_triggered: AtomicU64,
    pub rotations_completed: AtomicU64,
    pub status_conflicts: AtomicU64,
    pub errors: AtomicU64,
}

impl RotationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reconcile(&self) {
        self.reconciles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition(&self) {
        self.phase_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_credential_created(&self) {
        self.credentials_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_credential_deleted(&self) {
        self.credentials_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restart(&self) {
        self.restarts_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rotation_completed(&self) {
        self.rotations_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.status_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> RotationStats {
        RotationStats {
            reconciles: self.reconciles.load(Ordering::Relaxed),
            phase_transitions: self.phase_transitions.load(Ordering::Relaxed),
            credentials_created: self.credentials_created.load(Ordering::Relaxed),
            credentials_deleted: self.credentials_deleted.load(Ordering::Relaxed),
            restarts_triggered: self.restarts_triggered.load(Ordering::Relaxed),
            rotations_completed: self.rotations_completed.load(Ordering::Relaxed),
            status_conflicts: self.status_conflicts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            reconciles = stats.reconciles,
            phase_transitions = stats.phase_transitions,
            credentials_created = stats.credentials_created,
            credentials_deleted = stats.credentials_deleted,
            restarts_triggered = stats.restarts_triggered,
            rotations_completed = stats.rotations_completed,
            status_conflicts = stats.status_conflicts,
            errors = stats.errors,
            "Rotation metrics"
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationStats {
    pub reconciles: u64,
    pub phase_transitions: u64,
    pub credentials_created: u64,
    pub credentials_deleted: u64,
    pub restarts_triggered: u64,
    pub rotations_completed: u64,
    pub status_conflicts: u64,
    pub errors: u64,
}

/// Time a phase handler and log its duration
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
    }
}
