use std::fmt::Display;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures reported by the request store, credential store and workload notifier
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write lost against a concurrent writer
    #[error("{kind} {key} was modified concurrently")]
    Conflict { kind: &'static str, key: String },

    #[error("{message}: {source}")]
    Backend {
        message: String,
        #[source]
        source: BoxError,
    },
}

impl StoreError {
    pub fn backend(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StoreError::Backend {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Failures reported by the remote credential issuer
#[derive(Debug, Error)]
pub enum IssuerError {
    #[error("authentication with the credential issuer failed: {0}")]
    Authentication(String),

    #[error("credential issuer answered HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("request to the credential issuer failed: {0}")]
    Transport(#[source] BoxError),

    #[error("credential issuer returned an unusable response: {0}")]
    MalformedResponse(String),

    #[error("credential issuer endpoint is invalid: {0}")]
    InvalidEndpoint(String),
}

/// Why one reconcile invocation did not complete its phase
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{operation} failed for {target}: {source}")]
    Store {
        operation: &'static str,
        target: String,
        #[source]
        source: StoreError,
    },

    #[error("{operation} failed for {target}: {source}")]
    Issuer {
        operation: &'static str,
        target: String,
        #[source]
        source: IssuerError,
    },

    /// The request spec cannot be acted upon until it is corrected
    #[error("rotation request {target} is invalid: {reason}")]
    InvalidRequest { target: String, reason: String },
}

impl ReconcileError {
    pub fn invalid_request(target: impl Display, reason: impl Into<String>) -> Self {
        ReconcileError::InvalidRequest {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_invalid_request(&self) -> bool {
        matches!(self, ReconcileError::InvalidRequest { .. })
    }

    pub fn operation(&self) -> Option<&'static str> {
        match self {
            ReconcileError::Store { operation, .. } | ReconcileError::Issuer { operation, .. } => {
                Some(*operation)
            }
            ReconcileError::InvalidRequest { .. } => None,
        }
    }
}

/// Attach the failing operation and its target to a collaborator error
pub(crate) trait OperationContext<T> {
    fn during(self, operation: &'static str, target: impl Display) -> Result<T, ReconcileError>;
}

impl<T> OperationContext<T> for Result<T, StoreError> {
    fn during(self, operation: &'static str, target: impl Display) -> Result<T, ReconcileError> {
        self.map_err(|source| ReconcileError::Store {
            operation,
            target: target.to_string(),
            source,
        })
    }
}

impl<T> OperationContext<T> for Result<T, IssuerError> {
    fn during(self, operation: &'static str, target: impl Display) -> Result<T, ReconcileError> {
        self.map_err(|source| ReconcileError::Issuer {
            operation,
            target: target.to_string(),
            source,
        })
    }
}
