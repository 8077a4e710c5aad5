use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    gateway::GatewayError,
    model::{CollectionKey, ServerId},
    navigation::{AbortError, ApplyError, PlanError},
};

/// Failures reported by the synchronisation core to its callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Backend unreachable, non-success status, or a malformed response.
    #[error("network failure: {}", reason.as_deref().unwrap_or("no reason given"))]
    NetworkFailure {
        /// Human readable reason, when one is available.
        reason: Option<String>,
    },
    /// Payload rejected, either locally or by the backend.
    #[error("validation failure: {}", reason.as_deref().unwrap_or("no reason given"))]
    ValidationFailure {
        /// Human readable reason, when one is available.
        reason: Option<String>,
    },
    /// A fetch response listed the same backend id twice.
    #[error("duplicate identity {id} in fetch response for {collection}")]
    DuplicateIdentity {
        /// Collection whose fetch violated uniqueness.
        collection: CollectionKey,
        /// Identity listed more than once.
        id: ServerId,
    },
}

impl SyncError {
    /// Network failure carrying a reason.
    pub fn network(reason: impl Into<String>) -> Self {
        SyncError::NetworkFailure {
            reason: Some(reason.into()),
        }
    }

    /// Validation failure carrying a reason.
    pub fn validation(reason: impl Into<String>) -> Self {
        SyncError::ValidationFailure {
            reason: Some(reason.into()),
        }
    }
}

impl From<GatewayError> for SyncError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Network { reason } => SyncError::NetworkFailure { reason },
            GatewayError::Rejected { reason } => SyncError::ValidationFailure { reason },
            GatewayError::Malformed { reason } => SyncError::network(format!(
                "malformed response: {reason}"
            )),
            GatewayError::Unsupported { kind, operation } => {
                SyncError::network(format!("backend cannot {operation} {kind} records"))
            }
        }
    }
}

impl From<ValidationErrors> for SyncError {
    fn from(err: ValidationErrors) -> Self {
        SyncError::validation(format!("validation failed: {}", err))
    }
}

/// Failures of session-level operations (navigation plus synchronisation).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The synchronisation core reported a failure.
    #[error(transparent)]
    Sync(#[from] SyncError),
    /// Operation cannot be performed from the current view.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl From<PlanError> for SessionError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyPending => {
                SessionError::InvalidState("view transition already pending".into())
            }
            PlanError::InvalidTransition(invalid) => {
                SessionError::InvalidState(invalid.to_string())
            }
        }
    }
}

impl From<ApplyError> for SessionError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::NoPending => SessionError::InvalidState("no transition is pending".into()),
            ApplyError::IdMismatch { .. } => {
                SessionError::InvalidState("pending transition does not match".into())
            }
            ApplyError::VersionMismatch { expected, actual } => {
                SessionError::InvalidState(format!(
                    "view version mismatch during transition (expected {expected}, got {actual})"
                ))
            }
        }
    }
}

impl From<AbortError> for SessionError {
    fn from(err: AbortError) -> Self {
        match err {
            AbortError::NoPending => SessionError::InvalidState("no pending transition".into()),
            AbortError::IdMismatch { .. } => {
                SessionError::InvalidState("transition plan does not match".into())
            }
        }
    }
}
