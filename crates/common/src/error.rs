//! Error types shared by the orchestrator and its collaborators
//!
//! Backend errors are typed so callers can tell a missing or conflicting
//! resource apart from a transport failure. Provider errors carry the
//! fatal / retryable classification the watchers act on.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by a [`Backend`](crate::traits::Backend) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    /// The resource already exists; `id` names the pre-existing record.
    #[error("{kind} conflicts with existing resource {id}")]
    Conflict { kind: &'static str, id: Uuid },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl BackendError {
    #[inline]
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }

    /// Id of the already existing resource when this is a conflict.
    #[inline]
    #[must_use]
    pub const fn conflicting_id(&self) -> Option<Uuid> {
        match self {
            BackendError::Conflict { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors returned by a [`Provider`](crate::traits::Provider).
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The operation can never succeed as configured.
    #[error("{0}")]
    Fatal(String),

    /// The operation is not ready yet and should be attempted again later.
    #[error("{message} (retry after {retry_after:?})")]
    Retryable {
        message: String,
        retry_after: Duration,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProviderError {
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        ProviderError::Fatal(message.into())
    }

    #[must_use]
    pub fn retryable(message: impl Into<String>, retry_after: Duration) -> Self {
        ProviderError::Retryable {
            message: message.into(),
            retry_after,
        }
    }
}

/// Result type alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Returned when two asset descriptions cannot be merged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot merge {left} with {right}")]
pub struct MergeError {
    pub left: String,
    pub right: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_exposes_existing_id() {
        let id = Uuid::new_v4();
        let err = BackendError::Conflict { kind: "AssetScan", id };
        assert_eq!(err.conflicting_id(), Some(id));
        assert!(!err.is_not_found());
    }

    #[test]
    fn retryable_message_includes_delay() {
        let err = ProviderError::retryable("volume attaching", Duration::from_secs(5));
        assert!(err.to_string().contains("volume attaching"));
    }
}
