//! Errors surfaced by the reconciliation loop

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("failed to get item: operation cancelled")]
    Cancelled,
}

/// Outcome of a failed reconcile.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Expected not-ready condition; the item is queued again after `after`.
    #[error("requeue after {after:?}: {reason}")]
    RequeueAfter { after: Duration, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReconcileError {
    #[must_use]
    pub fn requeue_after(after: Duration, reason: impl Into<String>) -> Self {
        ReconcileError::RequeueAfter {
            after,
            reason: reason.into(),
        }
    }
}

pub type ReconcileResult = Result<(), ReconcileError>;
