use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status shared by every reconciled resource: a state, the
/// reason the resource entered it, and an optional human readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status<S, R> {
    pub state: S,
    pub reason: R,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_transition_time: DateTime<Utc>,
}

impl<S, R> Status<S, R> {
    #[inline]
    #[must_use]
    pub fn new(state: S, reason: R, message: Option<String>) -> Self {
        Self {
            state,
            reason,
            message,
            last_transition_time: Utc::now(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_message(state: S, reason: R, message: impl Into<String>) -> Self {
        Self::new(state, reason, Some(message.into()))
    }

    /// Override the transition timestamp.
    #[inline]
    #[must_use]
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.last_transition_time = time;
        self
    }
}
