//! Garbage collection of finished estimations

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::saturating_add;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GcAction {
    /// First time seen finished: store the deadline and keep the resource.
    Persist {
        end_time: DateTime<Utc>,
        ttl_seconds: u64,
        delete_after: DateTime<Utc>,
    },
    Delete,
    Wait,
}

/// Decide what to do with a finished estimation at `now`.
pub(crate) fn evaluate(
    end_time: Option<DateTime<Utc>>,
    ttl_seconds: Option<u64>,
    delete_after: Option<DateTime<Utc>>,
    default_ttl: Duration,
    now: DateTime<Utc>,
) -> GcAction {
    let deadline = match delete_after {
        Some(deadline) => deadline,
        None => {
            let end_time = end_time.unwrap_or(now);
            let ttl_seconds = ttl_seconds.unwrap_or(default_ttl.as_secs());
            let delete_after = saturating_add(end_time, Duration::from_secs(ttl_seconds));
            if delete_after >= now {
                return GcAction::Persist {
                    end_time,
                    ttl_seconds,
                    delete_after,
                };
            }
            delete_after
        }
    };

    if now > deadline {
        GcAction::Delete
    } else {
        GcAction::Wait
    }
}
