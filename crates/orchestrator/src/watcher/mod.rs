//! Resource watchers
//!
//! Each watcher pairs a [`Poller`] and a [`Reconciler`] over its own queue
//! and holds the state machine for one resource type.

pub mod asset_scan;
pub mod asset_scan_estimation;
mod gc;
mod job_config;
pub mod scan;
pub mod scan_config;
pub mod scan_estimation;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ReconcileSettings;
use crate::event::ReconcileEvent;
use crate::poller::{ItemSource, Poller};
use crate::queue::Queue;
use crate::reconciler::{Reconcile, Reconciler};

pub use asset_scan::AssetScanWatcher;
pub use asset_scan_estimation::AssetScanEstimationWatcher;
pub use scan::ScanWatcher;
pub use scan_config::ScanConfigWatcher;
pub use scan_estimation::ScanEstimationWatcher;

/// Spawn the poller and reconciler tasks of a watcher on a fresh queue.
pub(crate) fn start_watcher<E, W>(
    name: &'static str,
    watcher: Arc<W>,
    settings: &ReconcileSettings,
    token: CancellationToken,
) -> Vec<JoinHandle<()>>
where
    E: ReconcileEvent,
    W: ItemSource<E> + Reconcile<E> + 'static,
{
    let queue = Queue::new();
    let poller = Poller::new(name, watcher.clone(), queue.clone(), settings.poll_period);
    let reconciler = Reconciler::new(name, watcher, queue, settings.reconcile_timeout)
        .with_workers(settings.workers);

    let mut handles = vec![poller.start(token.clone())];
    handles.extend(reconciler.start(token));
    handles
}

/// Run `futures` with at most `limit` in flight and wait for all of them.
pub(crate) async fn fan_out<I, F, T>(futures: I, limit: usize) -> Vec<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = T>,
{
    stream::iter(futures)
        .buffer_unordered(limit.max(1))
        .collect()
        .await
}

pub(crate) fn chrono_duration(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::days(36_500))
}

/// `time + duration`, saturating at the last representable instant.
pub(crate) fn saturating_add(time: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    ChronoDuration::from_std(duration)
        .ok()
        .and_then(|duration| time.checked_add_signed(duration))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
