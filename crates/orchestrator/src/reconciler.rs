//! Timeout-bounded consumer draining a watcher's queue

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::event::ReconcileEvent;
use crate::queue::Queue;

/// Resource specific reconcile step.
#[async_trait]
pub trait Reconcile<E>: Send + Sync {
    async fn reconcile(&self, event: E) -> ReconcileResult;
}

pub struct Reconciler<E> {
    name: &'static str,
    handler: Arc<dyn Reconcile<E>>,
    queue: Queue<E>,
    reconcile_timeout: Duration,
    workers: usize,
}

impl<E: ReconcileEvent> Reconciler<E> {
    pub fn new(
        name: &'static str,
        handler: Arc<dyn Reconcile<E>>,
        queue: Queue<E>,
        reconcile_timeout: Duration,
    ) -> Self {
        Self {
            name,
            handler,
            queue,
            reconcile_timeout,
            workers: 1,
        }
    }

    /// Number of items reconciled concurrently. Distinct items only: the
    /// queue never hands out an item that is still processing.
    #[inline]
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn start(self, token: CancellationToken) -> Vec<JoinHandle<()>> {
        let workers = self.workers;
        let this = Arc::new(self);
        (0..workers)
            .map(|worker| {
                let this = Arc::clone(&this);
                let token = token.clone();
                tokio::spawn(async move { this.run(worker, token).await })
            })
            .collect()
    }

    #[instrument(skip(self, token), fields(controller = self.name))]
    async fn run(&self, worker: usize, token: CancellationToken) {
        loop {
            let item = match self.queue.dequeue(&token).await {
                Ok(item) => item,
                Err(err) => {
                    debug!("Reconciler stopped: {}", err);
                    return;
                }
            };

            // the processing mark is left behind on shutdown
            let result = tokio::select! {
                _ = token.cancelled() => {
                    debug!("Reconcile of {} interrupted by shutdown", item);
                    return;
                }
                result = tokio::time::timeout(
                    self.reconcile_timeout,
                    self.handler.reconcile(item.clone()),
                ) => result,
            };

            match result {
                Ok(Ok(())) => self.queue.done(&item),
                Ok(Err(ReconcileError::RequeueAfter { after, reason })) => {
                    debug!("Requeue {} after {:?}: {}", item, after, reason);
                    self.queue.requeue_after(item, after);
                }
                Ok(Err(ReconcileError::Other(err))) => {
                    // picked up again by the next poll if still reconcilable
                    error!("Failed to reconcile item {}: {:#}", item, err);
                    self.queue.done(&item);
                }
                Err(_) => {
                    warn!(
                        "Reconcile of {} timed out after {:?}",
                        item, self.reconcile_timeout
                    );
                    self.queue.done(&item);
                }
            }
        }
    }
}
