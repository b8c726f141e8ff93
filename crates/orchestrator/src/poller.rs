//! Periodic producer feeding a watcher's queue

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::event::ReconcileEvent;
use crate::queue::Queue;

/// Lists the resources that currently need reconciling.
#[async_trait]
pub trait ItemSource<E>: Send + Sync {
    async fn get_items(&self) -> anyhow::Result<Vec<E>>;
}

pub struct Poller<E> {
    name: &'static str,
    source: Arc<dyn ItemSource<E>>,
    queue: Queue<E>,
    poll_period: Duration,
}

impl<E: ReconcileEvent> Poller<E> {
    pub fn new(
        name: &'static str,
        source: Arc<dyn ItemSource<E>>,
        queue: Queue<E>,
        poll_period: Duration,
    ) -> Self {
        Self {
            name,
            source,
            queue,
            poll_period,
        }
    }

    /// Poll immediately, then once per period, until `token` is cancelled.
    pub fn start(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(token).await })
    }

    #[instrument(skip_all, fields(controller = self.name))]
    async fn run(self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.poll() => {}
            }
        }
        debug!("Poller stopped");
    }

    async fn poll(&self) {
        match self.source.get_items().await {
            Ok(items) => {
                debug!("Found {} reconcilable items", items.len());
                for item in items {
                    self.queue.enqueue(item);
                }
            }
            // retried on the next tick
            Err(err) => error!("Failed to get items: {:#}", err),
        }
    }
}
