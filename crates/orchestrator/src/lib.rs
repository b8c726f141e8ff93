//! Orchestrator - reconciliation of scans, asset scans and estimations
//!
//! Every resource type is driven by a watcher: a [`Poller`] lists the
//! resources that still need work and feeds a deduplicating [`Queue`],
//! and a [`Reconciler`] drains it, running one timeout-bounded reconcile
//! per resource at a time.

pub mod config;
pub mod discoverer;
pub mod error;
pub mod event;
mod orchestrator;
pub mod poller;
pub mod queue;
pub mod reconciler;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use config::{DeleteJobPolicy, OrchestratorConfig, ReconcileSettings, ScannerConfig};
pub use discoverer::{AssetDiscoverer, DiscoveryReport};
pub use error::{QueueError, ReconcileError, ReconcileResult};
pub use event::ReconcileEvent;
pub use orchestrator::{Controller, Orchestrator};
pub use poller::{ItemSource, Poller};
pub use queue::{Enqueuer, Queue};
pub use reconciler::{Reconcile, Reconciler};
