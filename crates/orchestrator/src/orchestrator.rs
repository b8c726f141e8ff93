// crates/orchestrator/src/orchestrator.rs
//! Orchestrator - controller startup and shutdown coordination

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use vajra_common::{Backend, Provider};

use crate::config::OrchestratorConfig;
use crate::discoverer::AssetDiscoverer;
use crate::watcher::{
    AssetScanEstimationWatcher, AssetScanWatcher, ScanConfigWatcher, ScanEstimationWatcher,
    ScanWatcher,
};

/// A long running component started by the [`Orchestrator`].
pub trait Controller: Send + Sync {
    fn name(&self) -> &'static str;

    /// Spawn the controller's tasks. They exit once `token` is cancelled.
    fn start(self: Arc<Self>, token: CancellationToken) -> Vec<JoinHandle<()>>;
}

/// Orchestrator owns the discoverer and the resource watchers and runs
/// them until stopped.
pub struct Orchestrator {
    controllers: Vec<Arc<dyn Controller>>,
    startup_delay: Duration,
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build every controller over the shared backend and provider.
    pub fn new(
        config: OrchestratorConfig,
        backend: Arc<dyn Backend>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        info!("Creating orchestrator for provider {}", provider.kind());
        let controllers: Vec<Arc<dyn Controller>> = vec![
            Arc::new(AssetDiscoverer::new(
                backend.clone(),
                provider.clone(),
                config.discovery,
            )),
            Arc::new(ScanConfigWatcher::new(backend.clone(), config.scan_config_watcher)),
            Arc::new(ScanWatcher::new(backend.clone(), config.scan_watcher)),
            Arc::new(AssetScanWatcher::new(
                backend.clone(),
                provider.clone(),
                config.asset_scan_watcher,
            )),
            Arc::new(ScanEstimationWatcher::new(
                backend.clone(),
                config.scan_estimation_watcher,
            )),
            Arc::new(AssetScanEstimationWatcher::new(
                backend,
                provider,
                config.asset_scan_estimation_watcher,
            )),
        ];

        Self::with_controllers(controllers, config.controller_startup_delay)
    }

    pub fn with_controllers(controllers: Vec<Arc<dyn Controller>>, startup_delay: Duration) -> Self {
        Self {
            controllers,
            startup_delay,
            token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start the controllers in order, waiting the startup delay between
    /// two of them. Returns early if the orchestrator is stopped meanwhile.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        for (i, controller) in self.controllers.iter().enumerate() {
            if i > 0 && !self.startup_delay.is_zero() {
                tokio::select! {
                    _ = self.token.cancelled() => return,
                    _ = tokio::time::sleep(self.startup_delay) => {}
                }
            }
            if self.token.is_cancelled() {
                return;
            }

            info!("Starting {}", controller.name());
            let handles = controller.clone().start(self.token.child_token());
            self.handles.lock().extend(handles);
        }
        info!("All {} controllers started", self.controllers.len());
    }

    /// Cancel every controller and wait for their tasks to exit.
    pub async fn stop(&self) {
        info!("Stopping orchestrator");
        self.token.cancel();

        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                warn!("Controller task failed: {}", err);
            }
        }
        info!("Orchestrator stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn controller_names(&self) -> Vec<&'static str> {
        self.controllers.iter().map(|c| c.name()).collect()
    }
}
