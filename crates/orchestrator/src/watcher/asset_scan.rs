// crates/orchestrator/src/watcher/asset_scan.rs
//! AssetScan state machine: admission control, scanner provisioning,
//! abort timeout and resource cleanup.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use vajra_common::query::{AssetScanFilter, AssetScanPatch, StateFilter};
use vajra_common::{
    AssetScan, AssetScanReason, AssetScanState, Backend, Provider, ProviderError,
    ResourceCleanupReason, ResourceCleanupState, ScanJobConfig, Status,
};

use super::job_config::new_scan_job_config;
use super::{saturating_add, start_watcher};
use crate::config::{AssetScanWatcherConfig, DeleteJobPolicy, DEFAULT_PROVISIONING_DELAY};
use crate::error::{ReconcileError, ReconcileResult};
use crate::event::AssetScanReconcileEvent;
use crate::orchestrator::Controller;
use crate::poller::ItemSource;
use crate::reconciler::Reconcile;

const CONTROLLER: &str = "AssetScanWatcher";

pub struct AssetScanWatcher {
    backend: Arc<dyn Backend>,
    provider: Arc<dyn Provider>,
    config: AssetScanWatcherConfig,
}

impl AssetScanWatcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        provider: Arc<dyn Provider>,
        config: AssetScanWatcherConfig,
    ) -> Self {
        Self {
            backend,
            provider,
            config,
        }
    }

    async fn patch(&self, asset_scan_id: Uuid, patch: AssetScanPatch) -> anyhow::Result<()> {
        self.backend
            .patch_asset_scan(asset_scan_id, patch)
            .await
            .with_context(|| format!("failed to patch AssetScan. AssetScanID={}", asset_scan_id))
    }

    async fn job_config(&self, asset_scan: &AssetScan) -> anyhow::Result<ScanJobConfig> {
        let asset = self
            .backend
            .get_asset(asset_scan.asset_id)
            .await
            .with_context(|| format!("failed to fetch Asset. AssetID={}", asset_scan.asset_id))?;
        new_scan_job_config(&self.config.scanner, asset_scan, asset)
    }

    async fn reconcile_pending(&self, asset_scan: &AssetScan) -> ReconcileResult {
        let scan = self
            .backend
            .get_scan(asset_scan.scan_id)
            .await
            .with_context(|| format!("failed to fetch Scan. ScanID={}", asset_scan.scan_id))?;

        if let Some(max_parallel) = scan.max_parallel_scanners {
            // jobs holding a scanner slot: past Pending and not yet cleaned up
            let filter = AssetScanFilter {
                scan_id: Some(scan.id),
                states: StateFilter::NotIn(vec![
                    AssetScanState::Pending,
                    AssetScanState::Done,
                    AssetScanState::Failed,
                ]),
                cleanup_states: StateFilter::In(vec![ResourceCleanupState::Pending]),
                ..Default::default()
            };
            let running = self
                .backend
                .list_asset_scans(&filter)
                .await
                .with_context(|| format!("failed to count running AssetScans. ScanID={}", scan.id))?;

            if running.len() >= max_parallel as usize {
                debug!(
                    "Reached max parallel scanners ({}/{}), AssetScan stays Pending",
                    running.len(),
                    max_parallel
                );
                return Ok(());
            }
        }

        self.patch(
            asset_scan.id,
            AssetScanPatch::status(Status::with_message(
                AssetScanState::Scheduled,
                AssetScanReason::Provisioning,
                "Provisioning scanner for AssetScan",
            )),
        )
        .await?;

        Err(ReconcileError::requeue_after(
            DEFAULT_PROVISIONING_DELAY,
            "AssetScan scheduled",
        ))
    }

    async fn reconcile_scheduled(&self, asset_scan: &AssetScan) -> ReconcileResult {
        let job = self.job_config(asset_scan).await?;

        let status = match self.provider.run_asset_scan(&job).await {
            Ok(()) => {
                info!("Scanner is ready for AssetScan");
                Status::with_message(
                    AssetScanState::ReadyToScan,
                    AssetScanReason::ResourcesReady,
                    "Scanner resources are ready",
                )
            }
            Err(ProviderError::Retryable {
                message,
                retry_after,
            }) => {
                debug!("Scanner is not ready yet: {}", message);
                return Err(ReconcileError::requeue_after(retry_after, message));
            }
            Err(ProviderError::Fatal(message)) => {
                warn!("Failed to run AssetScan: {}", message);
                Status::with_message(AssetScanState::Failed, AssetScanReason::Error, message)
            }
            Err(ProviderError::Other(err)) => {
                warn!("Failed to run AssetScan: {:#}", err);
                Status::with_message(
                    AssetScanState::Failed,
                    AssetScanReason::Error,
                    format!("{:#}", err),
                )
            }
        };

        self.patch(asset_scan.id, AssetScanPatch::status(status)).await?;
        Ok(())
    }

    async fn reconcile_aborted(&self, asset_scan: &AssetScan) -> ReconcileResult {
        let deadline =
            saturating_add(asset_scan.status.last_transition_time, self.config.abort_timeout);
        if Utc::now() <= deadline {
            debug!("Waiting for scanner to finish graceful shutdown");
            return Ok(());
        }

        warn!("AssetScan abort timed out");
        self.patch(
            asset_scan.id,
            AssetScanPatch::status(Status::with_message(
                AssetScanState::Failed,
                AssetScanReason::AbortTimeout,
                format!(
                    "failed to wait for scanner to finish graceful shutdown on abort after: {}",
                    humantime::format_duration(self.config.abort_timeout)
                ),
            )),
        )
        .await?;
        Ok(())
    }

    async fn reconcile_cleanup(&self, asset_scan: &AssetScan) -> ReconcileResult {
        let policy = self.config.delete_policy;
        let skip = match policy {
            DeleteJobPolicy::Never => true,
            DeleteJobPolicy::OnSuccess => asset_scan.status.state == AssetScanState::Failed,
            DeleteJobPolicy::Always => false,
        };
        if skip {
            debug!("Skipping resource cleanup due to delete policy {}", policy);
            self.patch(
                asset_scan.id,
                AssetScanPatch::cleanup(Status::with_message(
                    ResourceCleanupState::Skipped,
                    ResourceCleanupReason::DeletePolicy,
                    format!("Deleting scanner resources is skipped due to policy: {}", policy),
                )),
            )
            .await?;
            return Ok(());
        }

        let job = self.job_config(asset_scan).await?;
        let status = match self.provider.remove_asset_scan(&job).await {
            Ok(()) => {
                info!("Scanner resources removed");
                Status::with_message(
                    ResourceCleanupState::Done,
                    ResourceCleanupReason::Success,
                    "Scanner resources are removed",
                )
            }
            Err(ProviderError::Retryable {
                message,
                retry_after,
            }) => {
                debug!("Scanner resources are not removed yet: {}", message);
                return Err(ReconcileError::requeue_after(retry_after, message));
            }
            Err(ProviderError::Fatal(message)) => {
                warn!("Failed to remove scanner resources: {}", message);
                Status::with_message(
                    ResourceCleanupState::Failed,
                    ResourceCleanupReason::ProviderError,
                    message,
                )
            }
            Err(ProviderError::Other(err)) => {
                warn!("Failed to remove scanner resources: {:#}", err);
                Status::with_message(
                    ResourceCleanupState::Failed,
                    ResourceCleanupReason::ProviderError,
                    format!("{:#}", err),
                )
            }
        };

        self.patch(asset_scan.id, AssetScanPatch::cleanup(status)).await?;
        Ok(())
    }
}

#[async_trait]
impl ItemSource<AssetScanReconcileEvent> for AssetScanWatcher {
    async fn get_items(&self) -> anyhow::Result<Vec<AssetScanReconcileEvent>> {
        let filter = AssetScanFilter {
            reconcilable: true,
            ..Default::default()
        };
        let asset_scans = self
            .backend
            .list_asset_scans(&filter)
            .await
            .context("failed to fetch AssetScans")?;

        Ok(asset_scans
            .into_iter()
            .map(|asset_scan| AssetScanReconcileEvent {
                asset_scan_id: asset_scan.id,
                scan_id: asset_scan.scan_id,
                asset_id: asset_scan.asset_id,
            })
            .collect())
    }
}

#[async_trait]
impl Reconcile<AssetScanReconcileEvent> for AssetScanWatcher {
    #[instrument(
        skip(self),
        fields(
            controller = CONTROLLER,
            asset_scan_id = %event.asset_scan_id,
            scan_id = %event.scan_id,
        )
    )]
    async fn reconcile(&self, event: AssetScanReconcileEvent) -> ReconcileResult {
        let asset_scan = match self.backend.get_asset_scan(event.asset_scan_id).await {
            Ok(asset_scan) => asset_scan,
            Err(err) if err.is_not_found() => {
                debug!("AssetScan no longer exists");
                return Ok(());
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to fetch AssetScan. {}", event))
                    .into())
            }
        };

        match asset_scan.status.state {
            AssetScanState::Pending => self.reconcile_pending(&asset_scan).await,
            AssetScanState::Scheduled => self.reconcile_scheduled(&asset_scan).await,
            AssetScanState::ReadyToScan | AssetScanState::InProgress => {
                debug!("AssetScan is driven by the scanner");
                Ok(())
            }
            AssetScanState::Aborted => self.reconcile_aborted(&asset_scan).await,
            AssetScanState::Done | AssetScanState::Failed => {
                if asset_scan.resource_cleanup_status.state == ResourceCleanupState::Pending {
                    self.reconcile_cleanup(&asset_scan).await
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl Controller for AssetScanWatcher {
    fn name(&self) -> &'static str {
        CONTROLLER
    }

    fn start(self: Arc<Self>, token: CancellationToken) -> Vec<JoinHandle<()>> {
        let settings = self.config.settings;
        start_watcher::<AssetScanReconcileEvent, _>(CONTROLLER, self, &settings, token)
    }
}
