//! AssetScanEstimation watcher: asks the provider for a per-asset cost and
//! duration estimation, seeded with the stats of the last finished scan.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use vajra_common::query::{
    AssetScanEstimationFilter, AssetScanEstimationPatch, AssetScanFilter, StateFilter,
};
use vajra_common::{
    Asset, AssetScanEstimation, AssetScanEstimationReason, AssetScanEstimationState,
    AssetScanState, AssetScanStats, Backend, Provider, ProviderError, Status,
};

use super::gc::{self, GcAction};
use super::{saturating_add, start_watcher};
use crate::config::AssetScanEstimationWatcherConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::event::AssetScanEstimationReconcileEvent;
use crate::orchestrator::Controller;
use crate::poller::ItemSource;
use crate::reconciler::Reconcile;

const CONTROLLER: &str = "AssetScanEstimationWatcher";

pub struct AssetScanEstimationWatcher {
    backend: Arc<dyn Backend>,
    provider: Arc<dyn Provider>,
    config: AssetScanEstimationWatcherConfig,
}

impl AssetScanEstimationWatcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        provider: Arc<dyn Provider>,
        config: AssetScanEstimationWatcherConfig,
    ) -> Self {
        Self {
            backend,
            provider,
            config,
        }
    }

    async fn patch(&self, id: Uuid, patch: AssetScanEstimationPatch) -> anyhow::Result<()> {
        self.backend
            .patch_asset_scan_estimation(id, patch)
            .await
            .with_context(|| {
                format!("failed to update AssetScanEstimation. AssetScanEstimationID={}", id)
            })
    }

    /// Stats of the most recently finished scan of `asset`; empty when the
    /// asset was never scanned or the lookup fails.
    async fn latest_asset_scan_stats(&self, asset: &Asset) -> AssetScanStats {
        let filter = AssetScanFilter {
            asset_id: Some(asset.id),
            states: StateFilter::In(vec![AssetScanState::Done]),
            ..Default::default()
        };
        match self.backend.list_asset_scans(&filter).await {
            Ok(asset_scans) => asset_scans
                .into_iter()
                .max_by_key(|asset_scan| asset_scan.last_transition())
                .map(|asset_scan| asset_scan.stats)
                .unwrap_or_default(),
            Err(err) => {
                warn!("Failed to fetch previous AssetScans, estimating without stats: {}", err);
                AssetScanStats::default()
            }
        }
    }

    async fn reconcile_no_state(&self, estimation: &AssetScanEstimation) -> ReconcileResult {
        self.patch(
            estimation.id,
            AssetScanEstimationPatch::status(Status::new(
                AssetScanEstimationState::Pending,
                AssetScanEstimationReason::Created,
                None,
            )),
        )
        .await?;
        Ok(())
    }

    async fn reconcile_pending(&self, estimation: &AssetScanEstimation) -> ReconcileResult {
        let asset = self
            .backend
            .get_asset(estimation.asset_id)
            .await
            .with_context(|| format!("failed to fetch Asset. AssetID={}", estimation.asset_id))?;
        let stats = self.latest_asset_scan_stats(&asset).await;

        let start_time = Utc::now();
        let result = self
            .provider
            .estimate(&stats, &asset, &estimation.asset_scan_template)
            .await;
        let end_time = Utc::now();

        let (status, result) = match result {
            Ok(result) => {
                info!(
                    "Asset scan estimation completed: cost={} size={} duration={}",
                    result.cost, result.size, result.duration
                );
                (
                    Status::new(
                        AssetScanEstimationState::Done,
                        AssetScanEstimationReason::Success,
                        None,
                    ),
                    Some(result),
                )
            }
            Err(ProviderError::Fatal(message)) => {
                error!("Fatal error while estimating asset scan: {}", message);
                (
                    Status::with_message(
                        AssetScanEstimationState::Failed,
                        AssetScanEstimationReason::Error,
                        message,
                    ),
                    None,
                )
            }
            Err(ProviderError::Retryable {
                message,
                retry_after,
            }) => return Err(ReconcileError::requeue_after(retry_after, message)),
            Err(ProviderError::Other(err)) => {
                return Err(err.context("failed to estimate asset scan").into())
            }
        };

        let ttl_seconds = estimation
            .ttl_seconds_after_finished
            .unwrap_or(self.config.default_ttl.as_secs());
        self.patch(
            estimation.id,
            AssetScanEstimationPatch {
                status: Some(status),
                start_time: Some(start_time),
                end_time: Some(end_time),
                ttl_seconds_after_finished: Some(ttl_seconds),
                delete_after: Some(saturating_add(end_time, Duration::from_secs(ttl_seconds))),
                estimation: result,
            },
        )
        .await?;
        Ok(())
    }

    async fn reconcile_aborted(&self, estimation: &AssetScanEstimation) -> ReconcileResult {
        self.patch(
            estimation.id,
            AssetScanEstimationPatch::status(Status::with_message(
                AssetScanEstimationState::Failed,
                AssetScanEstimationReason::Aborted,
                "asset scan estimation was aborted",
            )),
        )
        .await?;
        info!("AssetScanEstimation successfully aborted");
        Ok(())
    }

    async fn reconcile_done(&self, estimation: &AssetScanEstimation) -> ReconcileResult {
        match gc::evaluate(
            estimation.end_time,
            estimation.ttl_seconds_after_finished,
            estimation.delete_after,
            self.config.default_ttl,
            Utc::now(),
        ) {
            GcAction::Persist {
                end_time,
                ttl_seconds,
                delete_after,
            } => {
                self.patch(
                    estimation.id,
                    AssetScanEstimationPatch {
                        end_time: Some(end_time),
                        ttl_seconds_after_finished: Some(ttl_seconds),
                        delete_after: Some(delete_after),
                        ..Default::default()
                    },
                )
                .await?;
            }
            GcAction::Delete => {
                debug!("Deleting expired AssetScanEstimation");
                match self.backend.delete_asset_scan_estimation(estimation.id).await {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => {}
                    Err(err) => {
                        return Err(anyhow::Error::new(err)
                            .context(format!(
                                "failed to delete AssetScanEstimation. AssetScanEstimationID={}",
                                estimation.id
                            ))
                            .into())
                    }
                }
            }
            GcAction::Wait => {}
        }
        Ok(())
    }
}

#[async_trait]
impl ItemSource<AssetScanEstimationReconcileEvent> for AssetScanEstimationWatcher {
    async fn get_items(&self) -> anyhow::Result<Vec<AssetScanEstimationReconcileEvent>> {
        let filter = AssetScanEstimationFilter {
            reconcilable: true,
            ..Default::default()
        };
        let estimations = self
            .backend
            .list_asset_scan_estimations(&filter)
            .await
            .context("failed to fetch AssetScanEstimations")?;

        Ok(estimations
            .into_iter()
            .map(|estimation| AssetScanEstimationReconcileEvent {
                asset_scan_estimation_id: estimation.id,
                scan_estimation_id: estimation.scan_estimation_id,
                asset_id: estimation.asset_id,
            })
            .collect())
    }
}

#[async_trait]
impl Reconcile<AssetScanEstimationReconcileEvent> for AssetScanEstimationWatcher {
    #[instrument(
        skip(self),
        fields(
            controller = CONTROLLER,
            asset_scan_estimation_id = %event.asset_scan_estimation_id,
            asset_id = %event.asset_id,
        )
    )]
    async fn reconcile(&self, event: AssetScanEstimationReconcileEvent) -> ReconcileResult {
        let estimation = match self
            .backend
            .get_asset_scan_estimation(event.asset_scan_estimation_id)
            .await
        {
            Ok(estimation) => estimation,
            Err(err) if err.is_not_found() => {
                debug!("AssetScanEstimation no longer exists");
                return Ok(());
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to get AssetScanEstimation. {}", event))
                    .into())
            }
        };

        let Some(state) = estimation.state() else {
            return self.reconcile_no_state(&estimation).await;
        };
        match state {
            AssetScanEstimationState::Pending => self.reconcile_pending(&estimation).await,
            AssetScanEstimationState::Aborted => self.reconcile_aborted(&estimation).await,
            AssetScanEstimationState::Done | AssetScanEstimationState::Failed => {
                self.reconcile_done(&estimation).await
            }
        }
    }
}

impl Controller for AssetScanEstimationWatcher {
    fn name(&self) -> &'static str {
        CONTROLLER
    }

    fn start(self: Arc<Self>, token: CancellationToken) -> Vec<JoinHandle<()>> {
        let settings = self.config.settings;
        start_watcher::<AssetScanEstimationReconcileEvent, _>(CONTROLLER, self, &settings, token)
    }
}
