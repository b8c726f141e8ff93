// crates/orchestrator/src/watcher/scan.rs
//! Scan state machine: discover assets, fan out asset scans, aggregate
//! their results, propagate aborts.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use vajra_common::query::{AssetFilter, AssetScanFilter, AssetScanPatch, ScanFilter, ScanPatch, StateFilter};
use vajra_common::{
    AssetScan, AssetScanReason, AssetScanState, Backend, BackendError, Scan, ScanReason,
    ScanState, ScanSummary, Status,
};

use super::{fan_out, start_watcher};
use crate::config::ScanWatcherConfig;
use crate::error::ReconcileResult;
use crate::event::ScanReconcileEvent;
use crate::orchestrator::Controller;
use crate::poller::ItemSource;
use crate::reconciler::Reconcile;

const CONTROLLER: &str = "ScanWatcher";

pub struct ScanWatcher {
    backend: Arc<dyn Backend>,
    config: ScanWatcherConfig,
}

/// Summary of a scan recomputed from its asset scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScanProgress {
    pub summary: ScanSummary,
    pub succeeded: usize,
    pub failed: usize,
}

/// Reset-then-sum over the children; the result only depends on `asset_scans`.
pub(crate) fn summarize(asset_scans: &[AssetScan]) -> ScanProgress {
    let mut progress = ScanProgress {
        summary: ScanSummary::default(),
        succeeded: 0,
        failed: 0,
    };

    for asset_scan in asset_scans {
        match asset_scan.status.state {
            AssetScanState::Pending
            | AssetScanState::Scheduled
            | AssetScanState::ReadyToScan
            | AssetScanState::InProgress
            | AssetScanState::Aborted => progress.summary.jobs_left_to_run += 1,
            AssetScanState::Done | AssetScanState::Failed => {
                progress.summary.jobs_completed += 1;
                progress.summary.findings += &asset_scan.summary;
                if asset_scan.status.state == AssetScanState::Failed {
                    progress.failed += 1;
                } else {
                    progress.succeeded += 1;
                }
            }
        }
    }
    progress
}

impl ScanWatcher {
    pub fn new(backend: Arc<dyn Backend>, config: ScanWatcherConfig) -> Self {
        Self { backend, config }
    }

    async fn patch(&self, scan_id: Uuid, patch: ScanPatch) -> anyhow::Result<()> {
        self.backend
            .patch_scan(scan_id, patch)
            .await
            .with_context(|| format!("failed to patch Scan. ScanID={}", scan_id))
    }

    async fn reconcile_timeout(&self, scan: &Scan) -> ReconcileResult {
        warn!("Scan has timed out");
        let now = Utc::now();
        self.patch(
            scan.id,
            ScanPatch {
                status: Some(
                    Status::with_message(ScanState::Failed, ScanReason::Timeout, "Scan has timed out")
                        .at(now),
                ),
                end_time: Some(now),
                ..Default::default()
            },
        )
        .await?;
        Ok(())
    }

    async fn reconcile_pending(&self, scan: &Scan) -> ReconcileResult {
        let assets = self
            .backend
            .list_assets(&AssetFilter::in_scope(&scan.scope))
            .await
            .with_context(|| format!("failed to discover Assets for Scan. ScanID={}", scan.id))?;

        let patch = if assets.is_empty() {
            info!("No assets found in scope for Scan");
            let now = Utc::now();
            ScanPatch {
                status: Some(
                    Status::with_message(
                        ScanState::Done,
                        ScanReason::NothingToScan,
                        "No instances found in scope for Scan",
                    )
                    .at(now),
                ),
                end_time: Some(now),
                summary: Some(ScanSummary::default()),
                ..Default::default()
            }
        } else {
            info!("Discovered {} assets in scope for Scan", assets.len());
            ScanPatch {
                status: Some(Status::with_message(
                    ScanState::Discovered,
                    ScanReason::AssetsDiscovered,
                    "Assets for Scan are successfully discovered",
                )),
                asset_ids: Some(assets.iter().map(|a| a.id).collect()),
                ..Default::default()
            }
        };

        self.patch(scan.id, patch).await?;
        Ok(())
    }

    async fn create_asset_scan(&self, scan: &Scan, asset_id: Uuid) -> anyhow::Result<Uuid> {
        match self
            .backend
            .post_asset_scan(AssetScan::new_for_scan(scan, asset_id))
            .await
        {
            Ok(created) => {
                debug!("Created AssetScan {} for Asset {}", created.id, asset_id);
                Ok(created.id)
            }
            Err(BackendError::Conflict { id, .. }) => {
                debug!("AssetScan already exists. AssetScanID={}", id);
                Ok(id)
            }
            Err(err) => Err(err).with_context(|| {
                format!("failed to create AssetScan. ScanID={} AssetID={}", scan.id, asset_id)
            }),
        }
    }

    async fn reconcile_discovered(&self, scan: &Scan) -> ReconcileResult {
        let results = fan_out(
            scan.asset_ids
                .iter()
                .map(|asset_id| self.create_asset_scan(scan, *asset_id))
                .collect::<Vec<_>>(),
            self.config.fan_out_limit,
        )
        .await;

        let mut failed = 0;
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            warn!("{:#}", err);
            failed += 1;
        }
        if failed > 0 {
            return Err(anyhow!(
                "failed to create {} AssetScan(s) for Scan. ScanID={}",
                failed,
                scan.id
            )
            .into());
        }

        self.patch(
            scan.id,
            ScanPatch {
                status: Some(Status::with_message(
                    ScanState::InProgress,
                    ScanReason::AssetScansRunning,
                    "Asset scans are running",
                )),
                summary: Some(ScanSummary {
                    jobs_left_to_run: results.len() as u32,
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await?;
        Ok(())
    }

    async fn reconcile_in_progress(&self, scan: &Scan) -> ReconcileResult {
        let asset_scans = self
            .backend
            .list_asset_scans(&AssetScanFilter::for_scan(scan.id))
            .await
            .with_context(|| format!("failed to retrieve AssetScans for Scan. ScanID={}", scan.id))?;

        let progress = summarize(&asset_scans);
        let mut patch = ScanPatch {
            summary: Some(progress.summary.clone()),
            ..Default::default()
        };

        if progress.summary.jobs_left_to_run == 0 {
            let message = format!(
                "{} succeeded, {} failed out of {} total asset scans",
                progress.succeeded,
                progress.failed,
                asset_scans.len()
            );
            let (state, reason) = if progress.failed > 0 {
                (ScanState::Failed, ScanReason::Error)
            } else {
                (ScanState::Done, ScanReason::Success)
            };
            info!("Scan finished: {}", message);

            let now = Utc::now();
            patch.status = Some(Status::with_message(state, reason, message).at(now));
            patch.end_time = Some(now);
        }

        self.patch(scan.id, patch).await?;
        Ok(())
    }

    async fn reconcile_aborted(&self, scan: &Scan) -> ReconcileResult {
        let filter = AssetScanFilter {
            scan_id: Some(scan.id),
            states: StateFilter::NotIn(vec![
                AssetScanState::Aborted,
                AssetScanState::Done,
                AssetScanState::Failed,
            ]),
            ..Default::default()
        };
        let asset_scans = self
            .backend
            .list_asset_scans(&filter)
            .await
            .with_context(|| format!("failed to fetch AssetScans for Scan. ScanID={}", scan.id))?;

        let results = fan_out(
            asset_scans.iter().map(|asset_scan| async move {
                self.backend
                    .patch_asset_scan(
                        asset_scan.id,
                        AssetScanPatch::status(Status::with_message(
                            AssetScanState::Aborted,
                            AssetScanReason::Cancellation,
                            "AssetScan has been aborted",
                        )),
                    )
                    .await
                    .with_context(|| {
                        format!("failed to abort AssetScan. AssetScanID={}", asset_scan.id)
                    })
            })
            .collect::<Vec<_>>(),
            self.config.fan_out_limit,
        )
        .await;

        let mut failed = 0;
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            warn!("{:#}", err);
            failed += 1;
        }
        if failed > 0 {
            // the scan stays Aborted and is retried on the next poll
            return Err(anyhow!(
                "failed to abort {} AssetScan(s) for Scan. ScanID={}",
                failed,
                scan.id
            )
            .into());
        }

        let now = Utc::now();
        self.patch(
            scan.id,
            ScanPatch {
                status: Some(
                    Status::with_message(
                        ScanState::Failed,
                        ScanReason::Cancellation,
                        "Scan has been aborted",
                    )
                    .at(now),
                ),
                end_time: Some(now),
                ..Default::default()
            },
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ItemSource<ScanReconcileEvent> for ScanWatcher {
    async fn get_items(&self) -> anyhow::Result<Vec<ScanReconcileEvent>> {
        let filter = ScanFilter {
            states: StateFilter::NotIn(vec![ScanState::Done, ScanState::Failed]),
            ..Default::default()
        };
        let scans = self
            .backend
            .list_scans(&filter)
            .await
            .context("failed to fetch Scans")?;

        Ok(scans
            .into_iter()
            .map(|scan| ScanReconcileEvent { scan_id: scan.id })
            .collect())
    }
}

#[async_trait]
impl Reconcile<ScanReconcileEvent> for ScanWatcher {
    #[instrument(skip(self), fields(controller = CONTROLLER, scan_id = %event.scan_id))]
    async fn reconcile(&self, event: ScanReconcileEvent) -> ReconcileResult {
        let scan = match self.backend.get_scan(event.scan_id).await {
            Ok(scan) => scan,
            Err(err) if err.is_not_found() => {
                debug!("Scan no longer exists");
                return Ok(());
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to fetch Scan. {}", event))
                    .into())
            }
        };

        if scan.is_timed_out(self.config.scan_timeout, Utc::now()) {
            return self.reconcile_timeout(&scan).await;
        }

        match scan.status.state {
            ScanState::Pending => self.reconcile_pending(&scan).await,
            ScanState::Discovered => self.reconcile_discovered(&scan).await,
            ScanState::InProgress => self.reconcile_in_progress(&scan).await,
            ScanState::Aborted => self.reconcile_aborted(&scan).await,
            ScanState::Done | ScanState::Failed => {
                debug!("Reconciling Scan is skipped as it is in terminal state");
                Ok(())
            }
        }
    }
}

impl Controller for ScanWatcher {
    fn name(&self) -> &'static str {
        CONTROLLER
    }

    fn start(self: Arc<Self>, token: CancellationToken) -> Vec<JoinHandle<()>> {
        let settings = self.config.settings;
        start_watcher::<ScanReconcileEvent, _>(CONTROLLER, self, &settings, token)
    }
}
