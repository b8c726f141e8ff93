// crates/orchestrator/src/watcher/scan_estimation.rs
//! ScanEstimation state machine: discover assets in scope, fan out one
//! AssetScanEstimation per asset, sum their estimations and garbage
//! collect the result once its TTL expires.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use vajra_common::query::{
    AssetFilter, AssetScanEstimationFilter, AssetScanEstimationPatch, ScanEstimationFilter,
    ScanEstimationPatch, StateFilter,
};
use vajra_common::{
    AssetScanEstimation, AssetScanEstimationReason, AssetScanEstimationState, Backend,
    BackendError, ScanEstimation, ScanEstimationReason, ScanEstimationState,
    ScanEstimationSummary, Status,
};

use super::gc::{self, GcAction};
use super::{fan_out, saturating_add, start_watcher};
use crate::config::ScanEstimationWatcherConfig;
use crate::error::ReconcileResult;
use crate::event::ScanEstimationReconcileEvent;
use crate::orchestrator::Controller;
use crate::poller::ItemSource;
use crate::reconciler::Reconcile;

const CONTROLLER: &str = "ScanEstimationWatcher";

pub struct ScanEstimationWatcher {
    backend: Arc<dyn Backend>,
    config: ScanEstimationWatcherConfig,
}

/// Totals recomputed from the children of a scan estimation.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct EstimationProgress {
    pub summary: ScanEstimationSummary,
    pub failed: usize,
}

pub(crate) fn summarize(estimations: &[AssetScanEstimation]) -> EstimationProgress {
    let mut progress = EstimationProgress::default();
    let summary = &mut progress.summary;

    for estimation in estimations {
        match estimation.state() {
            None | Some(AssetScanEstimationState::Pending) => summary.jobs_left_to_run += 1,
            Some(AssetScanEstimationState::Done) => {
                if let Some(result) = &estimation.estimation {
                    summary.total_scan_time += result.duration;
                    summary.total_scan_size += result.size;
                    summary.total_scan_cost += result.cost;
                }
                summary.jobs_completed += 1;
            }
            Some(AssetScanEstimationState::Aborted) => summary.jobs_completed += 1,
            Some(AssetScanEstimationState::Failed) => {
                summary.jobs_completed += 1;
                progress.failed += 1;
            }
        }
    }
    progress
}

/// Scale the summed scan time down to the number of scanners that would
/// run side by side. Rough: which jobs overlap is unknown.
pub(crate) fn adjust_for_parallel_scanners(
    summary: &mut ScanEstimationSummary,
    max_parallel_scanners: Option<u32>,
) -> anyhow::Result<()> {
    if summary.jobs_completed == 0 {
        return Err(anyhow!("0 completed jobs in summary"));
    }
    let max_parallel = max_parallel_scanners.unwrap_or(0);
    if max_parallel > 1 {
        let parallel = max_parallel.min(summary.jobs_completed);
        summary.total_scan_time /= u64::from(parallel);
    }
    Ok(())
}

fn is_timed_out(estimation: &ScanEstimation, default_timeout: Duration, now: DateTime<Utc>) -> bool {
    if estimation.state().is_some_and(|state| state.is_terminal()) {
        return false;
    }
    let Some(start) = estimation.start_time else {
        return false;
    };
    let timeout = estimation
        .scan_template
        .timeout_seconds
        .map(Duration::from_secs)
        .unwrap_or(default_timeout);
    saturating_add(start, timeout) < now
}

impl ScanEstimationWatcher {
    pub fn new(backend: Arc<dyn Backend>, config: ScanEstimationWatcherConfig) -> Self {
        Self { backend, config }
    }

    async fn patch(&self, id: Uuid, patch: ScanEstimationPatch) -> anyhow::Result<()> {
        self.backend
            .patch_scan_estimation(id, patch)
            .await
            .with_context(|| format!("failed to patch ScanEstimation. ScanEstimationID={}", id))
    }

    fn ttl_seconds(&self, estimation: &ScanEstimation) -> u64 {
        estimation
            .ttl_seconds_after_finished
            .unwrap_or(self.config.default_ttl.as_secs())
    }

    async fn reconcile_no_state(&self, estimation: &ScanEstimation) -> ReconcileResult {
        self.patch(
            estimation.id,
            ScanEstimationPatch::status(Status::new(
                ScanEstimationState::Pending,
                ScanEstimationReason::Created,
                None,
            )),
        )
        .await?;
        Ok(())
    }

    async fn reconcile_pending(&self, estimation: &ScanEstimation) -> ReconcileResult {
        let assets = self
            .backend
            .list_assets(&AssetFilter::in_scope(&estimation.scan_template.scope))
            .await
            .with_context(|| {
                format!(
                    "failed to discover Assets for ScanEstimation. ScanEstimationID={}",
                    estimation.id
                )
            })?;
        debug!("{} Asset(s) found for ScanEstimation", assets.len());

        let status = if assets.is_empty() {
            Status::with_message(
                ScanEstimationState::Done,
                ScanEstimationReason::NothingToEstimate,
                "No instances found in scope for Scan estimation",
            )
        } else {
            Status::with_message(
                ScanEstimationState::Discovered,
                ScanEstimationReason::SuccessfulDiscovery,
                "Assets for Scan estimation are successfully discovered",
            )
        };

        self.patch(
            estimation.id,
            ScanEstimationPatch {
                status: Some(status),
                start_time: Some(Utc::now()),
                ttl_seconds_after_finished: Some(self.ttl_seconds(estimation)),
                asset_ids: Some(assets.iter().map(|asset| asset.id).collect()),
                summary: Some(ScanEstimationSummary {
                    jobs_left_to_run: assets.len() as u32,
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await?;
        Ok(())
    }

    async fn create_asset_scan_estimation(
        &self,
        estimation: &ScanEstimation,
        asset_id: Uuid,
    ) -> anyhow::Result<Uuid> {
        let mut child = AssetScanEstimation::new(
            asset_id,
            estimation.scan_template.asset_scan_template.clone(),
        )
        .with_scan_estimation(estimation.id)
        .with_ttl(self.config.default_ttl.as_secs());
        child.status = Some(Status::new(
            AssetScanEstimationState::Pending,
            AssetScanEstimationReason::Created,
            None,
        ));

        match self.backend.post_asset_scan_estimation(child).await {
            Ok(created) => Ok(created.id),
            Err(BackendError::Conflict { id, .. }) => {
                debug!("AssetScanEstimation already exists. AssetScanEstimationID={}", id);
                Ok(id)
            }
            Err(err) => Err(err).with_context(|| {
                format!(
                    "failed to create AssetScanEstimation. ScanEstimationID={} AssetID={}",
                    estimation.id, asset_id
                )
            }),
        }
    }

    async fn reconcile_discovered(&self, estimation: &ScanEstimation) -> ReconcileResult {
        let results = fan_out(
            estimation
                .asset_ids
                .iter()
                .map(|asset_id| self.create_asset_scan_estimation(estimation, *asset_id))
                .collect::<Vec<_>>(),
            self.config.fan_out_limit,
        )
        .await;

        let mut ids = Vec::with_capacity(results.len());
        let mut failed = 0;
        for result in results {
            match result {
                Ok(id) => ids.push(id),
                Err(err) => {
                    warn!("{:#}", err);
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            return Err(anyhow!(
                "failed to create {} AssetScanEstimation(s) for ScanEstimation. ScanEstimationID={}",
                failed,
                estimation.id
            )
            .into());
        }

        info!("Total {} unique assets for ScanEstimation", estimation.asset_ids.len());
        self.patch(
            estimation.id,
            ScanEstimationPatch {
                status: Some(Status::new(
                    ScanEstimationState::InProgress,
                    ScanEstimationReason::Running,
                    None,
                )),
                summary: Some(ScanEstimationSummary {
                    jobs_left_to_run: ids.len() as u32,
                    ..Default::default()
                }),
                asset_scan_estimation_ids: Some(ids),
                ..Default::default()
            },
        )
        .await?;
        Ok(())
    }

    async fn reconcile_in_progress(&self, estimation: &ScanEstimation) -> ReconcileResult {
        let filter = AssetScanEstimationFilter {
            scan_estimation_id: Some(estimation.id),
            ..Default::default()
        };
        let children = self
            .backend
            .list_asset_scan_estimations(&filter)
            .await
            .with_context(|| {
                format!(
                    "failed to retrieve AssetScanEstimations for ScanEstimation. ScanEstimationID={}",
                    estimation.id
                )
            })?;

        let mut progress = summarize(&children);
        let mut patch = ScanEstimationPatch::default();

        if progress.summary.jobs_left_to_run == 0 {
            let message = format!(
                "{} succeeded, {} failed out of {} total asset scan estimations",
                children.len() - progress.failed,
                progress.failed,
                children.len()
            );
            let (state, reason) = if progress.failed > 0 {
                (ScanEstimationState::Failed, ScanEstimationReason::Error)
            } else {
                (ScanEstimationState::Done, ScanEstimationReason::Success)
            };
            adjust_for_parallel_scanners(
                &mut progress.summary,
                estimation.scan_template.max_parallel_scanners,
            )
            .context("failed to update scan time from parallel scans")?;

            let now = Utc::now();
            patch.status = Some(Status::with_message(state, reason, message).at(now));
            patch.end_time = Some(now);
            patch.delete_after = Some(saturating_add(
                now,
                Duration::from_secs(self.ttl_seconds(estimation)),
            ));
        }
        patch.summary = Some(progress.summary);

        self.patch(estimation.id, patch).await?;
        Ok(())
    }

    async fn reconcile_aborted(&self, estimation: &ScanEstimation) -> ReconcileResult {
        let filter = AssetScanEstimationFilter {
            scan_estimation_id: Some(estimation.id),
            states: StateFilter::NotIn(vec![
                AssetScanEstimationState::Aborted,
                AssetScanEstimationState::Done,
            ]),
            ..Default::default()
        };
        let children = self
            .backend
            .list_asset_scan_estimations(&filter)
            .await
            .with_context(|| {
                format!(
                    "failed to fetch AssetScanEstimation(s) for ScanEstimation. ScanEstimationID={}",
                    estimation.id
                )
            })?;

        let results = fan_out(
            children.iter().map(|child| async move {
                self.backend
                    .patch_asset_scan_estimation(
                        child.id,
                        AssetScanEstimationPatch::status(Status::with_message(
                            AssetScanEstimationState::Aborted,
                            AssetScanEstimationReason::Aborted,
                            "asset scan estimation was aborted",
                        )),
                    )
                    .await
                    .with_context(|| {
                        format!(
                            "failed to abort AssetScanEstimation. AssetScanEstimationID={}",
                            child.id
                        )
                    })
            })
            .collect::<Vec<_>>(),
            self.config.fan_out_limit,
        )
        .await;

        let failed = results
            .iter()
            .filter_map(|result| result.as_ref().err())
            .inspect(|err| warn!("{:#}", err))
            .count();
        if failed > 0 {
            return Err(anyhow!("updating {} AssetScanEstimation(s) failed", failed).into());
        }

        let now = Utc::now();
        self.patch(
            estimation.id,
            ScanEstimationPatch {
                status: Some(
                    Status::with_message(
                        ScanEstimationState::Failed,
                        ScanEstimationReason::Aborted,
                        "ScanEstimation was aborted",
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

    async fn reconcile_done(&self, estimation: &ScanEstimation) -> ReconcileResult {
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
                    ScanEstimationPatch {
                        end_time: Some(end_time),
                        ttl_seconds_after_finished: Some(ttl_seconds),
                        delete_after: Some(delete_after),
                        ..Default::default()
                    },
                )
                .await?;
            }
            GcAction::Delete => {
                info!("Deleting expired ScanEstimation");
                match self.backend.delete_scan_estimation(estimation.id).await {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => {}
                    Err(err) => {
                        return Err(anyhow::Error::new(err)
                            .context(format!(
                                "failed to delete ScanEstimation. ScanEstimationID={}",
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
impl ItemSource<ScanEstimationReconcileEvent> for ScanEstimationWatcher {
    async fn get_items(&self) -> anyhow::Result<Vec<ScanEstimationReconcileEvent>> {
        let filter = ScanEstimationFilter {
            reconcilable: true,
            ..Default::default()
        };
        let estimations = self
            .backend
            .list_scan_estimations(&filter)
            .await
            .context("failed to fetch ScanEstimations")?;

        Ok(estimations
            .into_iter()
            .map(|estimation| ScanEstimationReconcileEvent {
                scan_estimation_id: estimation.id,
            })
            .collect())
    }
}

#[async_trait]
impl Reconcile<ScanEstimationReconcileEvent> for ScanEstimationWatcher {
    #[instrument(
        skip(self),
        fields(controller = CONTROLLER, scan_estimation_id = %event.scan_estimation_id)
    )]
    async fn reconcile(&self, event: ScanEstimationReconcileEvent) -> ReconcileResult {
        let estimation = match self.backend.get_scan_estimation(event.scan_estimation_id).await {
            Ok(estimation) => estimation,
            Err(err) if err.is_not_found() => {
                debug!("ScanEstimation no longer exists");
                return Ok(());
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to fetch ScanEstimation. {}", event))
                    .into())
            }
        };

        if is_timed_out(&estimation, self.config.estimation_timeout, Utc::now()) {
            warn!("ScanEstimation has timed out");
            let now = Utc::now();
            self.patch(
                estimation.id,
                ScanEstimationPatch {
                    status: Some(
                        Status::with_message(
                            ScanEstimationState::Failed,
                            ScanEstimationReason::Timeout,
                            "ScanEstimation has been timed out",
                        )
                        .at(now),
                    ),
                    end_time: Some(now),
                    ..Default::default()
                },
            )
            .await?;
            return Ok(());
        }

        let Some(state) = estimation.state() else {
            return self.reconcile_no_state(&estimation).await;
        };
        debug!("Reconciling ScanEstimation state: {:?}", state);

        match state {
            ScanEstimationState::Pending => self.reconcile_pending(&estimation).await,
            ScanEstimationState::Discovered => self.reconcile_discovered(&estimation).await,
            ScanEstimationState::InProgress => self.reconcile_in_progress(&estimation).await,
            ScanEstimationState::Aborted => self.reconcile_aborted(&estimation).await,
            ScanEstimationState::Done | ScanEstimationState::Failed => {
                self.reconcile_done(&estimation).await
            }
        }
    }
}

impl Controller for ScanEstimationWatcher {
    fn name(&self) -> &'static str {
        CONTROLLER
    }

    fn start(self: Arc<Self>, token: CancellationToken) -> Vec<JoinHandle<()>> {
        let settings = self.config.settings;
        start_watcher::<ScanEstimationReconcileEvent, _>(CONTROLLER, self, &settings, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;
    use crate::testing::{backend, seed_vms, FaultyBackend};
    use chrono::Duration as ChronoDuration;
    use vajra_common::{AssetScope, Estimation, ScanTemplate};
    use vajra_storage::MemoryBackend;

    fn template(location: &str, max_parallel: Option<u32>) -> ScanTemplate {
        ScanTemplate {
            scope: AssetScope {
                locations: vec![location.to_string()],
                ..Default::default()
            },
            max_parallel_scanners: max_parallel,
            ..Default::default()
        }
    }

    async fn post(backend: &MemoryBackend, estimation: ScanEstimation) -> ScanEstimation {
        backend.post_scan_estimation(estimation).await.unwrap()
    }

    fn event(estimation: &ScanEstimation) -> ScanEstimationReconcileEvent {
        ScanEstimationReconcileEvent {
            scan_estimation_id: estimation.id,
        }
    }

    fn done_child(parent: Uuid, duration: u64, cost: f64) -> AssetScanEstimation {
        let mut child = AssetScanEstimation::new(Uuid::new_v4(), Default::default())
            .with_scan_estimation(parent);
        child.status = Some(Status::new(
            AssetScanEstimationState::Done,
            AssetScanEstimationReason::Success,
            None,
        ));
        child.estimation = Some(Estimation {
            cost,
            size: 8,
            duration,
            cost_breakdown: Vec::new(),
        });
        child
    }

    #[tokio::test]
    async fn estimation_walks_through_lifecycle() {
        let backend = backend();
        seed_vms(&backend, "us-east-1", 3).await;
        seed_vms(&backend, "eu-west-1", 2).await;
        let estimation = post(&backend, ScanEstimation::new(template("us-east-1", None))).await;
        let watcher = ScanEstimationWatcher::new(backend.clone(), Default::default());

        watcher.reconcile(event(&estimation)).await.unwrap();
        let current = backend.get_scan_estimation(estimation.id).await.unwrap();
        assert_eq!(current.state(), Some(ScanEstimationState::Pending));

        watcher.reconcile(event(&estimation)).await.unwrap();
        let current = backend.get_scan_estimation(estimation.id).await.unwrap();
        assert_eq!(current.state(), Some(ScanEstimationState::Discovered));
        assert_eq!(current.asset_ids.len(), 3);
        assert_eq!(current.summary.jobs_left_to_run, 3);
        assert_eq!(current.ttl_seconds_after_finished, Some(3600));
        assert!(current.start_time.is_some());

        watcher.reconcile(event(&estimation)).await.unwrap();
        // a replay after a lost status patch creates nothing new
        backend
            .patch_scan_estimation(
                estimation.id,
                ScanEstimationPatch::status(Status::new(
                    ScanEstimationState::Discovered,
                    ScanEstimationReason::SuccessfulDiscovery,
                    None,
                )),
            )
            .await
            .unwrap();
        watcher.reconcile(event(&estimation)).await.unwrap();

        let current = backend.get_scan_estimation(estimation.id).await.unwrap();
        assert_eq!(current.state(), Some(ScanEstimationState::InProgress));
        assert_eq!(current.asset_scan_estimation_ids.len(), 3);
        let children = backend
            .list_asset_scan_estimations(&AssetScanEstimationFilter {
                scan_estimation_id: Some(estimation.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(children.len(), 3);
        assert!(children
            .iter()
            .all(|c| c.state() == Some(AssetScanEstimationState::Pending)));

        // still waiting on children
        watcher.reconcile(event(&estimation)).await.unwrap();
        let current = backend.get_scan_estimation(estimation.id).await.unwrap();
        assert_eq!(current.state(), Some(ScanEstimationState::InProgress));
        assert_eq!(current.summary.jobs_left_to_run, 3);

        for child in &children {
            backend
                .patch_asset_scan_estimation(
                    child.id,
                    AssetScanEstimationPatch {
                        status: Some(Status::new(
                            AssetScanEstimationState::Done,
                            AssetScanEstimationReason::Success,
                            None,
                        )),
                        estimation: Some(Estimation {
                            cost: 1.5,
                            size: 8,
                            duration: 300,
                            cost_breakdown: Vec::new(),
                        }),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        watcher.reconcile(event(&estimation)).await.unwrap();

        let done = backend.get_scan_estimation(estimation.id).await.unwrap();
        assert_eq!(done.state(), Some(ScanEstimationState::Done));
        assert_eq!(done.summary.jobs_completed, 3);
        assert_eq!(done.summary.total_scan_time, 900);
        assert_eq!(done.summary.total_scan_size, 24);
        assert!((done.summary.total_scan_cost - 4.5).abs() < f64::EPSILON);
        let end = done.end_time.unwrap();
        assert_eq!(done.delete_after, Some(end + ChronoDuration::seconds(3600)));
    }

    #[tokio::test]
    async fn empty_scope_has_nothing_to_estimate() {
        let backend = backend();
        let mut estimation = ScanEstimation::new(template("ap-south-1", None));
        estimation.status = Some(Status::new(
            ScanEstimationState::Pending,
            ScanEstimationReason::Created,
            None,
        ));
        let estimation = post(&backend, estimation).await;

        ScanEstimationWatcher::new(backend.clone(), Default::default())
            .reconcile(event(&estimation))
            .await
            .unwrap();

        let current = backend.get_scan_estimation(estimation.id).await.unwrap();
        let status = current.status.unwrap();
        assert_eq!(status.state, ScanEstimationState::Done);
        assert_eq!(status.reason, ScanEstimationReason::NothingToEstimate);
        assert!(current.asset_ids.is_empty());
    }

    #[test]
    fn summary_counts_children_by_state() {
        let parent = Uuid::new_v4();
        let mut aborted = done_child(parent, 100, 1.0);
        aborted.status.as_mut().unwrap().state = AssetScanEstimationState::Aborted;
        let mut failed = done_child(parent, 100, 1.0);
        failed.status.as_mut().unwrap().state = AssetScanEstimationState::Failed;
        let pending = AssetScanEstimation::new(Uuid::new_v4(), Default::default());

        let progress = summarize(&[
            done_child(parent, 100, 1.0),
            done_child(parent, 200, 2.0),
            aborted,
            failed,
            pending,
        ]);
        assert_eq!(progress.summary.jobs_completed, 4);
        assert_eq!(progress.summary.jobs_left_to_run, 1);
        assert_eq!(progress.summary.total_scan_time, 300);
        assert_eq!(progress.failed, 1);
    }

    #[test]
    fn parallel_scanners_divide_scan_time() {
        let summary = |jobs| ScanEstimationSummary {
            jobs_completed: jobs,
            total_scan_time: 1200,
            ..Default::default()
        };

        for (max_parallel, jobs, expected) in [
            (Some(1), 4, 1200),
            (None, 4, 1200),
            (Some(5), 4, 300),
            (Some(2), 4, 600),
            (Some(3), 2, 600),
        ] {
            let mut s = summary(jobs);
            adjust_for_parallel_scanners(&mut s, max_parallel).unwrap();
            assert_eq!(s.total_scan_time, expected, "max_parallel={:?} jobs={}", max_parallel, jobs);
        }

        assert!(adjust_for_parallel_scanners(&mut summary(0), Some(2)).is_err());
    }

    #[tokio::test]
    async fn failed_children_fail_estimation() {
        let backend = backend();
        let mut estimation = ScanEstimation::new(template("us-east-1", Some(2)));
        estimation.status = Some(Status::new(
            ScanEstimationState::InProgress,
            ScanEstimationReason::Running,
            None,
        ));
        let estimation = post(&backend, estimation).await;
        let mut failed = done_child(estimation.id, 100, 1.0);
        failed.status.as_mut().unwrap().state = AssetScanEstimationState::Failed;
        backend.post_asset_scan_estimation(failed).await.unwrap();
        backend
            .post_asset_scan_estimation(done_child(estimation.id, 600, 1.0))
            .await
            .unwrap();

        ScanEstimationWatcher::new(backend.clone(), Default::default())
            .reconcile(event(&estimation))
            .await
            .unwrap();

        let current = backend.get_scan_estimation(estimation.id).await.unwrap();
        let status = current.status.unwrap();
        assert_eq!(status.state, ScanEstimationState::Failed);
        assert_eq!(status.reason, ScanEstimationReason::Error);
        assert_eq!(
            status.message.as_deref(),
            Some("1 succeeded, 1 failed out of 2 total asset scan estimations")
        );
        assert_eq!(current.summary.total_scan_time, 300);
    }

    #[tokio::test]
    async fn abort_propagates_to_children() {
        let backend = backend();
        let mut estimation = ScanEstimation::new(template("us-east-1", None));
        estimation.status = Some(Status::new(
            ScanEstimationState::Aborted,
            ScanEstimationReason::Aborted,
            None,
        ));
        let estimation = post(&backend, estimation).await;
        let done = backend
            .post_asset_scan_estimation(done_child(estimation.id, 100, 1.0))
            .await
            .unwrap();
        let pending = backend
            .post_asset_scan_estimation(
                AssetScanEstimation::new(Uuid::new_v4(), Default::default())
                    .with_scan_estimation(estimation.id),
            )
            .await
            .unwrap();

        ScanEstimationWatcher::new(backend.clone(), Default::default())
            .reconcile(event(&estimation))
            .await
            .unwrap();

        let state = |id| {
            let backend = backend.clone();
            async move { backend.get_asset_scan_estimation(id).await.unwrap().state() }
        };
        assert_eq!(state(done.id).await, Some(AssetScanEstimationState::Done));
        assert_eq!(state(pending.id).await, Some(AssetScanEstimationState::Aborted));

        let current = backend.get_scan_estimation(estimation.id).await.unwrap();
        let status = current.status.unwrap();
        assert_eq!(status.state, ScanEstimationState::Failed);
        assert_eq!(status.reason, ScanEstimationReason::Aborted);
        assert!(current.end_time.is_some());
    }

    #[tokio::test]
    async fn running_estimation_times_out() {
        let backend = backend();
        let mut estimation = ScanEstimation::new(ScanTemplate {
            timeout_seconds: Some(60),
            ..Default::default()
        });
        estimation.status = Some(Status::new(
            ScanEstimationState::InProgress,
            ScanEstimationReason::Running,
            None,
        ));
        estimation.start_time = Some(Utc::now() - ChronoDuration::seconds(90));
        let estimation = post(&backend, estimation).await;

        ScanEstimationWatcher::new(backend.clone(), Default::default())
            .reconcile(event(&estimation))
            .await
            .unwrap();

        let status = backend
            .get_scan_estimation(estimation.id)
            .await
            .unwrap()
            .status
            .unwrap();
        assert_eq!(status.state, ScanEstimationState::Failed);
        assert_eq!(status.reason, ScanEstimationReason::Timeout);
    }

    #[tokio::test]
    async fn finished_estimation_is_deleted_after_ttl() {
        let backend = backend();
        let watcher = ScanEstimationWatcher::new(backend.clone(), Default::default());
        let finished = |ended_ago: i64| {
            let mut estimation = ScanEstimation::new(ScanTemplate::default());
            estimation.status = Some(Status::new(
                ScanEstimationState::Done,
                ScanEstimationReason::Success,
                None,
            ));
            estimation.end_time = Some(Utc::now() - ChronoDuration::seconds(ended_ago));
            estimation.ttl_seconds_after_finished = Some(60);
            estimation
        };

        let young = post(&backend, finished(59)).await;
        watcher.reconcile(event(&young)).await.unwrap();
        let kept = backend.get_scan_estimation(young.id).await.unwrap();
        assert_eq!(
            kept.delete_after,
            Some(kept.end_time.unwrap() + ChronoDuration::seconds(60))
        );
        // persisted deadline not reached yet
        watcher.reconcile(event(&young)).await.unwrap();
        assert!(backend.get_scan_estimation(young.id).await.is_ok());

        let old = post(&backend, finished(61)).await;
        watcher.reconcile(event(&old)).await.unwrap();
        assert!(backend
            .get_scan_estimation(old.id)
            .await
            .unwrap_err()
            .is_not_found());

        // deleted estimations are no longer polled
        let items = watcher.get_items().await.unwrap();
        assert!(items.iter().all(|item| item.scan_estimation_id != old.id));
    }

    #[tokio::test]
    async fn abort_waits_for_every_child() {
        let memory = backend();
        let faulty = FaultyBackend::new(memory.clone());
        let mut estimation = ScanEstimation::new(template("us-east-1", None));
        estimation.status = Some(Status::new(
            ScanEstimationState::Aborted,
            ScanEstimationReason::Aborted,
            None,
        ));
        let estimation = post(&memory, estimation).await;
        let child = |asset_id| {
            AssetScanEstimation::new(asset_id, Default::default()).with_scan_estimation(estimation.id)
        };
        let first = memory.post_asset_scan_estimation(child(Uuid::new_v4())).await.unwrap();
        let second = memory.post_asset_scan_estimation(child(Uuid::new_v4())).await.unwrap();
        let watcher = ScanEstimationWatcher::new(faulty.clone(), Default::default());

        faulty.fail(second.id);
        let result = watcher.reconcile(event(&estimation)).await;
        assert!(matches!(result, Err(ReconcileError::Other(_))));

        let current = memory.get_scan_estimation(estimation.id).await.unwrap();
        assert_eq!(current.state(), Some(ScanEstimationState::Aborted));
        assert!(current.end_time.is_none());
        let state = |id| {
            let memory = memory.clone();
            async move { memory.get_asset_scan_estimation(id).await.unwrap().state() }
        };
        assert_eq!(state(first.id).await, Some(AssetScanEstimationState::Aborted));
        assert_ne!(state(second.id).await, Some(AssetScanEstimationState::Aborted));

        faulty.heal();
        watcher.reconcile(event(&estimation)).await.unwrap();

        let current = memory.get_scan_estimation(estimation.id).await.unwrap();
        assert_eq!(current.state(), Some(ScanEstimationState::Failed));
        assert_eq!(state(second.id).await, Some(AssetScanEstimationState::Aborted));
    }

    #[tokio::test]
    async fn huge_timeout_and_ttl_do_not_overflow() {
        let backend = backend();
        let mut estimation = ScanEstimation::new(ScanTemplate {
            timeout_seconds: Some(10_000_000_000_000),
            ..Default::default()
        });
        estimation.status = Some(Status::new(
            ScanEstimationState::InProgress,
            ScanEstimationReason::Running,
            None,
        ));
        estimation.start_time = Some(Utc::now());
        estimation.ttl_seconds_after_finished = Some(10_000_000_000_000);
        let estimation = post(&backend, estimation).await;
        backend
            .post_asset_scan_estimation(done_child(estimation.id, 100, 1.0))
            .await
            .unwrap();
        let watcher = ScanEstimationWatcher::new(backend.clone(), Default::default());

        watcher.reconcile(event(&estimation)).await.unwrap();
        let current = backend.get_scan_estimation(estimation.id).await.unwrap();
        assert_eq!(current.state(), Some(ScanEstimationState::Done));
        assert_eq!(current.delete_after, Some(DateTime::<Utc>::MAX_UTC));

        // never collected
        watcher.reconcile(event(&estimation)).await.unwrap();
        assert!(backend.get_scan_estimation(estimation.id).await.is_ok());
    }
}
