//! ScanConfig watcher: turns cron schedules into scans.

mod schedule;

pub use schedule::{parse_cron, OperationTime, ScanConfigSchedule, ScheduleState, ScheduleWindow};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use vajra_common::query::{ScanConfigFilter, ScanConfigPatch, ScanFilter, StateFilter};
use vajra_common::{Backend, ScanConfig, ScanState};

use super::{chrono_duration, start_watcher};
use crate::config::ScanConfigWatcherConfig;
use crate::error::ReconcileResult;
use crate::event::ScanConfigReconcileEvent;
use crate::orchestrator::Controller;
use crate::poller::ItemSource;
use crate::reconciler::Reconcile;

const CONTROLLER: &str = "ScanConfigWatcher";

pub struct ScanConfigWatcher {
    backend: Arc<dyn Backend>,
    config: ScanConfigWatcherConfig,
}

impl ScanConfigWatcher {
    pub fn new(backend: Arc<dyn Backend>, config: ScanConfigWatcherConfig) -> Self {
        Self { backend, config }
    }

    /// Window evaluated on every reconcile: twice the poll period, so
    /// consecutive polls overlap.
    fn window(&self) -> ScheduleWindow {
        ScheduleWindow::new(Utc::now(), chrono_duration(self.config.settings.poll_period * 2))
    }

    async fn reconcile_unscheduled(&self, scan_config: &ScanConfig) -> anyhow::Result<()> {
        self.backend
            .patch_scan_config(
                scan_config.id,
                ScanConfigPatch {
                    disabled: Some(true),
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("failed to patch ScanConfig. ScanConfigID={}", scan_config.id))
    }

    async fn reconcile_due(
        &self,
        scan_config: &ScanConfig,
        schedule: &ScanConfigSchedule,
    ) -> anyhow::Result<()> {
        self.create_scan(scan_config).await.with_context(|| {
            format!(
                "failed to reconcile new Scan for ScanConfig. ScanConfigID={}",
                scan_config.id
            )
        })?;
        self.reschedule(scan_config, schedule).await
    }

    async fn create_scan(&self, scan_config: &ScanConfig) -> anyhow::Result<()> {
        let filter = ScanFilter {
            scan_config_id: Some(scan_config.id),
            states: StateFilter::NotIn(vec![ScanState::Done, ScanState::Failed]),
        };
        let in_progress = self
            .backend
            .list_scans(&filter)
            .await
            .with_context(|| format!("failed to fetch Scans for ScanConfig. ScanConfigID={}", scan_config.id))?;
        if !in_progress.is_empty() {
            warn!("Skipping ScanConfig as it has Scan(s) already in-progress");
            return Ok(());
        }

        match self.backend.post_scan(scan_config.new_scan(Utc::now())).await {
            Ok(scan) => {
                debug!("Created Scan. ScanID={}", scan.id);
                Ok(())
            }
            Err(err) => match err.conflicting_id() {
                Some(id) => {
                    debug!("Scan already exists. ScanID={}", id);
                    Ok(())
                }
                None => Err(err).context("failed to create new Scan"),
            },
        }
    }

    async fn reschedule(
        &self,
        scan_config: &ScanConfig,
        schedule: &ScanConfigSchedule,
    ) -> anyhow::Result<()> {
        let Some(operation_time) = schedule.next_operation_time() else {
            return Ok(());
        };
        debug!("Next operation time {}", operation_time.to_rfc3339());
        self.backend
            .patch_scan_config(
                scan_config.id,
                ScanConfigPatch {
                    operation_time: Some(operation_time),
                    ..Default::default()
                },
            )
            .await
            .with_context(|| {
                format!(
                    "failed to update operation time for ScanConfig. ScanConfigID={}",
                    scan_config.id
                )
            })
    }
}

#[async_trait]
impl ItemSource<ScanConfigReconcileEvent> for ScanConfigWatcher {
    async fn get_items(&self) -> anyhow::Result<Vec<ScanConfigReconcileEvent>> {
        let scan_configs = self
            .backend
            .list_scan_configs(&ScanConfigFilter { enabled_only: true })
            .await
            .context("failed to get enabled ScanConfigs")?;

        Ok(scan_configs
            .into_iter()
            .map(|scan_config| ScanConfigReconcileEvent {
                scan_config_id: scan_config.id,
            })
            .collect())
    }
}

#[async_trait]
impl Reconcile<ScanConfigReconcileEvent> for ScanConfigWatcher {
    #[instrument(skip(self), fields(controller = CONTROLLER, scan_config_id = %event.scan_config_id))]
    async fn reconcile(&self, event: ScanConfigReconcileEvent) -> ReconcileResult {
        let scan_config = match self.backend.get_scan_config(event.scan_config_id).await {
            Ok(scan_config) => scan_config,
            Err(err) if err.is_not_found() => {
                debug!("ScanConfig no longer exists");
                return Ok(());
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to fetch ScanConfig. {}", event))
                    .into())
            }
        };

        let schedule = ScanConfigSchedule::evaluate(&scan_config, self.window())
            .context("failed to create new ScanConfig schedule")?;

        match schedule.state {
            ScheduleState::Disabled => debug!("Skipping ScanConfig as it is disabled"),
            ScheduleState::NotDue => debug!("Skipping ScanConfig due to schedule: {}", schedule),
            ScheduleState::Unscheduled => {
                debug!("Disable unscheduled ScanConfig");
                self.reconcile_unscheduled(&scan_config)
                    .await
                    .context("failed to disable unscheduled ScanConfig")?;
            }
            ScheduleState::Due => {
                debug!("Run new Scan for ScanConfig");
                self.reconcile_due(&scan_config, &schedule).await?;
            }
            ScheduleState::Overdue => {
                debug!("Reschedule overdue ScanConfig");
                self.reschedule(&scan_config, &schedule)
                    .await
                    .context("failed to reschedule ScanConfig")?;
            }
        }
        Ok(())
    }
}

impl Controller for ScanConfigWatcher {
    fn name(&self) -> &'static str {
        CONTROLLER
    }

    fn start(self: Arc<Self>, token: CancellationToken) -> Vec<JoinHandle<()>> {
        let settings = self.config.settings;
        start_watcher::<ScanConfigReconcileEvent, _>(CONTROLLER, self, &settings, token)
    }
}
