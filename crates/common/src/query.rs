//! Typed list filters and partial-update documents for the backend
//!
//! A filter's `matches` is the reference semantics every backend must
//! reproduce. Patch fields left as `None` keep the stored value.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{
    Asset, AssetInfo, AssetScan, AssetScanEstimation, AssetScanEstimationState,
    AssetScanEstimationStatus, AssetScanState, AssetScanStats, AssetScanStatus, AssetScope,
    Estimation, FindingsSummary, ResourceCleanupState, ResourceCleanupStatus, Scan, ScanConfig,
    ScanEstimation, ScanEstimationState, ScanEstimationStatus, ScanEstimationSummary, ScanState,
    ScanStatus, ScanSummary,
};

/// Restricts a listing by lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateFilter<S> {
    Any,
    In(Vec<S>),
    NotIn(Vec<S>),
}

impl<S> Default for StateFilter<S> {
    fn default() -> Self {
        StateFilter::Any
    }
}

impl<S: PartialEq> StateFilter<S> {
    #[must_use]
    pub fn matches(&self, state: &S) -> bool {
        match self {
            StateFilter::Any => true,
            StateFilter::In(states) => states.contains(state),
            StateFilter::NotIn(states) => !states.contains(state),
        }
    }

    /// Resources without a status only match `Any` and `NotIn`.
    #[must_use]
    pub fn matches_optional(&self, state: Option<&S>) -> bool {
        match (self, state) {
            (_, Some(state)) => self.matches(state),
            (StateFilter::In(_), None) => false,
            (_, None) => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    pub scope: Option<AssetScope>,
    pub include_terminated: bool,
    pub last_seen_before: Option<DateTime<Utc>>,
}

impl AssetFilter {
    /// Live assets matching `scope`.
    #[must_use]
    pub fn in_scope(scope: &AssetScope) -> Self {
        Self {
            scope: Some(scope.clone()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn matches(&self, asset: &Asset) -> bool {
        if !self.include_terminated && asset.is_terminated() {
            return false;
        }
        if let Some(before) = self.last_seen_before {
            if asset.last_seen >= before {
                return false;
            }
        }
        self.scope
            .as_ref()
            .map_or(true, |scope| scope.matches(&asset.asset_info))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub scan_config_id: Option<Uuid>,
    pub states: StateFilter<ScanState>,
}

impl ScanFilter {
    #[must_use]
    pub fn matches(&self, scan: &Scan) -> bool {
        if self.scan_config_id.is_some() && scan.scan_config_id != self.scan_config_id {
            return false;
        }
        self.states.matches(&scan.status.state)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetScanFilter {
    pub scan_id: Option<Uuid>,
    pub asset_id: Option<Uuid>,
    pub states: StateFilter<AssetScanState>,
    pub cleanup_states: StateFilter<ResourceCleanupState>,
    /// Only jobs that are still running or still need their resources cleaned up.
    pub reconcilable: bool,
}

impl AssetScanFilter {
    #[must_use]
    pub fn for_scan(scan_id: Uuid) -> Self {
        Self {
            scan_id: Some(scan_id),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn matches(&self, asset_scan: &AssetScan) -> bool {
        if self.scan_id.is_some_and(|id| id != asset_scan.scan_id) {
            return false;
        }
        if self.asset_id.is_some_and(|id| id != asset_scan.asset_id) {
            return false;
        }
        if !self.states.matches(&asset_scan.status.state)
            || !self
                .cleanup_states
                .matches(&asset_scan.resource_cleanup_status.state)
        {
            return false;
        }
        !self.reconcilable
            || !asset_scan.status.state.is_terminal()
            || asset_scan.resource_cleanup_status.state == ResourceCleanupState::Pending
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanConfigFilter {
    pub enabled_only: bool,
}

impl ScanConfigFilter {
    #[must_use]
    pub fn matches(&self, scan_config: &ScanConfig) -> bool {
        !self.enabled_only || !scan_config.disabled
    }
}

/// Shared "still needs attention" rule for estimation resources: not
/// finished yet, or finished but not yet garbage collected.
fn estimation_reconcilable(
    terminal: bool,
    delete_after: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    !terminal || delete_after.map_or(true, |deadline| deadline < now)
}

#[derive(Debug, Clone, Default)]
pub struct ScanEstimationFilter {
    pub states: StateFilter<ScanEstimationState>,
    pub reconcilable: bool,
}

impl ScanEstimationFilter {
    #[must_use]
    pub fn matches(&self, estimation: &ScanEstimation, now: DateTime<Utc>) -> bool {
        let state = estimation.state();
        if !self.states.matches_optional(state.as_ref()) {
            return false;
        }
        !self.reconcilable
            || estimation_reconcilable(
                state.is_some_and(|s| s.is_terminal()),
                estimation.delete_after,
                now,
            )
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetScanEstimationFilter {
    pub scan_estimation_id: Option<Uuid>,
    pub states: StateFilter<AssetScanEstimationState>,
    pub reconcilable: bool,
}

impl AssetScanEstimationFilter {
    #[must_use]
    pub fn matches(&self, estimation: &AssetScanEstimation, now: DateTime<Utc>) -> bool {
        if self.scan_estimation_id.is_some()
            && estimation.scan_estimation_id != self.scan_estimation_id
        {
            return false;
        }
        let state = estimation.state();
        if !self.states.matches_optional(state.as_ref()) {
            return false;
        }
        !self.reconcilable
            || estimation_reconcilable(
                state.is_some_and(|s| s.is_terminal()),
                estimation.delete_after,
                now,
            )
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetPatch {
    pub asset_info: Option<AssetInfo>,
    pub last_seen: Option<DateTime<Utc>>,
    pub terminated_on: Option<DateTime<Utc>>,
}

impl AssetPatch {
    pub fn apply(self, asset: &mut Asset) {
        if let Some(info) = self.asset_info {
            asset.asset_info = info;
        }
        if let Some(last_seen) = self.last_seen {
            asset.last_seen = last_seen;
        }
        if let Some(terminated_on) = self.terminated_on {
            asset.terminated_on = Some(terminated_on);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanPatch {
    pub status: Option<ScanStatus>,
    pub asset_ids: Option<Vec<Uuid>>,
    pub summary: Option<ScanSummary>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ScanPatch {
    #[must_use]
    pub fn status(status: ScanStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply(self, scan: &mut Scan) {
        if let Some(status) = self.status {
            scan.status = status;
        }
        if let Some(asset_ids) = self.asset_ids {
            scan.asset_ids = asset_ids;
        }
        if let Some(summary) = self.summary {
            scan.summary = summary;
        }
        if let Some(start_time) = self.start_time {
            scan.start_time = Some(start_time);
        }
        if let Some(end_time) = self.end_time {
            scan.end_time = Some(end_time);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetScanPatch {
    pub status: Option<AssetScanStatus>,
    pub resource_cleanup_status: Option<ResourceCleanupStatus>,
    pub summary: Option<FindingsSummary>,
    pub stats: Option<AssetScanStats>,
}

impl AssetScanPatch {
    #[must_use]
    pub fn status(status: AssetScanStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn cleanup(status: ResourceCleanupStatus) -> Self {
        Self {
            resource_cleanup_status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply(self, asset_scan: &mut AssetScan) {
        if let Some(status) = self.status {
            asset_scan.status = status;
        }
        if let Some(status) = self.resource_cleanup_status {
            asset_scan.resource_cleanup_status = status;
        }
        if let Some(summary) = self.summary {
            asset_scan.summary = summary;
        }
        if let Some(stats) = self.stats {
            asset_scan.stats = stats;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanConfigPatch {
    pub operation_time: Option<DateTime<Utc>>,
    pub disabled: Option<bool>,
}

impl ScanConfigPatch {
    pub fn apply(self, scan_config: &mut ScanConfig) {
        if let Some(operation_time) = self.operation_time {
            scan_config.scheduled.operation_time = Some(operation_time);
        }
        if let Some(disabled) = self.disabled {
            scan_config.disabled = disabled;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanEstimationPatch {
    pub status: Option<ScanEstimationStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub ttl_seconds_after_finished: Option<u64>,
    pub delete_after: Option<DateTime<Utc>>,
    pub asset_ids: Option<Vec<Uuid>>,
    pub asset_scan_estimation_ids: Option<Vec<Uuid>>,
    pub summary: Option<ScanEstimationSummary>,
}

impl ScanEstimationPatch {
    #[must_use]
    pub fn status(status: ScanEstimationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply(self, estimation: &mut ScanEstimation) {
        if let Some(status) = self.status {
            estimation.status = Some(status);
        }
        if let Some(start_time) = self.start_time {
            estimation.start_time = Some(start_time);
        }
        if let Some(end_time) = self.end_time {
            estimation.end_time = Some(end_time);
        }
        if let Some(ttl) = self.ttl_seconds_after_finished {
            estimation.ttl_seconds_after_finished = Some(ttl);
        }
        if let Some(delete_after) = self.delete_after {
            estimation.delete_after = Some(delete_after);
        }
        if let Some(asset_ids) = self.asset_ids {
            estimation.asset_ids = asset_ids;
        }
        if let Some(ids) = self.asset_scan_estimation_ids {
            estimation.asset_scan_estimation_ids = ids;
        }
        if let Some(summary) = self.summary {
            estimation.summary = summary;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetScanEstimationPatch {
    pub status: Option<AssetScanEstimationStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub ttl_seconds_after_finished: Option<u64>,
    pub delete_after: Option<DateTime<Utc>>,
    pub estimation: Option<Estimation>,
}

impl AssetScanEstimationPatch {
    #[must_use]
    pub fn status(status: AssetScanEstimationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply(self, estimation: &mut AssetScanEstimation) {
        if let Some(status) = self.status {
            estimation.status = Some(status);
        }
        if let Some(start_time) = self.start_time {
            estimation.start_time = Some(start_time);
        }
        if let Some(end_time) = self.end_time {
            estimation.end_time = Some(end_time);
        }
        if let Some(ttl) = self.ttl_seconds_after_finished {
            estimation.ttl_seconds_after_finished = Some(ttl);
        }
        if let Some(delete_after) = self.delete_after {
            estimation.delete_after = Some(delete_after);
        }
        if let Some(result) = self.estimation {
            estimation.estimation = Some(result);
        }
    }
}
