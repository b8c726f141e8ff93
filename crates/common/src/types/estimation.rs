//! Cost and duration estimation resources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scan::{AssetScanTemplate, ScanTemplate};
use super::status::Status;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdownComponent {
    pub operation: String,
    pub cost: f64,
}

/// Result of estimating one asset scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimation {
    /// Estimated cost in USD.
    pub cost: f64,
    /// Estimated input size in GB.
    pub size: u64,
    /// Estimated duration in seconds.
    pub duration: u64,
    #[serde(default)]
    pub cost_breakdown: Vec<CostBreakdownComponent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanEstimationState {
    Pending,
    Discovered,
    InProgress,
    Aborted,
    Done,
    Failed,
}

impl ScanEstimationState {
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, ScanEstimationState::Done | ScanEstimationState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanEstimationReason {
    Created,
    SuccessfulDiscovery,
    NothingToEstimate,
    Running,
    Success,
    Aborted,
    Error,
    Timeout,
}

pub type ScanEstimationStatus = Status<ScanEstimationState, ScanEstimationReason>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEstimationSummary {
    pub jobs_completed: u32,
    pub jobs_left_to_run: u32,
    /// Seconds.
    pub total_scan_time: u64,
    /// GB.
    pub total_scan_size: u64,
    /// USD.
    pub total_scan_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEstimation {
    pub id: Uuid,
    #[serde(default)]
    pub scan_template: ScanTemplate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ScanEstimationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_after_finished: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub asset_ids: Vec<Uuid>,
    #[serde(default)]
    pub asset_scan_estimation_ids: Vec<Uuid>,
    #[serde(default)]
    pub summary: ScanEstimationSummary,
}

impl ScanEstimation {
    /// A fresh estimation with no status yet.
    #[must_use]
    pub fn new(scan_template: ScanTemplate) -> Self {
        Self {
            id: Uuid::new_v4(),
            scan_template,
            status: None,
            start_time: None,
            end_time: None,
            ttl_seconds_after_finished: None,
            delete_after: None,
            asset_ids: Vec::new(),
            asset_scan_estimation_ids: Vec::new(),
            summary: ScanEstimationSummary::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> Option<ScanEstimationState> {
        self.status.as_ref().map(|s| s.state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetScanEstimationState {
    Pending,
    Aborted,
    Done,
    Failed,
}

impl AssetScanEstimationState {
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssetScanEstimationState::Done | AssetScanEstimationState::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetScanEstimationReason {
    Created,
    Success,
    Aborted,
    Error,
}

pub type AssetScanEstimationStatus = Status<AssetScanEstimationState, AssetScanEstimationReason>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetScanEstimation {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_estimation_id: Option<Uuid>,
    pub asset_id: Uuid,
    #[serde(default)]
    pub asset_scan_template: AssetScanTemplate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AssetScanEstimationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_after_finished: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimation: Option<Estimation>,
}

impl AssetScanEstimation {
    #[must_use]
    pub fn new(asset_id: Uuid, asset_scan_template: AssetScanTemplate) -> Self {
        Self {
            id: Uuid::new_v4(),
            scan_estimation_id: None,
            asset_id,
            asset_scan_template,
            status: None,
            start_time: None,
            end_time: None,
            ttl_seconds_after_finished: None,
            delete_after: None,
            estimation: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_scan_estimation(mut self, scan_estimation_id: Uuid) -> Self {
        self.scan_estimation_id = Some(scan_estimation_id);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds_after_finished = Some(ttl_seconds);
        self
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> Option<AssetScanEstimationState> {
        self.status.as_ref().map(|s| s.state)
    }
}
