//! Per-asset scan job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::scan::{Scan, ScanFamily, ScanFamiliesConfig, ScannerInstanceCreationConfig};
use super::status::Status;
use super::summary::FindingsSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetScanState {
    Pending,
    Scheduled,
    ReadyToScan,
    InProgress,
    Aborted,
    Done,
    Failed,
}

impl AssetScanState {
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, AssetScanState::Done | AssetScanState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetScanReason {
    Created,
    Provisioning,
    ResourcesReady,
    Scanning,
    AbortTimeout,
    Cancellation,
    Error,
    Success,
}

pub type AssetScanStatus = Status<AssetScanState, AssetScanReason>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceCleanupState {
    Pending,
    Skipped,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceCleanupReason {
    AssetScanCreated,
    DeletePolicy,
    ProviderError,
    Success,
}

pub type ResourceCleanupStatus = Status<ResourceCleanupState, ResourceCleanupReason>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FamilyState {
    Pending,
    Skipped,
    InProgress,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FamilyReason {
    Scheduled,
    NotScheduled,
    Scanning,
    Success,
    Error,
}

pub type FamilyStatus = Status<FamilyState, FamilyReason>;

/// Timing and input size one scanner family reported for an asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_time_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_size_mb: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetScanStats(pub BTreeMap<ScanFamily, FamilyStats>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetScan {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub asset_id: Uuid,
    pub status: AssetScanStatus,
    pub resource_cleanup_status: ResourceCleanupStatus,
    #[serde(default)]
    pub families: BTreeMap<ScanFamily, FamilyStatus>,
    #[serde(default)]
    pub scan_families_config: ScanFamiliesConfig,
    #[serde(default)]
    pub scanner_instance_creation_config: ScannerInstanceCreationConfig,
    #[serde(default)]
    pub summary: FindingsSummary,
    #[serde(default)]
    pub stats: AssetScanStats,
}

impl AssetScan {
    /// A `Pending` job for one asset of `scan`. Families disabled in the
    /// scan template start out skipped.
    #[must_use]
    pub fn new_for_scan(scan: &Scan, asset_id: Uuid) -> Self {
        let now = Utc::now();
        let config = &scan.asset_scan_template.scan_families_config;
        let families = ScanFamily::ALL
            .into_iter()
            .map(|family| {
                let status = if config.is_enabled(family) {
                    Status::new(FamilyState::Pending, FamilyReason::Scheduled, None)
                } else {
                    Status::new(FamilyState::Skipped, FamilyReason::NotScheduled, None)
                };
                (family, status.at(now))
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            scan_id: scan.id,
            asset_id,
            status: Status::new(AssetScanState::Pending, AssetScanReason::Created, None).at(now),
            resource_cleanup_status: Status::new(
                ResourceCleanupState::Pending,
                ResourceCleanupReason::AssetScanCreated,
                None,
            )
            .at(now),
            families,
            scan_families_config: config.clone(),
            scanner_instance_creation_config: scan
                .asset_scan_template
                .scanner_instance_creation_config
                .clone(),
            summary: FindingsSummary::default(),
            stats: AssetScanStats::default(),
        }
    }

    /// Time of the last state change, used to pick the latest finished job.
    #[inline]
    #[must_use]
    pub fn last_transition(&self) -> DateTime<Utc> {
        self.status.last_transition_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::scan::{AssetScanTemplate, ScanTemplate};

    #[test]
    fn new_asset_scan_skips_disabled_families() {
        let template = ScanTemplate {
            asset_scan_template: AssetScanTemplate {
                scan_families_config: ScanFamiliesConfig::default()
                    .with_family(ScanFamily::Sbom, vec!["syft".into()]),
                ..Default::default()
            },
            ..Default::default()
        };
        let scan = Scan::new("s", &template);
        let asset_id = Uuid::new_v4();
        let asset_scan = AssetScan::new_for_scan(&scan, asset_id);

        assert_eq!(asset_scan.scan_id, scan.id);
        assert_eq!(asset_scan.asset_id, asset_id);
        assert_eq!(asset_scan.status.state, AssetScanState::Pending);
        assert_eq!(
            asset_scan.resource_cleanup_status.state,
            ResourceCleanupState::Pending
        );
        assert_eq!(
            asset_scan.families[&ScanFamily::Sbom].state,
            FamilyState::Pending
        );
        assert_eq!(
            asset_scan.families[&ScanFamily::Malware].state,
            FamilyState::Skipped
        );
    }
}
