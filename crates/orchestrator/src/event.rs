//! Work items handled by each watcher

use std::fmt;
use uuid::Uuid;

/// Identifies one unit of reconciliation. Two events with the same `key`
/// are the same work item, whatever else they carry.
pub trait ReconcileEvent: Clone + Send + Sync + fmt::Display + 'static {
    fn key(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanReconcileEvent {
    pub scan_id: Uuid,
}

impl ReconcileEvent for ScanReconcileEvent {
    fn key(&self) -> String {
        self.scan_id.to_string()
    }
}

impl fmt::Display for ScanReconcileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScanID={}", self.scan_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetScanReconcileEvent {
    pub asset_scan_id: Uuid,
    pub scan_id: Uuid,
    pub asset_id: Uuid,
}

impl ReconcileEvent for AssetScanReconcileEvent {
    fn key(&self) -> String {
        self.asset_scan_id.to_string()
    }
}

impl fmt::Display for AssetScanReconcileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AssetScanID={} ScanID={} AssetID={}",
            self.asset_scan_id, self.scan_id, self.asset_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanConfigReconcileEvent {
    pub scan_config_id: Uuid,
}

impl ReconcileEvent for ScanConfigReconcileEvent {
    fn key(&self) -> String {
        self.scan_config_id.to_string()
    }
}

impl fmt::Display for ScanConfigReconcileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScanConfigID={}", self.scan_config_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanEstimationReconcileEvent {
    pub scan_estimation_id: Uuid,
}

impl ReconcileEvent for ScanEstimationReconcileEvent {
    fn key(&self) -> String {
        self.scan_estimation_id.to_string()
    }
}

impl fmt::Display for ScanEstimationReconcileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScanEstimationID={}", self.scan_estimation_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetScanEstimationReconcileEvent {
    pub asset_scan_estimation_id: Uuid,
    pub scan_estimation_id: Option<Uuid>,
    pub asset_id: Uuid,
}

impl ReconcileEvent for AssetScanEstimationReconcileEvent {
    fn key(&self) -> String {
        self.asset_scan_estimation_id.to_string()
    }
}

impl fmt::Display for AssetScanEstimationReconcileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetScanEstimationID={}", self.asset_scan_estimation_id)?;
        if let Some(id) = self.scan_estimation_id {
            write!(f, " ScanEstimationID={}", id)?;
        }
        write!(f, " AssetID={}", self.asset_id)
    }
}
