//! Resource model for the scan orchestrator
//!
//! Resources mirror what the backend stores: assets, scans and their
//! per-asset jobs, schedulable scan configs, and estimations. Fields are
//! public; constructors fill in the initial lifecycle status.

pub mod asset;
pub mod asset_scan;
pub mod estimation;
pub mod job;
pub mod scan;
pub mod scan_config;
pub mod status;
pub mod summary;

pub use asset::{
    Asset, AssetInfo, AssetKind, AssetScope, ContainerImageInfo, ContainerInfo, RootVolume, Tag,
    VmInfo,
};
pub use asset_scan::{
    AssetScan, AssetScanReason, AssetScanState, AssetScanStats, AssetScanStatus, FamilyReason,
    FamilyState, FamilyStats, FamilyStatus, ResourceCleanupReason, ResourceCleanupState,
    ResourceCleanupStatus,
};
pub use estimation::{
    AssetScanEstimation, AssetScanEstimationReason, AssetScanEstimationState,
    AssetScanEstimationStatus, CostBreakdownComponent, Estimation, ScanEstimation,
    ScanEstimationReason, ScanEstimationState, ScanEstimationStatus, ScanEstimationSummary,
};
pub use job::ScanJobConfig;
pub use scan::{
    AssetScanTemplate, FamilyConfig, Scan, ScanFamiliesConfig, ScanFamily, ScanReason, ScanState,
    ScanStatus, ScanSummary, ScanTemplate, ScannerInstanceCreationConfig,
};
pub use scan_config::{RuntimeSchedule, ScanConfig};
pub use status::Status;
pub use summary::{FindingsSummary, VulnerabilitySummary};
