//! Capability traits consumed by the orchestrator
//!
//! - `Backend`: the resource store the watchers read and patch
//! - `Provider`: the infrastructure that discovers assets and runs scanners

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::{BackendResult, ProviderResult};
use crate::query::{
    AssetFilter, AssetPatch, AssetScanEstimationFilter, AssetScanEstimationPatch, AssetScanFilter,
    AssetScanPatch, ScanConfigFilter, ScanConfigPatch, ScanEstimationFilter, ScanEstimationPatch,
    ScanFilter, ScanPatch,
};
use crate::types::{
    Asset, AssetInfo, AssetScan, AssetScanEstimation, AssetScanStats, AssetScanTemplate,
    Estimation, Scan, ScanConfig, ScanEstimation, ScanJobConfig,
};

/// Resource store. `post_*` fails with
/// [`BackendError::Conflict`](crate::error::BackendError::Conflict) naming
/// the existing record when an equivalent resource is already stored.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get_asset(&self, id: Uuid) -> BackendResult<Asset>;
    async fn list_assets(&self, filter: &AssetFilter) -> BackendResult<Vec<Asset>>;
    async fn post_asset(&self, asset: Asset) -> BackendResult<Asset>;
    async fn patch_asset(&self, id: Uuid, patch: AssetPatch) -> BackendResult<()>;

    async fn get_scan(&self, id: Uuid) -> BackendResult<Scan>;
    async fn list_scans(&self, filter: &ScanFilter) -> BackendResult<Vec<Scan>>;
    async fn post_scan(&self, scan: Scan) -> BackendResult<Scan>;
    async fn patch_scan(&self, id: Uuid, patch: ScanPatch) -> BackendResult<()>;

    async fn get_asset_scan(&self, id: Uuid) -> BackendResult<AssetScan>;
    async fn list_asset_scans(&self, filter: &AssetScanFilter) -> BackendResult<Vec<AssetScan>>;
    async fn post_asset_scan(&self, asset_scan: AssetScan) -> BackendResult<AssetScan>;
    async fn patch_asset_scan(&self, id: Uuid, patch: AssetScanPatch) -> BackendResult<()>;

    async fn get_scan_config(&self, id: Uuid) -> BackendResult<ScanConfig>;
    async fn list_scan_configs(&self, filter: &ScanConfigFilter) -> BackendResult<Vec<ScanConfig>>;
    async fn post_scan_config(&self, scan_config: ScanConfig) -> BackendResult<ScanConfig>;
    async fn patch_scan_config(&self, id: Uuid, patch: ScanConfigPatch) -> BackendResult<()>;

    async fn get_scan_estimation(&self, id: Uuid) -> BackendResult<ScanEstimation>;
    async fn list_scan_estimations(
        &self,
        filter: &ScanEstimationFilter,
    ) -> BackendResult<Vec<ScanEstimation>>;
    async fn post_scan_estimation(&self, estimation: ScanEstimation)
        -> BackendResult<ScanEstimation>;
    async fn patch_scan_estimation(&self, id: Uuid, patch: ScanEstimationPatch)
        -> BackendResult<()>;
    async fn delete_scan_estimation(&self, id: Uuid) -> BackendResult<()>;

    async fn get_asset_scan_estimation(&self, id: Uuid) -> BackendResult<AssetScanEstimation>;
    async fn list_asset_scan_estimations(
        &self,
        filter: &AssetScanEstimationFilter,
    ) -> BackendResult<Vec<AssetScanEstimation>>;
    async fn post_asset_scan_estimation(
        &self,
        estimation: AssetScanEstimation,
    ) -> BackendResult<AssetScanEstimation>;
    async fn patch_asset_scan_estimation(
        &self,
        id: Uuid,
        patch: AssetScanEstimationPatch,
    ) -> BackendResult<()>;
    async fn delete_asset_scan_estimation(&self, id: Uuid) -> BackendResult<()>;
}

/// Stream of assets found by a provider during one discovery run.
pub type AssetDiscoverer = BoxStream<'static, ProviderResult<AssetInfo>>;

/// Infrastructure provider (cloud account, container runtime, ...).
///
/// Errors are classified: [`ProviderError::Fatal`](crate::error::ProviderError::Fatal)
/// ends the job, [`ProviderError::Retryable`](crate::error::ProviderError::Retryable)
/// asks to be called again after a delay.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name (e.g. "aws", "docker")
    fn kind(&self) -> &str;

    fn discover_assets(&self) -> AssetDiscoverer;

    /// Provision and start the scanner for one asset scan. Must be
    /// idempotent: it is called again after every retryable error.
    async fn run_asset_scan(&self, config: &ScanJobConfig) -> ProviderResult<()>;

    /// Tear down whatever `run_asset_scan` created.
    async fn remove_asset_scan(&self, config: &ScanJobConfig) -> ProviderResult<()>;

    async fn estimate(
        &self,
        stats: &AssetScanStats,
        asset: &Asset,
        template: &AssetScanTemplate,
    ) -> ProviderResult<Estimation>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::types::{RootVolume, VmInfo};
    use chrono::Utc;
    use futures::StreamExt;

    struct MockProvider;

    #[async_trait]
    impl Provider for MockProvider {
        fn kind(&self) -> &str {
            "mock"
        }

        fn discover_assets(&self) -> AssetDiscoverer {
            let vm = AssetInfo::VirtualMachine(VmInfo {
                instance_id: "i-1".into(),
                location: "local".into(),
                image: String::new(),
                instance_type: String::new(),
                platform: String::new(),
                tags: vec![],
                root_volume: RootVolume::default(),
                launch_time: None,
            });
            futures::stream::iter(vec![Ok(vm)]).boxed()
        }

        async fn run_asset_scan(&self, _config: &ScanJobConfig) -> ProviderResult<()> {
            Err(ProviderError::fatal("unsupported"))
        }

        async fn remove_asset_scan(&self, _config: &ScanJobConfig) -> ProviderResult<()> {
            Ok(())
        }

        async fn estimate(
            &self,
            _stats: &AssetScanStats,
            asset: &Asset,
            _template: &AssetScanTemplate,
        ) -> ProviderResult<Estimation> {
            Ok(Estimation {
                size: asset.asset_info.size_gb(),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_provider_trait() {
        let provider = MockProvider;
        let found: Vec<_> = provider.discover_assets().collect().await;
        assert_eq!(found.len(), 1);

        let asset = Asset::new(found.into_iter().next().unwrap().unwrap(), Utc::now());
        let estimation = provider
            .estimate(&AssetScanStats::default(), &asset, &AssetScanTemplate::default())
            .await
            .unwrap();
        assert_eq!(estimation.size, 0);
    }
}
