//! File backed provider
//!
//! Reports the assets listed in a JSON inventory on every discovery run.
//! Scanner jobs are accepted and left to an external scanner, which
//! reports results through the backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use tracing::{debug, info};

use vajra_common::{
    Asset, AssetDiscoverer, AssetInfo, AssetScanStats, AssetScanTemplate, CostBreakdownComponent,
    Estimation, Provider, ProviderResult, ScanFamily, ScanJobConfig,
};

/// Scanner VM cost per hour, USD.
const SCANNER_HOURLY_COST: f64 = 0.1;
/// Snapshot storage cost per GB, USD.
const SNAPSHOT_GB_COST: f64 = 0.05;
/// Fallback scan throughput when no earlier scan of the asset exists.
const DEFAULT_SECONDS_PER_GB: u64 = 30;

pub struct InventoryProvider {
    assets: Vec<AssetInfo>,
}

impl InventoryProvider {
    pub fn new(assets: Vec<AssetInfo>) -> Self {
        Self { assets }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read inventory. Path={}", path.display()))?;
        let assets: Vec<AssetInfo> = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse inventory. Path={}", path.display()))?;
        info!("Loaded {} assets from {}", assets.len(), path.display());
        Ok(Self::new(assets))
    }
}

/// Seconds needed to scan `size_gb`, scaled from the previous scan of the
/// asset when its stats carry both time and input size.
fn scan_seconds(stats: &AssetScanStats, family: ScanFamily, size_gb: u64) -> u64 {
    let rate = stats
        .0
        .get(&family)
        .and_then(|s| match (s.scan_time_seconds, s.input_size_mb) {
            (Some(time), Some(mb)) if mb > 0 => Some(time * 1024 / mb),
            _ => None,
        })
        .unwrap_or(DEFAULT_SECONDS_PER_GB);
    rate * size_gb.max(1)
}

#[async_trait]
impl Provider for InventoryProvider {
    fn kind(&self) -> &str {
        "inventory"
    }

    fn discover_assets(&self) -> AssetDiscoverer {
        futures::stream::iter(self.assets.clone().into_iter().map(Ok)).boxed()
    }

    async fn run_asset_scan(&self, config: &ScanJobConfig) -> ProviderResult<()> {
        info!(
            "Accepted scanner job for {}. AssetScanID={}",
            config.asset.asset_info, config.asset_scan_id
        );
        debug!("Scanner config: {}", config.scanner_cli_config);
        Ok(())
    }

    async fn remove_asset_scan(&self, config: &ScanJobConfig) -> ProviderResult<()> {
        info!(
            "Released scanner job for {}. AssetScanID={}",
            config.asset.asset_info, config.asset_scan_id
        );
        Ok(())
    }

    async fn estimate(
        &self,
        stats: &AssetScanStats,
        asset: &Asset,
        template: &AssetScanTemplate,
    ) -> ProviderResult<Estimation> {
        let size = asset.asset_info.size_gb();
        let duration: u64 = template
            .scan_families_config
            .enabled()
            .map(|(family, _)| scan_seconds(stats, family, size))
            .sum();

        let compute = SCANNER_HOURLY_COST * duration as f64 / 3600.0;
        let storage = SNAPSHOT_GB_COST * size as f64;
        Ok(Estimation {
            cost: compute + storage,
            size,
            duration,
            cost_breakdown: vec![
                CostBreakdownComponent {
                    operation: "scanner".into(),
                    cost: compute,
                },
                CostBreakdownComponent {
                    operation: "snapshot".into(),
                    cost: storage,
                },
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vajra_common::{FamilyStats, RootVolume, ScanFamiliesConfig, VmInfo};

    fn vm(id: &str, size_gb: u64) -> AssetInfo {
        AssetInfo::VirtualMachine(VmInfo {
            instance_id: id.into(),
            location: "eu-west-1".into(),
            image: String::new(),
            instance_type: String::new(),
            platform: String::new(),
            tags: vec![],
            root_volume: RootVolume {
                size_gb,
                encrypted: false,
            },
            launch_time: None,
        })
    }

    #[tokio::test]
    async fn test_discover_reports_inventory() {
        let provider = InventoryProvider::new(vec![vm("i-1", 8), vm("i-2", 16)]);
        let found: Vec<_> = provider.discover_assets().collect().await;
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_parse_inventory() {
        let data = r#"[
            {"objectType": "VMInfo", "instanceId": "i-1", "location": "eu-west-1",
             "rootVolume": {"sizeGb": 8, "encrypted": true}},
            {"objectType": "ContainerImageInfo", "imageId": "sha256:abc"}
        ]"#;
        let assets: Vec<AssetInfo> = serde_json::from_str(data).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].size_gb(), 8);
    }

    #[test]
    fn test_from_missing_file() {
        let err = InventoryProvider::from_file(Path::new("/nonexistent/inventory.json"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("failed to read inventory"));
    }

    #[tokio::test]
    async fn test_estimate_from_size() {
        let provider = InventoryProvider::new(vec![]);
        let asset = Asset::new(vm("i-1", 10), Utc::now());
        let template = AssetScanTemplate {
            scan_families_config: ScanFamiliesConfig::default()
                .with_family(ScanFamily::Sbom, vec![])
                .with_family(ScanFamily::Secrets, vec![]),
            ..Default::default()
        };

        let estimation = provider
            .estimate(&AssetScanStats::default(), &asset, &template)
            .await
            .unwrap();
        assert_eq!(estimation.size, 10);
        assert_eq!(estimation.duration, 2 * 10 * DEFAULT_SECONDS_PER_GB);
        assert_eq!(estimation.cost_breakdown.len(), 2);
        assert!(estimation.cost > 0.0);
    }

    #[tokio::test]
    async fn test_estimate_uses_previous_stats() {
        let provider = InventoryProvider::new(vec![]);
        let asset = Asset::new(vm("i-1", 4), Utc::now());
        let template = AssetScanTemplate {
            scan_families_config: ScanFamiliesConfig::default()
                .with_family(ScanFamily::Sbom, vec![]),
            ..Default::default()
        };
        let mut stats = AssetScanStats::default();
        stats.0.insert(
            ScanFamily::Sbom,
            FamilyStats {
                scan_time_seconds: Some(60),
                input_size_mb: Some(2048),
            },
        );

        let estimation = provider.estimate(&stats, &asset, &template).await.unwrap();
        // 60s for 2GB, so 30s per GB over 4GB
        assert_eq!(estimation.duration, 120);
    }
}
