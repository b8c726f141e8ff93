//! Test doubles shared by the watcher tests

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use vajra_common::query::{
    AssetFilter, AssetPatch, AssetScanEstimationFilter, AssetScanEstimationPatch, AssetScanFilter,
    AssetScanPatch, ScanConfigFilter, ScanConfigPatch, ScanEstimationFilter, ScanEstimationPatch,
    ScanFilter, ScanPatch,
};
use vajra_common::{
    Asset, AssetDiscoverer, AssetInfo, AssetScan, AssetScanEstimation, AssetScanStats,
    AssetScanTemplate, Backend, BackendError, BackendResult, Estimation, ProviderResult, Provider,
    RootVolume, Scan, ScanConfig, ScanEstimation, ScanJobConfig, Tag, VmInfo,
};
use vajra_storage::MemoryBackend;

/// Provider whose answers are scripted per call; an empty script succeeds.
#[derive(Default)]
pub(crate) struct FakeProvider {
    pub assets: Mutex<Vec<ProviderResult<AssetInfo>>>,
    pub run_results: Mutex<VecDeque<ProviderResult<()>>>,
    pub remove_results: Mutex<VecDeque<ProviderResult<()>>>,
    pub estimate_results: Mutex<VecDeque<ProviderResult<Estimation>>>,
    pub run_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub estimate_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn kind(&self) -> &str {
        "fake"
    }

    fn discover_assets(&self) -> AssetDiscoverer {
        let found: Vec<_> = self.assets.lock().drain(..).collect();
        futures::stream::iter(found).boxed()
    }

    async fn run_asset_scan(&self, _config: &ScanJobConfig) -> ProviderResult<()> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        self.run_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn remove_asset_scan(&self, _config: &ScanJobConfig) -> ProviderResult<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.remove_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn estimate(
        &self,
        _stats: &AssetScanStats,
        asset: &Asset,
        _template: &AssetScanTemplate,
    ) -> ProviderResult<Estimation> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        self.estimate_results.lock().pop_front().unwrap_or_else(|| {
            Ok(Estimation {
                cost: 0.5,
                size: asset.asset_info.size_gb(),
                duration: 600,
                cost_breakdown: Vec::new(),
            })
        })
    }
}

pub(crate) fn vm(instance_id: &str, location: &str) -> AssetInfo {
    AssetInfo::VirtualMachine(VmInfo {
        instance_id: instance_id.to_string(),
        location: location.to_string(),
        image: "ami-123".to_string(),
        instance_type: "t3.large".to_string(),
        platform: "Linux".to_string(),
        tags: vec![Tag::new("env", "test")],
        root_volume: RootVolume {
            size_gb: 8,
            encrypted: false,
        },
        launch_time: None,
    })
}

/// Store `count` live VMs in `location` and return their ids.
pub(crate) async fn seed_vms(backend: &MemoryBackend, location: &str, count: usize) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let asset = backend
            .post_asset(Asset::new(vm(&format!("i-{location}-{i}"), location), Utc::now()))
            .await
            .unwrap();
        ids.push(asset.id);
    }
    ids
}

pub(crate) fn backend() -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::new())
}

/// Backend over a [`MemoryBackend`] that rejects writes touching chosen ids:
/// `post_asset_scan` for an asset id, `patch_asset_scan` and
/// `patch_asset_scan_estimation` for a resource id.
pub(crate) struct FaultyBackend {
    pub inner: Arc<MemoryBackend>,
    failing: Mutex<HashSet<Uuid>>,
}

impl FaultyBackend {
    pub fn new(inner: Arc<MemoryBackend>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        })
    }

    pub fn fail(&self, id: Uuid) {
        self.failing.lock().insert(id);
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    fn check(&self, id: Uuid) -> BackendResult<()> {
        if self.failing.lock().contains(&id) {
            return Err(BackendError::Transport(format!("connection reset writing {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for FaultyBackend {
    async fn get_asset(&self, id: Uuid) -> BackendResult<Asset> {
        self.inner.get_asset(id).await
    }
    async fn list_assets(&self, filter: &AssetFilter) -> BackendResult<Vec<Asset>> {
        self.inner.list_assets(filter).await
    }
    async fn post_asset(&self, asset: Asset) -> BackendResult<Asset> {
        self.inner.post_asset(asset).await
    }
    async fn patch_asset(&self, id: Uuid, patch: AssetPatch) -> BackendResult<()> {
        self.inner.patch_asset(id, patch).await
    }

    async fn get_scan(&self, id: Uuid) -> BackendResult<Scan> {
        self.inner.get_scan(id).await
    }
    async fn list_scans(&self, filter: &ScanFilter) -> BackendResult<Vec<Scan>> {
        self.inner.list_scans(filter).await
    }
    async fn post_scan(&self, scan: Scan) -> BackendResult<Scan> {
        self.inner.post_scan(scan).await
    }
    async fn patch_scan(&self, id: Uuid, patch: ScanPatch) -> BackendResult<()> {
        self.inner.patch_scan(id, patch).await
    }

    async fn get_asset_scan(&self, id: Uuid) -> BackendResult<AssetScan> {
        self.inner.get_asset_scan(id).await
    }
    async fn list_asset_scans(&self, filter: &AssetScanFilter) -> BackendResult<Vec<AssetScan>> {
        self.inner.list_asset_scans(filter).await
    }
    async fn post_asset_scan(&self, asset_scan: AssetScan) -> BackendResult<AssetScan> {
        self.check(asset_scan.asset_id)?;
        self.inner.post_asset_scan(asset_scan).await
    }
    async fn patch_asset_scan(&self, id: Uuid, patch: AssetScanPatch) -> BackendResult<()> {
        self.check(id)?;
        self.inner.patch_asset_scan(id, patch).await
    }

    async fn get_scan_config(&self, id: Uuid) -> BackendResult<ScanConfig> {
        self.inner.get_scan_config(id).await
    }
    async fn list_scan_configs(&self, filter: &ScanConfigFilter) -> BackendResult<Vec<ScanConfig>> {
        self.inner.list_scan_configs(filter).await
    }
    async fn post_scan_config(&self, scan_config: ScanConfig) -> BackendResult<ScanConfig> {
        self.inner.post_scan_config(scan_config).await
    }
    async fn patch_scan_config(&self, id: Uuid, patch: ScanConfigPatch) -> BackendResult<()> {
        self.inner.patch_scan_config(id, patch).await
    }

    async fn get_scan_estimation(&self, id: Uuid) -> BackendResult<ScanEstimation> {
        self.inner.get_scan_estimation(id).await
    }
    async fn list_scan_estimations(
        &self,
        filter: &ScanEstimationFilter,
    ) -> BackendResult<Vec<ScanEstimation>> {
        self.inner.list_scan_estimations(filter).await
    }
    async fn post_scan_estimation(
        &self,
        estimation: ScanEstimation,
    ) -> BackendResult<ScanEstimation> {
        self.inner.post_scan_estimation(estimation).await
    }
    async fn patch_scan_estimation(
        &self,
        id: Uuid,
        patch: ScanEstimationPatch,
    ) -> BackendResult<()> {
        self.inner.patch_scan_estimation(id, patch).await
    }
    async fn delete_scan_estimation(&self, id: Uuid) -> BackendResult<()> {
        self.inner.delete_scan_estimation(id).await
    }

    async fn get_asset_scan_estimation(&self, id: Uuid) -> BackendResult<AssetScanEstimation> {
        self.inner.get_asset_scan_estimation(id).await
    }
    async fn list_asset_scan_estimations(
        &self,
        filter: &AssetScanEstimationFilter,
    ) -> BackendResult<Vec<AssetScanEstimation>> {
        self.inner.list_asset_scan_estimations(filter).await
    }
    async fn post_asset_scan_estimation(
        &self,
        estimation: AssetScanEstimation,
    ) -> BackendResult<AssetScanEstimation> {
        self.inner.post_asset_scan_estimation(estimation).await
    }
    async fn patch_asset_scan_estimation(
        &self,
        id: Uuid,
        patch: AssetScanEstimationPatch,
    ) -> BackendResult<()> {
        self.check(id)?;
        self.inner.patch_asset_scan_estimation(id, patch).await
    }
    async fn delete_asset_scan_estimation(&self, id: Uuid) -> BackendResult<()> {
        self.inner.delete_asset_scan_estimation(id).await
    }
}
