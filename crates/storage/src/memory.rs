// crates/storage/src/memory.rs
//! In-process backend with the same not-found / conflict semantics as the
//! REST backend.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use vajra_common::query::{
    AssetFilter, AssetPatch, AssetScanEstimationFilter, AssetScanEstimationPatch, AssetScanFilter,
    AssetScanPatch, ScanConfigFilter, ScanConfigPatch, ScanEstimationFilter, ScanEstimationPatch,
    ScanFilter, ScanPatch,
};
use vajra_common::{
    Asset, AssetScan, AssetScanEstimation, Backend, BackendError, BackendResult, Scan, ScanConfig,
    ScanEstimation,
};

#[derive(Default)]
struct Store {
    assets: BTreeMap<Uuid, Asset>,
    scans: BTreeMap<Uuid, Scan>,
    asset_scans: BTreeMap<Uuid, AssetScan>,
    scan_configs: BTreeMap<Uuid, ScanConfig>,
    scan_estimations: BTreeMap<Uuid, ScanEstimation>,
    asset_scan_estimations: BTreeMap<Uuid, AssetScanEstimation>,
}

/// Backend keeping every resource in memory behind a single lock.
#[derive(Default)]
pub struct MemoryBackend {
    store: RwLock<Store>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn get<T: Clone>(map: &BTreeMap<Uuid, T>, kind: &'static str, id: Uuid) -> BackendResult<T> {
    map.get(&id)
        .cloned()
        .ok_or(BackendError::NotFound { kind, id })
}

fn get_mut<'a, T>(
    map: &'a mut BTreeMap<Uuid, T>,
    kind: &'static str,
    id: Uuid,
) -> BackendResult<&'a mut T> {
    map.get_mut(&id).ok_or(BackendError::NotFound { kind, id })
}

fn ensure_absent<T>(map: &BTreeMap<Uuid, T>, kind: &'static str, id: Uuid) -> BackendResult<()> {
    if map.contains_key(&id) {
        return Err(BackendError::Conflict { kind, id });
    }
    Ok(())
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_asset(&self, id: Uuid) -> BackendResult<Asset> {
        get(&self.store.read().await.assets, "Asset", id)
    }

    async fn list_assets(&self, filter: &AssetFilter) -> BackendResult<Vec<Asset>> {
        let store = self.store.read().await;
        Ok(store
            .assets
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn post_asset(&self, asset: Asset) -> BackendResult<Asset> {
        let mut store = self.store.write().await;
        ensure_absent(&store.assets, "Asset", asset.id)?;
        let identity = asset.asset_info.identity();
        if let Some(existing) = store
            .assets
            .values()
            .find(|a| a.asset_info.identity() == identity)
        {
            return Err(BackendError::Conflict {
                kind: "Asset",
                id: existing.id,
            });
        }
        debug!("Created Asset {} ({})", asset.id, identity);
        store.assets.insert(asset.id, asset.clone());
        Ok(asset)
    }

    async fn patch_asset(&self, id: Uuid, patch: AssetPatch) -> BackendResult<()> {
        let mut store = self.store.write().await;
        patch.apply(get_mut(&mut store.assets, "Asset", id)?);
        Ok(())
    }

    async fn get_scan(&self, id: Uuid) -> BackendResult<Scan> {
        get(&self.store.read().await.scans, "Scan", id)
    }

    async fn list_scans(&self, filter: &ScanFilter) -> BackendResult<Vec<Scan>> {
        let store = self.store.read().await;
        Ok(store
            .scans
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn post_scan(&self, scan: Scan) -> BackendResult<Scan> {
        let mut store = self.store.write().await;
        ensure_absent(&store.scans, "Scan", scan.id)?;
        if let Some(config_id) = scan.scan_config_id {
            // one unfinished scan per scan config
            if let Some(running) = store.scans.values().find(|s| {
                s.scan_config_id == Some(config_id) && !s.status.state.is_terminal()
            }) {
                return Err(BackendError::Conflict {
                    kind: "Scan",
                    id: running.id,
                });
            }
        }
        debug!("Created Scan {}", scan.id);
        store.scans.insert(scan.id, scan.clone());
        Ok(scan)
    }

    async fn patch_scan(&self, id: Uuid, patch: ScanPatch) -> BackendResult<()> {
        let mut store = self.store.write().await;
        patch.apply(get_mut(&mut store.scans, "Scan", id)?);
        Ok(())
    }

    async fn get_asset_scan(&self, id: Uuid) -> BackendResult<AssetScan> {
        get(&self.store.read().await.asset_scans, "AssetScan", id)
    }

    async fn list_asset_scans(&self, filter: &AssetScanFilter) -> BackendResult<Vec<AssetScan>> {
        let store = self.store.read().await;
        Ok(store
            .asset_scans
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn post_asset_scan(&self, asset_scan: AssetScan) -> BackendResult<AssetScan> {
        let mut store = self.store.write().await;
        ensure_absent(&store.asset_scans, "AssetScan", asset_scan.id)?;
        if !store.scans.contains_key(&asset_scan.scan_id) {
            return Err(BackendError::Validation(format!(
                "AssetScan references unknown Scan {}",
                asset_scan.scan_id
            )));
        }
        if let Some(existing) = store.asset_scans.values().find(|a| {
            a.scan_id == asset_scan.scan_id && a.asset_id == asset_scan.asset_id
        }) {
            return Err(BackendError::Conflict {
                kind: "AssetScan",
                id: existing.id,
            });
        }
        debug!(
            "Created AssetScan {} scan={} asset={}",
            asset_scan.id, asset_scan.scan_id, asset_scan.asset_id
        );
        store.asset_scans.insert(asset_scan.id, asset_scan.clone());
        Ok(asset_scan)
    }

    async fn patch_asset_scan(&self, id: Uuid, patch: AssetScanPatch) -> BackendResult<()> {
        let mut store = self.store.write().await;
        patch.apply(get_mut(&mut store.asset_scans, "AssetScan", id)?);
        Ok(())
    }

    async fn get_scan_config(&self, id: Uuid) -> BackendResult<ScanConfig> {
        get(&self.store.read().await.scan_configs, "ScanConfig", id)
    }

    async fn list_scan_configs(&self, filter: &ScanConfigFilter) -> BackendResult<Vec<ScanConfig>> {
        let store = self.store.read().await;
        Ok(store
            .scan_configs
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    async fn post_scan_config(&self, scan_config: ScanConfig) -> BackendResult<ScanConfig> {
        let mut store = self.store.write().await;
        ensure_absent(&store.scan_configs, "ScanConfig", scan_config.id)?;
        if let Some(existing) = store
            .scan_configs
            .values()
            .find(|c| c.name == scan_config.name)
        {
            return Err(BackendError::Conflict {
                kind: "ScanConfig",
                id: existing.id,
            });
        }
        store.scan_configs.insert(scan_config.id, scan_config.clone());
        Ok(scan_config)
    }

    async fn patch_scan_config(&self, id: Uuid, patch: ScanConfigPatch) -> BackendResult<()> {
        let mut store = self.store.write().await;
        patch.apply(get_mut(&mut store.scan_configs, "ScanConfig", id)?);
        Ok(())
    }

    async fn get_scan_estimation(&self, id: Uuid) -> BackendResult<ScanEstimation> {
        get(&self.store.read().await.scan_estimations, "ScanEstimation", id)
    }

    async fn list_scan_estimations(
        &self,
        filter: &ScanEstimationFilter,
    ) -> BackendResult<Vec<ScanEstimation>> {
        let now = Utc::now();
        let store = self.store.read().await;
        Ok(store
            .scan_estimations
            .values()
            .filter(|e| filter.matches(e, now))
            .cloned()
            .collect())
    }

    async fn post_scan_estimation(
        &self,
        estimation: ScanEstimation,
    ) -> BackendResult<ScanEstimation> {
        let mut store = self.store.write().await;
        ensure_absent(&store.scan_estimations, "ScanEstimation", estimation.id)?;
        store.scan_estimations.insert(estimation.id, estimation.clone());
        Ok(estimation)
    }

    async fn patch_scan_estimation(
        &self,
        id: Uuid,
        patch: ScanEstimationPatch,
    ) -> BackendResult<()> {
        let mut store = self.store.write().await;
        patch.apply(get_mut(&mut store.scan_estimations, "ScanEstimation", id)?);
        Ok(())
    }

    async fn delete_scan_estimation(&self, id: Uuid) -> BackendResult<()> {
        let mut store = self.store.write().await;
        store
            .scan_estimations
            .remove(&id)
            .map(|_| debug!("Deleted ScanEstimation {}", id))
            .ok_or(BackendError::NotFound {
                kind: "ScanEstimation",
                id,
            })
    }

    async fn get_asset_scan_estimation(&self, id: Uuid) -> BackendResult<AssetScanEstimation> {
        get(
            &self.store.read().await.asset_scan_estimations,
            "AssetScanEstimation",
            id,
        )
    }

    async fn list_asset_scan_estimations(
        &self,
        filter: &AssetScanEstimationFilter,
    ) -> BackendResult<Vec<AssetScanEstimation>> {
        let now = Utc::now();
        let store = self.store.read().await;
        Ok(store
            .asset_scan_estimations
            .values()
            .filter(|e| filter.matches(e, now))
            .cloned()
            .collect())
    }

    async fn post_asset_scan_estimation(
        &self,
        estimation: AssetScanEstimation,
    ) -> BackendResult<AssetScanEstimation> {
        let mut store = self.store.write().await;
        ensure_absent(
            &store.asset_scan_estimations,
            "AssetScanEstimation",
            estimation.id,
        )?;
        if let Some(parent) = estimation.scan_estimation_id {
            if let Some(existing) = store.asset_scan_estimations.values().find(|e| {
                e.scan_estimation_id == Some(parent) && e.asset_id == estimation.asset_id
            }) {
                return Err(BackendError::Conflict {
                    kind: "AssetScanEstimation",
                    id: existing.id,
                });
            }
        }
        store
            .asset_scan_estimations
            .insert(estimation.id, estimation.clone());
        Ok(estimation)
    }

    async fn patch_asset_scan_estimation(
        &self,
        id: Uuid,
        patch: AssetScanEstimationPatch,
    ) -> BackendResult<()> {
        let mut store = self.store.write().await;
        patch.apply(get_mut(
            &mut store.asset_scan_estimations,
            "AssetScanEstimation",
            id,
        )?);
        Ok(())
    }

    async fn delete_asset_scan_estimation(&self, id: Uuid) -> BackendResult<()> {
        let mut store = self.store.write().await;
        store
            .asset_scan_estimations
            .remove(&id)
            .map(|_| debug!("Deleted AssetScanEstimation {}", id))
            .ok_or(BackendError::NotFound {
                kind: "AssetScanEstimation",
                id,
            })
    }
}
