// crates/orchestrator/src/discoverer.rs
//! Periodic asset discovery.
//!
//! Every run drains the provider's asset stream into the backend:
//! - new assets are created with `first_seen = last_seen = discovery time`
//! - known assets get their info merged and `last_seen` refreshed
//! - live assets not seen by this run are marked terminated

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vajra_common::query::{AssetFilter, AssetPatch};
use vajra_common::{Asset, AssetInfo, Backend, BackendError, Provider};

use crate::config::DiscoveryConfig;
use crate::orchestrator::Controller;

const CONTROLLER: &str = "AssetDiscoverer";

pub struct AssetDiscoverer {
    backend: Arc<dyn Backend>,
    provider: Arc<dyn Provider>,
    config: DiscoveryConfig,
}

/// Counters for one discovery run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub created: usize,
    pub updated: usize,
    pub terminated: usize,
}

impl AssetDiscoverer {
    pub fn new(backend: Arc<dyn Backend>, provider: Arc<dyn Provider>, config: DiscoveryConfig) -> Self {
        Self {
            backend,
            provider,
            config,
        }
    }

    /// Run a single discovery pass. Per-asset failures are collected and
    /// returned together once the pass is over.
    pub async fn discover(&self) -> anyhow::Result<DiscoveryReport> {
        let discovery_time = Utc::now();
        let mut report = DiscoveryReport::default();
        let mut errors = Vec::new();
        let mut failed_patches = HashSet::new();

        let mut assets = self.provider.discover_assets();
        while let Some(found) = assets.next().await {
            let info = found.context("failed to discover assets")?;
            match self.upsert(info, discovery_time).await {
                Ok(true) => report.created += 1,
                Ok(false) => report.updated += 1,
                Err((id, err)) => {
                    if let Some(id) = id {
                        failed_patches.insert(id);
                    }
                    errors.push(err);
                }
            }
        }

        let stale = self
            .backend
            .list_assets(&AssetFilter {
                last_seen_before: Some(discovery_time),
                ..Default::default()
            })
            .await
            .context("failed to get existing Assets")?;

        for asset in stale.iter().filter(|a| !failed_patches.contains(&a.id)) {
            let patch = AssetPatch {
                terminated_on: Some(discovery_time),
                ..Default::default()
            };
            match self.backend.patch_asset(asset.id, patch).await {
                Ok(()) => {
                    debug!("Asset {} is gone", asset.asset_info.identity());
                    report.terminated += 1;
                }
                Err(err) => errors.push(anyhow!("failed to patch asset {}: {}", asset.id, err)),
            }
        }

        if errors.is_empty() {
            return Ok(report);
        }
        for err in &errors {
            warn!("{:#}", err);
        }
        Err(anyhow!("{} asset(s) failed during discovery", errors.len()))
    }

    /// Create the asset or refresh the existing one. `Ok(true)` when created.
    async fn upsert(
        &self,
        info: AssetInfo,
        discovery_time: DateTime<Utc>,
    ) -> Result<bool, (Option<Uuid>, anyhow::Error)> {
        let existing_id = match self.backend.post_asset(Asset::new(info.clone(), discovery_time)).await {
            Ok(_) => return Ok(true),
            Err(BackendError::Conflict { id, .. }) => id,
            Err(err) => return Err((None, anyhow!("failed to post asset: {}", err))),
        };

        let existing = self
            .backend
            .get_asset(existing_id)
            .await
            .map_err(|err| (Some(existing_id), anyhow!("failed to get conflicting asset: {}", err)))?;
        let merged = existing
            .asset_info
            .merge(info)
            .map_err(|err| (None, anyhow!("failed to handle conflicting asset: {}", err)))?;

        self.backend
            .patch_asset(
                existing_id,
                AssetPatch {
                    asset_info: Some(merged),
                    last_seen: Some(discovery_time),
                    ..Default::default()
                },
            )
            .await
            .map_err(|err| (Some(existing_id), anyhow!("failed to patch asset: {}", err)))?;
        Ok(false)
    }
}

impl Controller for AssetDiscoverer {
    fn name(&self) -> &'static str {
        CONTROLLER
    }

    fn start(self: Arc<Self>, token: CancellationToken) -> Vec<JoinHandle<()>> {
        let handle = tokio::spawn(async move {
            loop {
                debug!("Discovering available assets");
                match self.discover().await {
                    Ok(report) => info!(
                        "Discovery finished: {} created, {} updated, {} terminated",
                        report.created, report.updated, report.terminated
                    ),
                    Err(err) => warn!("Failed to discover assets: {:#}", err),
                }

                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Stopping asset discovery");
                        return;
                    }
                    _ = tokio::time::sleep(self.config.discovery_interval) => {}
                }
            }
        });
        vec![handle]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{backend, vm, FakeProvider};
    use vajra_common::{ContainerImageInfo, ProviderError};

    fn image(id: &str, tags: &[&str]) -> AssetInfo {
        AssetInfo::ContainerImage(ContainerImageInfo {
            image_id: id.to_string(),
            repo_tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        })
    }

    fn discoverer(backend: Arc<dyn Backend>, provider: Arc<FakeProvider>) -> AssetDiscoverer {
        AssetDiscoverer::new(backend, provider, DiscoveryConfig::default())
    }

    #[tokio::test]
    async fn discovery_creates_refreshes_and_terminates() {
        let backend = backend();
        let provider = Arc::new(FakeProvider::default());
        let discoverer = discoverer(backend.clone(), provider.clone());

        *provider.assets.lock() = vec![
            Ok(vm("i-1", "us-east-1")),
            Ok(vm("i-2", "us-east-1")),
            Ok(image("sha256:abc", &["app:1"])),
        ];
        let first = discoverer.discover().await.unwrap();
        assert_eq!(first.created, 3);

        // i-2 disappears, the image gains a tag
        *provider.assets.lock() = vec![Ok(vm("i-1", "us-east-1")), Ok(image("sha256:abc", &["app:2"]))];
        let second = discoverer.discover().await.unwrap();
        assert_eq!(second, DiscoveryReport { created: 0, updated: 2, terminated: 1 });

        let all = backend
            .list_assets(&AssetFilter {
                include_terminated: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        for asset in all {
            match &asset.asset_info {
                AssetInfo::VirtualMachine(vm) if vm.instance_id == "i-2" => {
                    assert!(asset.is_terminated());
                }
                AssetInfo::ContainerImage(image) => {
                    assert_eq!(image.repo_tags, vec!["app:1".to_string(), "app:2".to_string()]);
                    assert!(asset.last_seen > asset.first_seen);
                }
                _ => assert!(!asset.is_terminated()),
            }
        }
    }

    #[tokio::test]
    async fn stream_error_aborts_before_termination() {
        let backend = backend();
        let provider = Arc::new(FakeProvider::default());
        let discoverer = discoverer(backend.clone(), provider.clone());

        *provider.assets.lock() = vec![Ok(vm("i-1", "us-east-1"))];
        discoverer.discover().await.unwrap();

        *provider.assets.lock() = vec![Err(ProviderError::fatal("credentials expired"))];
        assert!(discoverer.discover().await.is_err());

        let live = backend.list_assets(&AssetFilter::default()).await.unwrap();
        assert_eq!(live.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn controller_stops_on_cancel() {
        let backend = backend();
        let provider = Arc::new(FakeProvider::default());
        *provider.assets.lock() = vec![Ok(vm("i-1", "us-east-1"))];
        let token = CancellationToken::new();

        let handles = Arc::new(discoverer(backend.clone(), provider)).start(token.clone());
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert_eq!(backend.list_assets(&AssetFilter::default()).await.unwrap().len(), 1);

        token.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
