use anyhow::{Context, Result};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use vajra_common::query::ScanFilter;
use vajra_common::{Backend, BackendError, Scan, ScanConfig};
use vajra_orchestrator::Orchestrator;
use vajra_storage::MemoryBackend;

use crate::args::RunArgs;
use crate::inventory::InventoryProvider;
use crate::output::print_scans;

/// Run the orchestrator until Ctrl-C and print the resulting scans.
pub async fn run(args: RunArgs) -> Result<()> {
    let start = Instant::now();
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", err);
        }
    };
    let scans = run_until(&args, shutdown).await?;
    print_scans(&scans, &args.output, start.elapsed())?;
    Ok(())
}

/// Run the orchestrator until `shutdown` resolves and return every scan it
/// created.
pub async fn run_until<F>(args: &RunArgs, shutdown: F) -> Result<Vec<Scan>>
where
    F: Future<Output = ()>,
{
    info!("Using {} provider", args.provider);
    let provider = Arc::new(InventoryProvider::from_file(&args.inventory)?);
    let backend = Arc::new(MemoryBackend::new());
    if let Some(path) = &args.scan_config {
        let seeded = seed_scan_configs(backend.as_ref(), path).await?;
        info!("Seeded {} scan configs from {}", seeded, path.display());
    }

    let orchestrator = Orchestrator::new(args.orchestrator_config(), backend.clone(), provider);
    info!("Controllers: {}", orchestrator.controller_names().join(", "));

    tokio::pin!(shutdown);
    let started = tokio::select! {
        _ = orchestrator.start() => true,
        _ = &mut shutdown => false,
    };
    if started {
        info!("Orchestrator running, press Ctrl-C to stop");
        shutdown.await;
    }
    orchestrator.stop().await;

    backend
        .list_scans(&ScanFilter::default())
        .await
        .context("failed to list scans")
}

/// Post every scan config listed in the JSON file at `path`. Configs that
/// already exist are skipped.
async fn seed_scan_configs(backend: &dyn Backend, path: &Path) -> Result<usize> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scan configs. Path={}", path.display()))?;
    let configs: Vec<ScanConfig> = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse scan configs. Path={}", path.display()))?;

    let mut seeded = 0;
    for config in configs {
        let id = config.id;
        match backend.post_scan_config(config).await {
            Ok(_) => seeded += 1,
            Err(BackendError::Conflict { .. }) => {
                warn!("Scan config already exists. ScanConfigID={}", id);
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to post scan config. ScanConfigID={}", id)
                });
            }
        }
    }
    Ok(seeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{Cli, Commands};
    use chrono::Utc;
    use clap::Parser;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;
    use vajra_common::query::ScanConfigFilter;

    fn write_temp(name: &str, value: &serde_json::Value) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vajra-{}-{}.json", name, uuid::Uuid::new_v4()));
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn inventory() -> serde_json::Value {
        json!([
            {"objectType": "VMInfo", "instanceId": "i-1", "location": "eu-west-1"},
            {"objectType": "VMInfo", "instanceId": "i-2", "location": "eu-west-1"}
        ])
    }

    fn one_off_config() -> serde_json::Value {
        let at = Utc::now() + chrono::Duration::seconds(5);
        json!([{
            "name": "one-off",
            "scanTemplate": {
                "assetScanTemplate": {
                    "scanFamiliesConfig": {"sbom": {"enabled": true}}
                }
            },
            "scheduled": {"operationTime": at}
        }])
    }

    fn run_args(inventory: &Path, scan_config: Option<&Path>) -> RunArgs {
        let mut argv = vec![
            "vajra".to_string(),
            "run".to_string(),
            "--inventory".to_string(),
            inventory.display().to_string(),
            "--controller-startup-delay".to_string(),
            "1s".to_string(),
            "--discovery-interval".to_string(),
            "1h".to_string(),
        ];
        if let Some(path) = scan_config {
            argv.push("--scan-config".to_string());
            argv.push(path.display().to_string());
        }
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
        }
    }

    #[tokio::test]
    async fn test_seed_scan_configs() {
        let path = write_temp("configs", &one_off_config());
        let backend = MemoryBackend::new();

        assert_eq!(seed_scan_configs(&backend, &path).await.unwrap(), 1);
        let configs = backend
            .list_scan_configs(&ScanConfigFilter::default())
            .await
            .unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].name, "one-off");
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_seed_rejects_malformed_file() {
        let path = write_temp("configs", &json!({"name": "not-a-list"}));
        let backend = MemoryBackend::new();

        let err = seed_scan_configs(&backend, &path).await.unwrap_err();
        assert!(err.to_string().contains("failed to parse scan configs"));
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_missing_inventory() {
        let args = run_args(Path::new("/nonexistent/inventory.json"), None);
        assert!(run_until(&args, async {}).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_creates_scheduled_scan() {
        let inventory_path = write_temp("inventory", &inventory());
        let config_path = write_temp("configs", &one_off_config());
        let args = run_args(&inventory_path, Some(&config_path));

        let scans = run_until(&args, tokio::time::sleep(Duration::from_secs(120)))
            .await
            .unwrap();

        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].asset_ids.len(), 2);
        std::fs::remove_file(inventory_path).ok();
        std::fs::remove_file(config_path).ok();
    }

    #[tokio::test]
    async fn test_shutdown_during_startup() {
        let inventory_path = write_temp("inventory", &inventory());
        let args = run_args(&inventory_path, None);

        let scans = run_until(&args, async {}).await.unwrap();
        assert!(scans.is_empty());
        std::fs::remove_file(inventory_path).ok();
    }
}
