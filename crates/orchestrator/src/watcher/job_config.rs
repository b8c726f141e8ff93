//! Builds the provider job for one asset scan.

use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeMap;

use vajra_common::{Asset, AssetScan, ScanFamily, ScanJobConfig};

use crate::config::ScannerConfig;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScannerEntry<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_address: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FamilyCliConfig<'a> {
    enabled: bool,
    scanners: Vec<ScannerEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScannerCliConfig<'a> {
    asset_scan_id: String,
    api_server_address: &'a str,
    families: BTreeMap<ScanFamily, FamilyCliConfig<'a>>,
}

pub(crate) fn new_scan_job_config(
    scanner: &ScannerConfig,
    asset_scan: &AssetScan,
    asset: Asset,
) -> anyhow::Result<ScanJobConfig> {
    let families = asset_scan
        .scan_families_config
        .enabled()
        .map(|(family, config)| {
            let scanners = config
                .scanners
                .iter()
                .map(|name| ScannerEntry {
                    name: name.as_str(),
                    server_address: scanner.tool_servers.get(name).map(String::as_str),
                })
                .collect();
            (
                family,
                FamilyCliConfig {
                    enabled: true,
                    scanners,
                },
            )
        })
        .collect();

    let cli_config = ScannerCliConfig {
        asset_scan_id: asset_scan.id.to_string(),
        api_server_address: &scanner.api_server_address,
        families,
    };
    let scanner_cli_config = serde_json::to_string(&cli_config)
        .context("failed to serialize scanner CLI config")?;

    Ok(ScanJobConfig {
        scan_id: asset_scan.scan_id,
        asset_scan_id: asset_scan.id,
        asset,
        scanner_image: scanner.scanner_image.clone(),
        scanner_cli_config,
        api_server_address: scanner.api_server_address.clone(),
        scanner_instance_creation_config: asset_scan.scanner_instance_creation_config.clone(),
    })
}
