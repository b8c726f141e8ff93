use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset::Asset;
use super::scan::ScannerInstanceCreationConfig;

/// Everything a provider needs to provision or tear down the scanner for
/// one asset scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJobConfig {
    pub scan_id: Uuid,
    pub asset_scan_id: Uuid,
    pub asset: Asset,
    pub scanner_image: String,
    /// Serialized description of the families and tools the scanner runs.
    pub scanner_cli_config: String,
    pub api_server_address: String,
    #[serde(default)]
    pub scanner_instance_creation_config: ScannerInstanceCreationConfig,
}
