//! Controller configuration and defaults

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// TTL applied to finished estimations that do not carry one.
pub const DEFAULT_ESTIMATION_TTL: Duration = Duration::from_secs(3600);

/// Delay before a freshly scheduled asset scan is provisioned.
pub const DEFAULT_PROVISIONING_DELAY: Duration = Duration::from_secs(1);

/// Maximum number of backend requests a single reconcile issues at once.
pub const DEFAULT_FAN_OUT_LIMIT: usize = 32;

/// Whether scanner infrastructure is removed once an asset scan finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteJobPolicy {
    #[default]
    Always,
    Never,
    OnSuccess,
}

impl DeleteJobPolicy {
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DeleteJobPolicy::Always => "Always",
            DeleteJobPolicy::Never => "Never",
            DeleteJobPolicy::OnSuccess => "OnSuccess",
        }
    }
}

impl fmt::Display for DeleteJobPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeleteJobPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(DeleteJobPolicy::Always),
            "never" => Ok(DeleteJobPolicy::Never),
            "onsuccess" | "on-success" => Ok(DeleteJobPolicy::OnSuccess),
            other => Err(format!(
                "invalid delete job policy '{}', expected Always, Never or OnSuccess",
                other
            )),
        }
    }
}

/// Poll and reconcile cadence shared by every watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub poll_period: Duration,
    pub reconcile_timeout: Duration,
    pub workers: usize,
}

impl ReconcileSettings {
    #[must_use]
    pub const fn new(poll_period: Duration, reconcile_timeout: Duration) -> Self {
        Self {
            poll_period,
            reconcile_timeout,
            workers: 1,
        }
    }
}

/// Where the scanner image and its tool servers live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannerConfig {
    pub scanner_image: String,
    pub api_server_address: String,
    /// Tool name (e.g. "grype", "trivy") to server address.
    pub tool_servers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfigWatcherConfig {
    pub settings: ReconcileSettings,
}

impl Default for ScanConfigWatcherConfig {
    fn default() -> Self {
        Self {
            settings: ReconcileSettings::new(Duration::from_secs(15), Duration::from_secs(300)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanWatcherConfig {
    pub settings: ReconcileSettings,
    pub scan_timeout: Duration,
    pub fan_out_limit: usize,
}

impl Default for ScanWatcherConfig {
    fn default() -> Self {
        Self {
            settings: ReconcileSettings::new(Duration::from_secs(15), Duration::from_secs(300)),
            scan_timeout: Duration::from_secs(48 * 3600),
            fan_out_limit: DEFAULT_FAN_OUT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetScanWatcherConfig {
    pub settings: ReconcileSettings,
    pub abort_timeout: Duration,
    pub delete_policy: DeleteJobPolicy,
    pub scanner: ScannerConfig,
}

impl Default for AssetScanWatcherConfig {
    fn default() -> Self {
        Self {
            settings: ReconcileSettings::new(Duration::from_secs(15), Duration::from_secs(300)),
            abort_timeout: Duration::from_secs(600),
            delete_policy: DeleteJobPolicy::Always,
            scanner: ScannerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEstimationWatcherConfig {
    pub settings: ReconcileSettings,
    pub estimation_timeout: Duration,
    pub default_ttl: Duration,
    pub fan_out_limit: usize,
}

impl Default for ScanEstimationWatcherConfig {
    fn default() -> Self {
        Self {
            settings: ReconcileSettings::new(Duration::from_secs(5), Duration::from_secs(120)),
            estimation_timeout: Duration::from_secs(48 * 3600),
            default_ttl: DEFAULT_ESTIMATION_TTL,
            fan_out_limit: DEFAULT_FAN_OUT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetScanEstimationWatcherConfig {
    pub settings: ReconcileSettings,
    pub default_ttl: Duration,
}

impl Default for AssetScanEstimationWatcherConfig {
    fn default() -> Self {
        Self {
            settings: ReconcileSettings::new(Duration::from_secs(5), Duration::from_secs(120)),
            default_ttl: DEFAULT_ESTIMATION_TTL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub discovery_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(120),
        }
    }
}

/// Configuration of every controller the orchestrator runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub controller_startup_delay: Duration,
    pub discovery: DiscoveryConfig,
    pub scan_config_watcher: ScanConfigWatcherConfig,
    pub scan_watcher: ScanWatcherConfig,
    pub asset_scan_watcher: AssetScanWatcherConfig,
    pub scan_estimation_watcher: ScanEstimationWatcherConfig,
    pub asset_scan_estimation_watcher: AssetScanEstimationWatcherConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            controller_startup_delay: Duration::from_secs(7),
            discovery: DiscoveryConfig::default(),
            scan_config_watcher: ScanConfigWatcherConfig::default(),
            scan_watcher: ScanWatcherConfig::default(),
            asset_scan_watcher: AssetScanWatcherConfig::default(),
            scan_estimation_watcher: ScanEstimationWatcherConfig::default(),
            asset_scan_estimation_watcher: AssetScanEstimationWatcherConfig::default(),
        }
    }
}
