use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use vajra_orchestrator::config::{
    AssetScanEstimationWatcherConfig, AssetScanWatcherConfig, DiscoveryConfig,
    ScanConfigWatcherConfig, ScanEstimationWatcherConfig, ScanWatcherConfig,
    DEFAULT_FAN_OUT_LIMIT,
};
use vajra_orchestrator::{DeleteJobPolicy, OrchestratorConfig, ReconcileSettings, ScannerConfig};

#[derive(Parser)]
#[command(name = "vajra")]
#[command(version = "0.1.0")]
#[command(about = "Security scan orchestrator for cloud assets", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the orchestrator until Ctrl-C, then print the scans
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// JSON file listing the assets the inventory provider reports
    #[arg(short, long, env = "VAJRA_ORCHESTRATOR_INVENTORY")]
    pub inventory: PathBuf,

    /// JSON file with scan configs to seed the backend with
    #[arg(short = 'c', long, env = "VAJRA_ORCHESTRATOR_SCAN_CONFIG")]
    pub scan_config: Option<PathBuf>,

    /// Provider backing discovery and scanner jobs
    #[arg(long, default_value = "inventory", value_parser = ["inventory"])]
    pub provider: String,

    /// Output format: text, json
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    pub output: String,

    /// Delay between starting two controllers
    #[arg(long, env = "VAJRA_ORCHESTRATOR_CONTROLLER_STARTUP_DELAY", default_value = "7s", value_parser = humantime::parse_duration)]
    pub controller_startup_delay: Duration,

    #[arg(long, env = "VAJRA_ORCHESTRATOR_DISCOVERY_INTERVAL", default_value = "2m", value_parser = humantime::parse_duration)]
    pub discovery_interval: Duration,

    #[arg(long, env = "VAJRA_ORCHESTRATOR_SCAN_CONFIG_POLLING_INTERVAL", default_value = "15s", value_parser = humantime::parse_duration)]
    pub scan_config_poll_period: Duration,

    #[arg(long, env = "VAJRA_ORCHESTRATOR_SCAN_CONFIG_RECONCILE_TIMEOUT", default_value = "5m", value_parser = humantime::parse_duration)]
    pub scan_config_reconcile_timeout: Duration,

    #[arg(long, env = "VAJRA_ORCHESTRATOR_SCAN_POLLING_INTERVAL", default_value = "15s", value_parser = humantime::parse_duration)]
    pub scan_poll_period: Duration,

    #[arg(long, env = "VAJRA_ORCHESTRATOR_SCAN_RECONCILE_TIMEOUT", default_value = "5m", value_parser = humantime::parse_duration)]
    pub scan_reconcile_timeout: Duration,

    /// Timeout applied to scans that do not set their own
    #[arg(long, env = "VAJRA_ORCHESTRATOR_SCAN_TIMEOUT", default_value = "48h", value_parser = humantime::parse_duration)]
    pub scan_timeout: Duration,

    #[arg(long, env = "VAJRA_ORCHESTRATOR_ASSETSCAN_POLLING_INTERVAL", default_value = "15s", value_parser = humantime::parse_duration)]
    pub asset_scan_poll_period: Duration,

    #[arg(long, env = "VAJRA_ORCHESTRATOR_ASSETSCAN_RECONCILE_TIMEOUT", default_value = "5m", value_parser = humantime::parse_duration)]
    pub asset_scan_reconcile_timeout: Duration,

    /// How long an aborted asset scan may take to shut its scanner down
    #[arg(long, env = "VAJRA_ORCHESTRATOR_ASSETSCAN_ABORT_TIMEOUT", default_value = "10m", value_parser = humantime::parse_duration)]
    pub asset_scan_abort_timeout: Duration,

    /// Scanner cleanup policy: Always, Never, OnSuccess
    #[arg(long, env = "VAJRA_ORCHESTRATOR_DELETE_JOB_POLICY", default_value = "Always")]
    pub delete_job_policy: DeleteJobPolicy,

    #[arg(long, env = "VAJRA_ORCHESTRATOR_SCANNER_IMAGE", default_value = "")]
    pub scanner_image: String,

    #[arg(long, env = "VAJRA_ORCHESTRATOR_SCANNER_APISERVER_ADDRESS", default_value = "")]
    pub api_server_address: String,

    /// Tool server as name=address (e.g. grype=grype-server:9991), repeatable
    #[arg(long = "tool-server", value_parser = parse_tool_server)]
    pub tool_servers: Vec<(String, String)>,

    #[arg(long, env = "VAJRA_ORCHESTRATOR_SCAN_ESTIMATION_POLLING_INTERVAL", default_value = "5s", value_parser = humantime::parse_duration)]
    pub scan_estimation_poll_period: Duration,

    #[arg(long, env = "VAJRA_ORCHESTRATOR_SCAN_ESTIMATION_RECONCILE_TIMEOUT", default_value = "2m", value_parser = humantime::parse_duration)]
    pub scan_estimation_reconcile_timeout: Duration,

    #[arg(long, env = "VAJRA_ORCHESTRATOR_SCAN_ESTIMATION_TIMEOUT", default_value = "48h", value_parser = humantime::parse_duration)]
    pub estimation_timeout: Duration,

    #[arg(long, env = "VAJRA_ORCHESTRATOR_ASSETSCAN_ESTIMATION_POLLING_INTERVAL", default_value = "5s", value_parser = humantime::parse_duration)]
    pub asset_scan_estimation_poll_period: Duration,

    #[arg(long, env = "VAJRA_ORCHESTRATOR_ASSETSCAN_ESTIMATION_RECONCILE_TIMEOUT", default_value = "2m", value_parser = humantime::parse_duration)]
    pub asset_scan_estimation_reconcile_timeout: Duration,

    /// Retention of finished estimations that do not set their own TTL
    #[arg(long, env = "VAJRA_ORCHESTRATOR_ESTIMATION_TTL", default_value = "1h", value_parser = humantime::parse_duration)]
    pub estimation_ttl: Duration,

    /// Reconciler workers per watcher
    #[arg(short, long, env = "VAJRA_ORCHESTRATOR_WORKERS", default_value = "1")]
    pub workers: usize,
}

impl RunArgs {
    fn settings(&self, poll_period: Duration, reconcile_timeout: Duration) -> ReconcileSettings {
        ReconcileSettings {
            poll_period,
            reconcile_timeout,
            workers: self.workers.max(1),
        }
    }

    /// Map the parsed flags onto the orchestrator configuration.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            controller_startup_delay: self.controller_startup_delay,
            discovery: DiscoveryConfig {
                discovery_interval: self.discovery_interval,
            },
            scan_config_watcher: ScanConfigWatcherConfig {
                settings: self
                    .settings(self.scan_config_poll_period, self.scan_config_reconcile_timeout),
            },
            scan_watcher: ScanWatcherConfig {
                settings: self.settings(self.scan_poll_period, self.scan_reconcile_timeout),
                scan_timeout: self.scan_timeout,
                fan_out_limit: DEFAULT_FAN_OUT_LIMIT,
            },
            asset_scan_watcher: AssetScanWatcherConfig {
                settings: self
                    .settings(self.asset_scan_poll_period, self.asset_scan_reconcile_timeout),
                abort_timeout: self.asset_scan_abort_timeout,
                delete_policy: self.delete_job_policy,
                scanner: ScannerConfig {
                    scanner_image: self.scanner_image.clone(),
                    api_server_address: self.api_server_address.clone(),
                    tool_servers: self.tool_servers.iter().cloned().collect(),
                },
            },
            scan_estimation_watcher: ScanEstimationWatcherConfig {
                settings: self.settings(
                    self.scan_estimation_poll_period,
                    self.scan_estimation_reconcile_timeout,
                ),
                estimation_timeout: self.estimation_timeout,
                default_ttl: self.estimation_ttl,
                fan_out_limit: DEFAULT_FAN_OUT_LIMIT,
            },
            asset_scan_estimation_watcher: AssetScanEstimationWatcherConfig {
                settings: self.settings(
                    self.asset_scan_estimation_poll_period,
                    self.asset_scan_estimation_reconcile_timeout,
                ),
                default_ttl: self.estimation_ttl,
            },
        }
    }
}

fn parse_tool_server(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, address)) if !name.trim().is_empty() && !address.trim().is_empty() => {
            Ok((name.trim().to_string(), address.trim().to_string()))
        }
        _ => Err(format!("invalid tool server '{}', expected name=address", s)),
    }
}
