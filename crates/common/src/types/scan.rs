//! Scan resource and the templates it is created from.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::asset::AssetScope;
use super::status::Status;
use super::summary::FindingsSummary;

/// Families of analysis a scanner can run against an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanFamily {
    Sbom,
    Vulnerabilities,
    Exploits,
    Secrets,
    Malware,
    Misconfigurations,
    Rootkits,
    InfoFinder,
}

impl ScanFamily {
    pub const ALL: [ScanFamily; 8] = [
        ScanFamily::Sbom,
        ScanFamily::Vulnerabilities,
        ScanFamily::Exploits,
        ScanFamily::Secrets,
        ScanFamily::Malware,
        ScanFamily::Misconfigurations,
        ScanFamily::Rootkits,
        ScanFamily::InfoFinder,
    ];

    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ScanFamily::Sbom => "sbom",
            ScanFamily::Vulnerabilities => "vulnerabilities",
            ScanFamily::Exploits => "exploits",
            ScanFamily::Secrets => "secrets",
            ScanFamily::Malware => "malware",
            ScanFamily::Misconfigurations => "misconfigurations",
            ScanFamily::Rootkits => "rootkits",
            ScanFamily::InfoFinder => "infoFinder",
        }
    }
}

impl fmt::Display for ScanFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyConfig {
    pub enabled: bool,
    /// Tools to run for this family; empty means the scanner's defaults.
    #[serde(default)]
    pub scanners: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanFamiliesConfig(pub BTreeMap<ScanFamily, FamilyConfig>);

impl ScanFamiliesConfig {
    #[must_use]
    pub fn is_enabled(&self, family: ScanFamily) -> bool {
        self.0.get(&family).is_some_and(|c| c.enabled)
    }

    pub fn enabled(&self) -> impl Iterator<Item = (ScanFamily, &FamilyConfig)> {
        self.0
            .iter()
            .filter(|(_, config)| config.enabled)
            .map(|(family, config)| (*family, config))
    }

    #[inline]
    #[must_use]
    pub fn with_family(mut self, family: ScanFamily, scanners: Vec<String>) -> Self {
        self.0.insert(
            family,
            FamilyConfig {
                enabled: true,
                scanners,
            },
        );
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerInstanceCreationConfig {
    #[serde(default)]
    pub use_spot_instances: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_max_attempts: Option<u32>,
}

/// What to run against each asset of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetScanTemplate {
    #[serde(default)]
    pub scan_families_config: ScanFamiliesConfig,
    #[serde(default)]
    pub scanner_instance_creation_config: ScannerInstanceCreationConfig,
}

/// Everything needed to start a scan, shared by scan configs and estimations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanTemplate {
    #[serde(default)]
    pub scope: AssetScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_scanners: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub asset_scan_template: AssetScanTemplate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanState {
    Pending,
    Discovered,
    InProgress,
    Aborted,
    Done,
    Failed,
}

impl ScanState {
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Done | ScanState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanReason {
    Created,
    AssetsDiscovered,
    AssetScansRunning,
    NothingToScan,
    Success,
    Error,
    Timeout,
    Cancellation,
}

pub type ScanStatus = Status<ScanState, ScanReason>;

/// Counters aggregated from the asset scans of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub jobs_completed: u32,
    pub jobs_left_to_run: u32,
    #[serde(flatten)]
    pub findings: FindingsSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_config_id: Option<Uuid>,
    #[serde(default)]
    pub scope: AssetScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_scanners: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub asset_scan_template: AssetScanTemplate,
    pub status: ScanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub asset_ids: Vec<Uuid>,
    #[serde(default)]
    pub summary: ScanSummary,
}

impl Scan {
    /// A `Pending` scan built from a template.
    #[must_use]
    pub fn new(name: impl Into<String>, template: &ScanTemplate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            scan_config_id: None,
            scope: template.scope.clone(),
            max_parallel_scanners: template.max_parallel_scanners,
            timeout_seconds: template.timeout_seconds,
            asset_scan_template: template.asset_scan_template.clone(),
            status: Status::new(ScanState::Pending, ScanReason::Created, None).at(now),
            start_time: Some(now),
            end_time: None,
            asset_ids: Vec::new(),
            summary: ScanSummary::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_scan_config(mut self, scan_config_id: Uuid) -> Self {
        self.scan_config_id = Some(scan_config_id);
        self
    }

    /// Whether a running scan has exceeded its own timeout, or
    /// `default_timeout` when it does not carry one.
    #[must_use]
    pub fn is_timed_out(&self, default_timeout: Duration, now: DateTime<Utc>) -> bool {
        if self.status.state.is_terminal() {
            return false;
        }
        let Some(start) = self.start_time else {
            return false;
        };
        let timeout = self
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(default_timeout);
        // past the representable range the scan never times out
        ChronoDuration::from_std(timeout)
            .ok()
            .and_then(|timeout| start.checked_add_signed(timeout))
            .is_some_and(|deadline| deadline < now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_scan_copies_template() {
        let template = ScanTemplate {
            max_parallel_scanners: Some(2),
            timeout_seconds: Some(60),
            ..Default::default()
        };
        let scan = Scan::new("nightly", &template);

        assert_eq!(scan.status.state, ScanState::Pending);
        assert_eq!(scan.max_parallel_scanners, Some(2));
        assert!(scan.start_time.is_some());
    }

    #[test]
    fn timeout_prefers_scan_value() {
        let mut scan = Scan::new(
            "s",
            &ScanTemplate {
                timeout_seconds: Some(10),
                ..Default::default()
            },
        );
        let start = Utc::now();
        scan.start_time = Some(start);

        let day = Duration::from_secs(86_400);
        assert!(!scan.is_timed_out(day, start + ChronoDuration::seconds(5)));
        assert!(scan.is_timed_out(day, start + ChronoDuration::seconds(11)));

        scan.timeout_seconds = None;
        assert!(!scan.is_timed_out(day, start + ChronoDuration::seconds(11)));

        scan.timeout_seconds = Some(10);
        scan.status.state = ScanState::Done;
        assert!(!scan.is_timed_out(day, start + ChronoDuration::seconds(11)));
    }

    #[test]
    fn timeout_beyond_calendar_range_never_expires() {
        let mut scan = Scan::new(
            "s",
            &ScanTemplate {
                timeout_seconds: Some(10_000_000_000_000),
                ..Default::default()
            },
        );
        let now = Utc::now();
        scan.start_time = Some(now);

        assert!(!scan.is_timed_out(Duration::from_secs(60), now));
        assert!(!scan.is_timed_out(Duration::from_secs(60), now + ChronoDuration::days(365)));

        scan.timeout_seconds = Some(u64::MAX);
        assert!(!scan.is_timed_out(Duration::from_secs(60), now));
    }

    #[test]
    fn families_config_reports_enabled() {
        let config = ScanFamiliesConfig::default().with_family(ScanFamily::Sbom, vec![]);
        assert!(config.is_enabled(ScanFamily::Sbom));
        assert!(!config.is_enabled(ScanFamily::Malware));
        assert_eq!(config.enabled().count(), 1);
    }
}
