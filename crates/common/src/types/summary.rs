use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Vulnerability counts broken down by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilitySummary {
    pub total_critical_vulnerabilities: u32,
    pub total_high_vulnerabilities: u32,
    pub total_medium_vulnerabilities: u32,
    pub total_low_vulnerabilities: u32,
    pub total_negligible_vulnerabilities: u32,
}

impl VulnerabilitySummary {
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total_critical_vulnerabilities
            + self.total_high_vulnerabilities
            + self.total_medium_vulnerabilities
            + self.total_low_vulnerabilities
            + self.total_negligible_vulnerabilities
    }
}

impl AddAssign<&VulnerabilitySummary> for VulnerabilitySummary {
    fn add_assign(&mut self, rhs: &VulnerabilitySummary) {
        self.total_critical_vulnerabilities += rhs.total_critical_vulnerabilities;
        self.total_high_vulnerabilities += rhs.total_high_vulnerabilities;
        self.total_medium_vulnerabilities += rhs.total_medium_vulnerabilities;
        self.total_low_vulnerabilities += rhs.total_low_vulnerabilities;
        self.total_negligible_vulnerabilities += rhs.total_negligible_vulnerabilities;
    }
}

/// Findings totals reported for one asset scan, or summed over a whole scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingsSummary {
    pub total_packages: u32,
    pub total_exploits: u32,
    pub total_malware: u32,
    pub total_misconfigurations: u32,
    pub total_rootkits: u32,
    pub total_secrets: u32,
    pub total_info_finder: u32,
    pub total_vulnerabilities: VulnerabilitySummary,
}

impl AddAssign<&FindingsSummary> for FindingsSummary {
    fn add_assign(&mut self, rhs: &FindingsSummary) {
        self.total_packages += rhs.total_packages;
        self.total_exploits += rhs.total_exploits;
        self.total_malware += rhs.total_malware;
        self.total_misconfigurations += rhs.total_misconfigurations;
        self.total_rootkits += rhs.total_rootkits;
        self.total_secrets += rhs.total_secrets;
        self.total_info_finder += rhs.total_info_finder;
        self.total_vulnerabilities += &rhs.total_vulnerabilities;
    }
}
