use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scan::{Scan, ScanTemplate};

/// When a scan config should fire: a cron line, a single operation time,
/// or both (the operation time then tracks the next cron occurrence).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSchedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub scan_template: ScanTemplate,
    #[serde(default)]
    pub scheduled: RuntimeSchedule,
    #[serde(default)]
    pub disabled: bool,
}

impl ScanConfig {
    /// A new `Pending` scan for this config, named after it.
    #[must_use]
    pub fn new_scan(&self, now: DateTime<Utc>) -> Scan {
        let mut scan = Scan::new(
            format!("{}-{}", self.name, now.timestamp()),
            &self.scan_template,
        )
        .with_scan_config(self.id);
        scan.start_time = Some(now);
        scan.status.last_transition_time = now;
        scan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::scan::ScanState;

    #[test]
    fn new_scan_references_config() {
        let config = ScanConfig {
            id: Uuid::new_v4(),
            name: "weekly".into(),
            scan_template: ScanTemplate::default(),
            scheduled: RuntimeSchedule::default(),
            disabled: false,
        };
        let now = Utc::now();
        let scan = config.new_scan(now);

        assert_eq!(scan.scan_config_id, Some(config.id));
        assert_eq!(scan.name, format!("weekly-{}", now.timestamp()));
        assert_eq!(scan.start_time, Some(now));
        assert_eq!(scan.status.state, ScanState::Pending);
    }
}
