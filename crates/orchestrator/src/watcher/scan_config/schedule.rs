//! Schedule evaluation for scan configs.
//!
//! Each reconcile compares the config's next operation time against a
//! window starting at "now". The outcome decides whether a scan is due,
//! whether the schedule slipped, or whether it can never fire again.

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::fmt;
use std::str::FromStr;

use vajra_common::ScanConfig;

/// Half-open timeframe `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ScheduleWindow {
    #[inline]
    #[must_use]
    pub fn new(now: DateTime<Utc>, size: Duration) -> Self {
        Self {
            start: now,
            end: now + size,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time < self.end
    }

    /// The whole window lies after `time`.
    pub fn is_after(&self, time: DateTime<Utc>) -> bool {
        self.start > time
    }

    /// The window of the same size immediately following this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            start: self.end,
            end: self.end + (self.end - self.start),
        }
    }
}

impl fmt::Display for ScheduleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "start: {}, end: {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Parse a cron line. Five-field lines are minute-first and get a
/// leading seconds field.
pub fn parse_cron(line: &str) -> Result<Schedule, cron::error::Error> {
    let line = line.trim();
    if line.split_whitespace().count() == 5 {
        Schedule::from_str(&format!("0 {}", line))
    } else {
        Schedule::from_str(line)
    }
}

/// A point in time, optionally recurring along a cron schedule.
#[derive(Debug, Clone)]
pub struct OperationTime {
    time: DateTime<Utc>,
    cron: Option<Schedule>,
}

impl OperationTime {
    /// A cron that fires exactly once replaces `time` with that instant.
    /// A missing `time` is the UNIX epoch.
    pub fn new(time: Option<DateTime<Utc>>, cron: Option<Schedule>) -> Self {
        let mut time = time.unwrap_or(DateTime::UNIX_EPOCH);
        if let Some(point) = cron.as_ref().and_then(point_in_time) {
            time = point;
        }
        Self { time, cron }
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Next cron occurrence after this one, or itself when there is none.
    #[must_use]
    pub fn next(&self) -> Self {
        let time = self
            .cron
            .as_ref()
            .and_then(|cron| cron.after(&self.time).next())
            .unwrap_or(self.time);
        Self {
            time,
            cron: self.cron.clone(),
        }
    }

    /// First occurrence at or after `after`. Without a cron, or when the
    /// schedule runs out, the latest reachable occurrence is returned.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Self {
        let Some(cron) = self.cron.as_ref() else {
            return self.clone();
        };
        if self.time >= after {
            return self.clone();
        }

        let time = cron
            .after(&(after - Duration::nanoseconds(1)))
            .next()
            .or_else(|| {
                cron.after(&self.time)
                    .take_while(|time| *time < after)
                    .last()
            })
            .unwrap_or(self.time);
        Self {
            time,
            cron: self.cron.clone(),
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.next().time != self.time
    }
}

impl fmt::Display for OperationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.time.to_rfc3339())
    }
}

fn point_in_time(cron: &Schedule) -> Option<DateTime<Utc>> {
    let mut upcoming = cron.after(&DateTime::UNIX_EPOCH);
    match (upcoming.next(), upcoming.next()) {
        (None, _) => Some(DateTime::UNIX_EPOCH),
        (Some(first), None) => Some(first),
        (Some(first), Some(second)) if first == second => Some(first),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Disabled,
    /// No schedule, or a one-off time that already passed.
    Unscheduled,
    NotDue,
    Due,
    /// A recurring schedule whose operation time slipped behind the window.
    Overdue,
}

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScheduleState::Disabled => "Disabled",
            ScheduleState::Unscheduled => "Unscheduled",
            ScheduleState::NotDue => "NotDue",
            ScheduleState::Due => "Due",
            ScheduleState::Overdue => "Overdue",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfigSchedule {
    pub state: ScheduleState,
    pub operation_time: Option<OperationTime>,
    pub window: ScheduleWindow,
}

impl ScanConfigSchedule {
    pub fn evaluate(
        scan_config: &ScanConfig,
        window: ScheduleWindow,
    ) -> Result<Self, cron::error::Error> {
        let schedule = |state, operation_time| Self {
            state,
            operation_time,
            window,
        };

        if scan_config.disabled {
            return Ok(schedule(ScheduleState::Disabled, None));
        }

        let scheduled = &scan_config.scheduled;
        if scheduled.cron_line.is_none() && scheduled.operation_time.is_none() {
            return Ok(schedule(ScheduleState::Unscheduled, None));
        }

        let cron = scheduled.cron_line.as_deref().map(parse_cron).transpose()?;
        let operation_time = OperationTime::new(scheduled.operation_time, cron);

        let state = if window.contains(operation_time.time()) {
            ScheduleState::Due
        } else if window.is_after(operation_time.time()) {
            if operation_time.is_recurring() {
                ScheduleState::Overdue
            } else {
                ScheduleState::Unscheduled
            }
        } else {
            ScheduleState::NotDue
        };

        Ok(schedule(state, Some(operation_time)))
    }

    /// Operation time to persist once this window has been handled.
    pub fn next_operation_time(&self) -> Option<DateTime<Utc>> {
        self.operation_time
            .as_ref()
            .map(|time| time.next_after(self.window.next().start()).time())
    }
}

impl fmt::Display for ScanConfigSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state: {}, operation time: [", self.state)?;
        if let Some(time) = &self.operation_time {
            write!(f, "{}", time)?;
        }
        write!(f, "], schedule window: [{}]", self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vajra_common::{RuntimeSchedule, ScanTemplate};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 14, h, m, s).unwrap()
    }

    fn config(cron_line: Option<&str>, operation_time: Option<DateTime<Utc>>) -> ScanConfig {
        ScanConfig {
            id: uuid::Uuid::new_v4(),
            name: "nightly".into(),
            scan_template: ScanTemplate::default(),
            scheduled: RuntimeSchedule {
                cron_line: cron_line.map(str::to_string),
                operation_time,
            },
            disabled: false,
        }
    }

    fn window(now: DateTime<Utc>) -> ScheduleWindow {
        ScheduleWindow::new(now, Duration::seconds(30))
    }

    #[test]
    fn window_bounds() {
        let w = window(at(12, 0, 0));
        assert!(w.contains(at(12, 0, 0)));
        assert!(w.contains(at(12, 0, 29)));
        assert!(!w.contains(at(12, 0, 30)));
        assert!(w.is_after(at(11, 59, 59)));
        assert!(!w.is_after(at(12, 0, 0)));

        let next = w.next();
        assert_eq!(next.start(), at(12, 0, 30));
        assert_eq!(next.end(), at(12, 1, 0));
    }

    #[test]
    fn five_field_cron_is_minute_first() {
        let cron = parse_cron("30 2 * * *").unwrap();
        let next = cron.after(&at(0, 0, 0)).next().unwrap();
        assert_eq!(next, at(2, 30, 0));
        assert!(parse_cron("not a cron").is_err());
    }

    #[test]
    fn single_shot_cron_is_point_in_time() {
        let cron = parse_cron("0 0 6 1 1 * 2031").unwrap();
        let time = OperationTime::new(None, Some(cron));
        assert_eq!(time.time(), Utc.with_ymd_and_hms(2031, 1, 1, 6, 0, 0).unwrap());
        assert!(!time.is_recurring());
    }

    #[test]
    fn next_after_skips_to_first_occurrence_at_or_after() {
        let cron = parse_cron("0 0 * * * *").unwrap();
        let time = OperationTime::new(Some(at(9, 0, 0)), Some(cron));
        assert!(time.is_recurring());
        assert_eq!(time.next().time(), at(10, 0, 0));
        assert_eq!(time.next_after(at(12, 30, 0)).time(), at(13, 0, 0));
        assert_eq!(time.next_after(at(13, 0, 0)).time(), at(13, 0, 0));
        assert_eq!(time.next_after(at(8, 0, 0)).time(), at(9, 0, 0));

        let one_off = OperationTime::new(Some(at(9, 0, 0)), None);
        assert_eq!(one_off.next_after(at(12, 0, 0)).time(), at(9, 0, 0));
        assert!(!one_off.is_recurring());
    }

    #[test]
    fn evaluate_states() {
        let now = at(12, 0, 0);
        let eval = |config: &ScanConfig| ScanConfigSchedule::evaluate(config, window(now)).unwrap();

        let mut disabled = config(Some("0 0 * * * *"), None);
        disabled.disabled = true;
        assert_eq!(eval(&disabled).state, ScheduleState::Disabled);

        assert_eq!(eval(&config(None, None)).state, ScheduleState::Unscheduled);
        assert_eq!(eval(&config(None, Some(at(12, 0, 10)))).state, ScheduleState::Due);
        assert_eq!(eval(&config(None, Some(at(13, 0, 0)))).state, ScheduleState::NotDue);
        assert_eq!(
            eval(&config(None, Some(at(11, 0, 0)))).state,
            ScheduleState::Unscheduled
        );
        assert_eq!(
            eval(&config(Some("0 0 * * * *"), Some(at(11, 0, 0)))).state,
            ScheduleState::Overdue
        );
        // recurring cron never persisted yet
        assert_eq!(
            eval(&config(Some("0 0 * * * *"), None)).state,
            ScheduleState::Overdue
        );
        assert_eq!(
            eval(&config(Some("0 0 * * * *"), Some(at(12, 0, 0)))).state,
            ScheduleState::Due
        );
    }

    #[test]
    fn invalid_cron_is_an_error() {
        let result = ScanConfigSchedule::evaluate(&config(Some("every day"), None), window(at(12, 0, 0)));
        assert!(result.is_err());
    }

    #[test]
    fn next_operation_time_is_past_the_next_window() {
        let schedule = ScanConfigSchedule::evaluate(
            &config(Some("0 * * * * *"), Some(at(12, 0, 0))),
            window(at(12, 0, 0)),
        )
        .unwrap();
        assert_eq!(schedule.state, ScheduleState::Due);
        // next window starts 12:00:30, first minute boundary at or after it
        assert_eq!(schedule.next_operation_time(), Some(at(12, 1, 0)));

        let overdue = ScanConfigSchedule::evaluate(
            &config(Some("0 0 * * * *"), Some(at(3, 0, 0))),
            window(at(12, 0, 0)),
        )
        .unwrap();
        assert_eq!(overdue.next_operation_time(), Some(at(13, 0, 0)));
    }
}
