use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result of normalizing a stored time-of-day value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Parsed(NaiveTime),
    Invalid,
}

impl TimeOfDay {
    /// Accepts `HH:MM`, `HH:MM:SS` and `HH:MM:SS.fff` (fraction dropped).
    pub fn parse(raw: &str) -> Self {
        let t = raw.trim();
        let t = t.split('.').next().unwrap_or(t);

        let parsed = match t.len() {
            4 | 5 => NaiveTime::parse_from_str(t, "%H:%M"),
            _ => NaiveTime::parse_from_str(t, "%H:%M:%S"),
        };

        match parsed {
            Ok(time) => TimeOfDay::Parsed(time),
            Err(_) => TimeOfDay::Invalid,
        }
    }

    /// Missing values normalize to `Invalid` as well.
    pub fn from_column(value: Option<&str>) -> Self {
        value.map(Self::parse).unwrap_or(TimeOfDay::Invalid)
    }

    pub fn time(self) -> Option<NaiveTime> {
        match self {
            TimeOfDay::Parsed(t) => Some(t),
            TimeOfDay::Invalid => None,
        }
    }
}

/// Interprets the stored "crosses midnight" flag. Anything unrecognised is false.
pub fn parse_next_day(raw: Option<&str>) -> bool {
    match raw.map(|v| v.trim().to_lowercase()) {
        Some(v) => matches!(v.as_str(), "y" | "yes" | "true" | "1"),
        None => false,
    }
}

/// Where a resolved window came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSource {
    ManualOverride,
    Cached,
    Profile,
}

/// Resolved shift boundaries for one employee on one date.
///
/// `end` is always strictly after `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ShiftWindow {
    pub employee_id: String,
    #[schema(example = "2025-03-10", format = "date", value_type = String)]
    pub shift_date: NaiveDate,
    #[schema(example = "2025-03-10T08:00:00", format = "date-time", value_type = String)]
    pub start: NaiveDateTime,
    #[schema(example = "2025-03-10T17:00:00", format = "date-time", value_type = String)]
    pub end: NaiveDateTime,
    pub source: ScheduleSource,
}

impl ShiftWindow {
    /// Combines both times with `shift_date`. An explicit `next_day` moves the
    /// end one day forward first; the end is still rolled over afterwards if
    /// it does not come after the start.
    pub fn resolve(
        employee_id: &str,
        shift_date: NaiveDate,
        time_in: NaiveTime,
        time_out: NaiveTime,
        next_day: bool,
        source: ScheduleSource,
    ) -> Self {
        let start = shift_date.and_time(time_in);
        let mut end = shift_date.and_time(time_out);
        if next_day {
            end += Duration::days(1);
        }
        if end <= start {
            end += Duration::days(1);
        }

        Self {
            employee_id: employee_id.to_string(),
            shift_date,
            start,
            end,
            source,
        }
    }

    /// `[end - 1h, end + 8h]`, the span in which a scan counts as clocking out.
    pub fn clock_out_span(&self) -> (NaiveDateTime, NaiveDateTime) {
        (self.end - Duration::hours(1), self.end + Duration::hours(8))
    }

    /// `[start - tolerance, start + 1h]`.
    pub fn clock_in_span(&self, tolerance_seconds: i64) -> (NaiveDateTime, NaiveDateTime) {
        (
            self.start - Duration::seconds(tolerance_seconds),
            self.start + Duration::hours(1),
        )
    }
}
