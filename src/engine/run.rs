use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use super::persistence::{PersistSummary, persist_batch};
use super::processor::{BatchOptions, BatchStats, process};
use super::propagation::{PropagationSummary, propagate};
use super::resolver::{ManualShift, ScheduleResolver};
use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::model::clock_event::{ClassifiedEvent, Strategy};
use crate::store::{AttendanceStore, ClockingSink, ScanEventSource, ScanQuery, ScheduleStore};

#[derive(Debug, Clone, PartialEq, Eq)]
enum RangeKind {
    Day(NaiveDate),
    Span(NaiveDate, NaiveDate),
    Last24h(NaiveDateTime),
}

/// Time range of one report run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    kind: RangeKind,
}

fn end_of(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::seconds(1)
}

impl ReportRange {
    /// `date` wins; otherwise a missing start or end is replaced by the
    /// other one; with nothing given the range is the 24 hours ending `now`.
    pub fn from_args(
        date: Option<NaiveDate>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        now: NaiveDateTime,
    ) -> Self {
        if let Some(day) = date {
            return Self {
                start: day.and_time(NaiveTime::MIN),
                end: end_of(day),
                kind: RangeKind::Day(day),
            };
        }
        match (start_date.or(end_date), end_date.or(start_date)) {
            (Some(first), Some(last)) => {
                if first > last {
                    warn!(%first, %last, "Start date is after end date");
                }
                Self {
                    start: first.and_time(NaiveTime::MIN),
                    end: end_of(last),
                    kind: RangeKind::Span(first, last),
                }
            }
            _ => Self {
                start: now - Duration::hours(24),
                end: now,
                kind: RangeKind::Last24h(now),
            },
        }
    }

    /// `attreport_[STAFF_]<range>.csv`
    pub fn file_name(&self, staff_no: Option<&str>) -> String {
        let staff = staff_no.map(|s| format!("{s}_")).unwrap_or_default();
        let range = match &self.kind {
            RangeKind::Day(day) => day.format("%Y-%m-%d").to_string(),
            RangeKind::Span(first, last) => {
                format!("{}_to_{}", first.format("%Y-%m-%d"), last.format("%Y-%m-%d"))
            }
            RangeKind::Last24h(now) => format!("24h_{}", now.format("%Y%m%d_%H%M%S")),
        };
        format!("attreport_{staff}{range}.csv")
    }

    /// Caption sent along with the report file.
    pub fn message(&self, staff_no: Option<&str>) -> String {
        let staff = staff_no.map(|s| format!(" for {s}")).unwrap_or_default();
        if self.start.date() == self.end.date() {
            format!(
                "Team, here is the attendance report{staff} for {}",
                self.start.format("%A, %Y-%m-%d")
            )
        } else {
            format!(
                "Team, here is the attendance report{staff} for the period: {} to {}",
                self.start.format("%Y-%m-%d %H:%M:%S"),
                self.end.format("%Y-%m-%d %H:%M:%S")
            )
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub range: ReportRange,
    pub staff_no: Option<String>,
    pub strategy: Strategy,
    /// Takes precedence over the configured manual shift.
    pub manual: Option<ManualShift>,
    pub persist: bool,
    pub propagate: bool,
    pub replace_existing: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RunReport {
    #[schema(format = "date-time", value_type = String)]
    pub start: NaiveDateTime,
    #[schema(format = "date-time", value_type = String)]
    pub end: NaiveDateTime,
    pub stats: BatchStats,
    pub persisted: Option<PersistSummary>,
    pub propagated: Option<PropagationSummary>,
    pub events: Vec<ClassifiedEvent>,
}

/// One attendance batch: fetch, classify, synthesize, then optionally persist
/// and forward. Any connectivity failure aborts the whole run.
#[instrument(
    name = "attendance_run",
    skip_all,
    fields(start = %request.range.start, end = %request.range.end, staff_no = ?request.staff_no)
)]
pub async fn run_attendance<Src, S, A, K>(
    scans: &Src,
    schedules: &S,
    attendance: &A,
    sink: &K,
    engine: &EngineConfig,
    request: &RunRequest,
    now: NaiveDateTime,
) -> Result<RunReport, StoreError>
where
    Src: ScanEventSource,
    S: ScheduleStore,
    A: AttendanceStore,
    K: ClockingSink,
{
    let query = ScanQuery {
        start: request.range.start,
        end: request.range.end,
        staff_no: request.staff_no.clone(),
    };
    let events = scans.fetch(&query).await?;
    info!(scans = events.len(), "Scan events retrieved");

    let resolver = ScheduleResolver::new(schedules);
    let options = BatchOptions {
        tolerance_seconds: engine.tolerance_seconds,
        strategy: request.strategy,
        manual: request.manual.or_else(|| engine.manual()),
        batch_end: request.range.end,
        synthesize_missing: true,
    };
    let outcome = process(&resolver, &events, &options).await?;

    let persisted = if request.persist {
        Some(persist_batch(attendance, &outcome.events, request.replace_existing, now).await?)
    } else {
        None
    };
    let propagated = if request.propagate {
        Some(propagate(attendance, sink, now).await?)
    } else {
        None
    };

    Ok(RunReport {
        start: request.range.start,
        end: request.range.end,
        stats: outcome.stats,
        persisted,
        propagated,
        events: outcome.events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::clock_event::ClockLabel;
    use crate::model::scan_event::{CardHolder, ScanEvent};
    use crate::store::memory::{
        MemoryAttendanceStore, MemoryClockingSink, MemoryScanSource, MemoryScheduleStore,
    };

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        d(day).and_hms_opt(h, m, 0).unwrap()
    }

    fn scan(employee: &str, ts: NaiveDateTime) -> ScanEvent {
        ScanEvent {
            employee_id: employee.into(),
            timestamp: ts,
            controller: "FR-Acid Halte-4626".into(),
            unit_no: "5".into(),
            status: "Valid Entry Access".into(),
            holder: CardHolder::default(),
        }
    }

    fn request(range: ReportRange) -> RunRequest {
        RunRequest {
            range,
            staff_no: None,
            strategy: Strategy::Windowed,
            manual: None,
            persist: true,
            propagate: true,
            replace_existing: false,
        }
    }

    #[test]
    fn single_date_covers_the_whole_day() {
        let r = ReportRange::from_args(Some(d(10)), Some(d(1)), None, at(12, 9, 0));
        assert_eq!(r.start, at(10, 0, 0));
        assert_eq!(r.end, d(10).and_hms_opt(23, 59, 59).unwrap());
        assert_eq!(r.file_name(Some("MTI250034")), "attreport_MTI250034_2025-03-10.csv");
        assert_eq!(
            r.message(None),
            "Team, here is the attendance report for Monday, 2025-03-10"
        );
    }

    #[test]
    fn one_sided_span_uses_the_other_end() {
        let r = ReportRange::from_args(None, None, Some(d(11)), at(12, 9, 0));
        assert_eq!(r.start, at(11, 0, 0));
        assert_eq!(r.end, d(11).and_hms_opt(23, 59, 59).unwrap());
        assert_eq!(r.file_name(None), "attreport_2025-03-11_to_2025-03-11.csv");

        let r = ReportRange::from_args(None, Some(d(9)), Some(d(11)), at(12, 9, 0));
        assert_eq!(r.file_name(None), "attreport_2025-03-09_to_2025-03-11.csv");
        assert!(r.message(Some("MTI7")).contains("for MTI7 for the period: 2025-03-09 00:00:00"));
    }

    #[test]
    fn no_dates_means_last_day() {
        let now = d(12).and_hms_opt(9, 30, 15).unwrap();
        let r = ReportRange::from_args(None, None, None, now);
        assert_eq!(r.end, now);
        assert_eq!(r.end - r.start, Duration::hours(24));
        assert_eq!(r.file_name(None), "attreport_24h_20250312_093015.csv");
    }

    #[actix_web::test]
    async fn full_run_persists_and_forwards() {
        let scans = MemoryScanSource::new(vec![
            scan("E1", at(10, 7, 50)),
            scan("E1", at(10, 12, 0)),
            scan("E1", at(10, 17, 5)),
            scan("E2", at(10, 8, 10)),
            scan("E9", at(10, 8, 0)),
        ]);
        let schedules = MemoryScheduleStore::default()
            .with_profile("E1", Some("08:00"), Some("17:00"), None)
            .with_profile("E2", Some("08:00"), Some("17:00"), None);
        let attendance = MemoryAttendanceStore::default();
        let sink = MemoryClockingSink::default();
        let range = ReportRange::from_args(None, Some(d(10)), Some(d(11)), at(12, 0, 0));

        let report = run_attendance(
            &scans,
            &schedules,
            &attendance,
            &sink,
            &EngineConfig::default(),
            &request(range),
            at(12, 0, 0),
        )
        .await
        .unwrap();

        assert_eq!(report.stats.total, 5);
        assert_eq!(report.stats.no_shift_data, 1);
        assert_eq!(report.stats.valid, 3);
        assert_eq!(report.stats.synthesized, 1);
        let missing: Vec<_> = report
            .events
            .iter()
            .filter(|e| e.label == ClockLabel::MissingClockOut)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].employee_id, "E2");

        assert_eq!(report.persisted.unwrap().inserted, 5);
        assert_eq!(report.propagated.unwrap().forwarded, 3);
        assert_eq!(sink.entries().len(), 3);
    }

    #[actix_web::test]
    async fn schedule_outage_aborts_before_writing() {
        let scans = MemoryScanSource::new(vec![scan("E1", at(10, 7, 50))]);
        let schedules = MemoryScheduleStore::default().unavailable();
        let attendance = MemoryAttendanceStore::default();
        let sink = MemoryClockingSink::default();
        let range = ReportRange::from_args(Some(d(10)), None, None, at(12, 0, 0));

        let err = run_attendance(
            &scans,
            &schedules,
            &attendance,
            &sink,
            &EngineConfig::default(),
            &request(range),
            at(12, 0, 0),
        )
        .await
        .unwrap_err();

        assert!(err.is_fatal());
        assert!(attendance.records().is_empty());
    }
}
