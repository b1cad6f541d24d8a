use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use utoipa::ToSchema;

use super::clock_event::ClockLabel;

/// Filters for reading stored attendance back out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub employee_id: Option<String>,
    pub department: Option<String>,
    pub limit: u32,
}

/// One stored attendance row, as read by the report.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AttendanceReportRow {
    pub staff_no: String,
    pub name: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub tr_date: NaiveDate,
    pub tr_date_time: NaiveDateTime,
    pub clock_event: String,
    pub controller: Option<String>,
    pub scheduled_in: Option<NaiveTime>,
    pub scheduled_out: Option<NaiveTime>,
}

/// Per staff, per day view: earliest Clock In and latest Clock Out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DailyAttendance {
    #[schema(example = "MTI250034")]
    pub employee_id: String,
    pub employee_name: String,
    pub department: String,
    pub position_title: String,
    #[schema(example = "2025-03-10")]
    pub date: String,
    #[schema(example = "08:00")]
    pub scheduled_in: Option<String>,
    #[schema(example = "17:00")]
    pub scheduled_out: Option<String>,
    #[schema(example = "07:52")]
    pub actual_in: Option<String>,
    pub actual_out: Option<String>,
    pub controller_in: Option<String>,
    pub controller_out: Option<String>,
    pub missing_clock_out: bool,
}

fn hh_mm(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// Folds rows into one entry per `(staff, date)`, in first-seen order.
/// Labels other than Clock In / Clock Out / Missing Clock Out only
/// contribute the identity and schedule columns.
pub fn summarize_daily(rows: &[AttendanceReportRow]) -> Vec<DailyAttendance> {
    let mut order: Vec<(String, NaiveDate)> = Vec::new();
    let mut days: HashMap<(String, NaiveDate), (DailyAttendance, Option<NaiveTime>, Option<NaiveTime>)> =
        HashMap::new();

    for row in rows {
        let key = (row.staff_no.clone(), row.tr_date);
        let (day, first_in, last_out) = days.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            (
                DailyAttendance {
                    employee_id: row.staff_no.clone(),
                    employee_name: row.name.clone().unwrap_or_default(),
                    department: row.department.clone().unwrap_or_default(),
                    position_title: row.position.clone().unwrap_or_default(),
                    date: row.tr_date.format("%Y-%m-%d").to_string(),
                    ..Default::default()
                },
                None,
                None,
            )
        });

        if let Some(t) = row.scheduled_in {
            day.scheduled_in = Some(hh_mm(t));
        }
        if let Some(t) = row.scheduled_out {
            day.scheduled_out = Some(hh_mm(t));
        }

        let at = row.tr_date_time.time();
        match row.clock_event.parse::<ClockLabel>() {
            Ok(ClockLabel::ClockIn) if first_in.is_none_or(|t| at < t) => {
                *first_in = Some(at);
                day.actual_in = Some(hh_mm(at));
                day.controller_in = row.controller.clone();
            }
            Ok(ClockLabel::ClockOut) if last_out.is_none_or(|t| at > t) => {
                *last_out = Some(at);
                day.actual_out = Some(hh_mm(at));
                day.controller_out = row.controller.clone();
            }
            Ok(ClockLabel::MissingClockOut) => day.missing_clock_out = true,
            _ => {}
        }
    }

    order
        .into_iter()
        .filter_map(|key| days.remove(&key).map(|(day, _, _)| day))
        .collect()
}
