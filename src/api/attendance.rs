use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::config::Config;
use crate::engine::resolver::ManualShift;
use crate::engine::run::{ReportRange, RunReport, RunRequest, run_attendance};
use crate::model::attendance_report::{DailyAttendance, ReportFilter, summarize_daily};
use crate::model::clock_event::Strategy;
use crate::model::shift::TimeOfDay;
use crate::store::AttendanceReader;
use crate::store::mysql::MySqlStores;
use crate::utils::report_csv;

const DEFAULT_REPORT_LIMIT: u32 = 200;
const MAX_REPORT_LIMIT: u32 = 5_000;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RunAttendanceBody {
    /// Single day; wins over the start/end pair.
    #[schema(example = "2025-03-10", format = "date", value_type = Option<String>)]
    pub date: Option<NaiveDate>,
    #[schema(format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[schema(format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    #[schema(example = "MTI250034")]
    pub staff_no: Option<String>,
    #[serde(default)]
    pub strategy: Strategy,
    #[schema(example = "07:00")]
    pub manual_time_in: Option<String>,
    #[schema(example = "16:00")]
    pub manual_time_out: Option<String>,
    #[serde(default)]
    pub persist: bool,
    #[serde(default)]
    pub propagate: bool,
    #[serde(default)]
    pub replace_existing: bool,
    /// Write the CSV report (and send it when `chat_id` is set).
    #[serde(default)]
    pub export: bool,
    pub chat_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RunAttendanceResponse {
    pub report: RunReport,
    #[schema(example = "attreport_2025-03-10.csv")]
    pub report_file: Option<String>,
}

fn manual_time(field: &str, raw: Option<&str>) -> Result<Option<NaiveTime>, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => match TimeOfDay::parse(value) {
            TimeOfDay::Parsed(t) => Ok(Some(t)),
            TimeOfDay::Invalid => Err(format!("{field} must be HH:MM or HH:MM:SS")),
        },
    }
}

/// Run one attendance batch
#[utoipa::path(
    post,
    path = "/api/v1/attendance/run",
    request_body = RunAttendanceBody,
    responses(
        (status = 200, description = "Batch classified", body = RunAttendanceResponse),
        (status = 400, description = "Invalid manual shift times", body = Object, example = json!({
            "message": "manual_time_in must be HH:MM or HH:MM:SS"
        })),
        (status = 429, description = "Too many requests"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
pub async fn run_attendance_batch(
    stores: web::Data<MySqlStores>,
    config: web::Data<Config>,
    body: web::Json<RunAttendanceBody>,
) -> actix_web::Result<impl Responder> {
    let body = body.into_inner();

    let manual = match (
        manual_time("manual_time_in", body.manual_time_in.as_deref()),
        manual_time("manual_time_out", body.manual_time_out.as_deref()),
    ) {
        (Ok(time_in), Ok(time_out)) => ManualShift::from_parts(time_in, time_out),
        (Err(message), _) | (_, Err(message)) => {
            return Ok(HttpResponse::BadRequest().json(json!({ "message": message })));
        }
    };

    let now = Local::now().naive_local();
    let request = RunRequest {
        range: ReportRange::from_args(body.date, body.start_date, body.end_date, now),
        staff_no: body.staff_no.filter(|s| !s.trim().is_empty()),
        strategy: body.strategy,
        manual,
        persist: body.persist,
        propagate: body.propagate,
        replace_existing: body.replace_existing,
    };

    let report = run_attendance(
        &stores.scans,
        &stores.schedules,
        &stores.attendance,
        &stores.clocking,
        &config.engine,
        &request,
        now,
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Attendance run failed");
        ErrorInternalServerError("Internal Server Error")
    })?;

    let report_file = if body.export {
        let path = report_csv::publish(
            &config,
            &request.range,
            request.staff_no.as_deref(),
            &report.events,
            body.chat_id.as_deref(),
        )
        .await
        .map_err(|e| {
            error!(error = %e, "Report export failed");
            ErrorInternalServerError("Internal Server Error")
        })?;
        path.file_name().map(|n| n.to_string_lossy().into_owned())
    } else {
        None
    };

    info!(
        total = report.stats.total,
        valid = report.stats.valid,
        report_file = ?report_file,
        "Attendance run served"
    );
    Ok(HttpResponse::Ok().json(RunAttendanceResponse {
        report,
        report_file,
    }))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AttendanceReportQuery {
    /// First day, inclusive (YYYY-MM-DD).
    #[param(value_type = Option<String>, example = "2025-03-01")]
    pub from: Option<NaiveDate>,
    /// Last day, inclusive (YYYY-MM-DD).
    #[param(value_type = Option<String>, example = "2025-03-31")]
    pub to: Option<NaiveDate>,
    #[param(example = "MTI250034")]
    pub employee_id: Option<String>,
    pub department: Option<String>,
    /// Stored rows to read (1-5000, default 200).
    pub limit: Option<u32>,
}

impl AttendanceReportQuery {
    fn filter(&self) -> Result<ReportFilter, String> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err("from must not be after to".into());
            }
        }
        let text = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        Ok(ReportFilter {
            from: self.from,
            to: self.to,
            employee_id: text(&self.employee_id),
            department: text(&self.department),
            limit: self
                .limit
                .unwrap_or(DEFAULT_REPORT_LIMIT)
                .clamp(1, MAX_REPORT_LIMIT),
        })
    }
}

#[derive(Serialize, ToSchema)]
pub struct DailyAttendanceList {
    pub data: Vec<DailyAttendance>,
}

async fn load_daily_report<R: AttendanceReader>(
    store: &R,
    filter: &ReportFilter,
) -> actix_web::Result<DailyAttendanceList> {
    let rows = store.report_rows(filter).await.map_err(|e| {
        error!(error = %e, "Failed to load attendance report");
        ErrorInternalServerError("Internal Server Error")
    })?;
    Ok(DailyAttendanceList {
        data: summarize_daily(&rows),
    })
}

/// Stored attendance, one entry per staff and day
#[utoipa::path(
    get,
    path = "/api/v1/attendance/report",
    params(AttendanceReportQuery),
    responses(
        (status = 200, description = "Daily attendance", body = DailyAttendanceList),
        (status = 400, description = "Invalid date range", body = Object, example = json!({
            "message": "from must not be after to"
        })),
        (status = 429, description = "Too many requests"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
pub async fn attendance_report(
    stores: web::Data<MySqlStores>,
    query: web::Query<AttendanceReportQuery>,
) -> actix_web::Result<impl Responder> {
    let filter = match query.filter() {
        Ok(filter) => filter,
        Err(message) => return Ok(HttpResponse::BadRequest().json(json!({ "message": message }))),
    };
    let report = load_daily_report(&stores.attendance, &filter).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Pools;
    use crate::model::attendance::AttendanceRecord;
    use crate::model::clock_event::{ClassifiedEvent, ClockLabel};
    use crate::model::scan_event::CardHolder;
    use crate::store::memory::MemoryAttendanceStore;
    use actix_web::test::{TestRequest, call_service, init_service, read_body_json};
    use actix_web::{App, http::StatusCode};

    #[test]
    fn blank_manual_time_is_absent() {
        assert_eq!(manual_time("manual_time_in", Some("  ")), Ok(None));
        assert_eq!(
            manual_time("manual_time_in", Some("7:30")),
            Ok(NaiveTime::from_hms_opt(7, 30, 0))
        );
        assert!(manual_time("manual_time_out", Some("late")).is_err());
    }

    #[actix_web::test]
    async fn bad_manual_time_is_rejected_before_any_query() {
        let config = Config::for_tests();
        let stores = MySqlStores::new(&Pools::lazy(&config), &config);
        let app = init_service(
            App::new()
                .app_data(web::Data::new(stores))
                .app_data(web::Data::new(config))
                .route("/run", web::post().to(run_attendance_batch)),
        )
        .await;

        let req = TestRequest::post()
            .uri("/run")
            .set_json(json!({ "date": "2025-03-10", "manual_time_in": "seven" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = read_body_json(resp).await;
        assert_eq!(body["message"], "manual_time_in must be HH:MM or HH:MM:SS");
    }

    #[test]
    fn report_limit_is_clamped() {
        let query = AttendanceReportQuery {
            limit: Some(0),
            employee_id: Some("  ".into()),
            ..Default::default()
        };
        let filter = query.filter().unwrap();
        assert_eq!(filter.limit, 1);
        assert_eq!(filter.employee_id, None);

        let filter = AttendanceReportQuery::default().filter().unwrap();
        assert_eq!(filter.limit, DEFAULT_REPORT_LIMIT);
    }

    #[actix_web::test]
    async fn report_folds_stored_rows_per_day() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let record = |h: u32, label: ClockLabel, controller: &str| {
            let event = ClassifiedEvent {
                employee_id: "MTI7".into(),
                timestamp: day.and_hms_opt(h, 0, 0).unwrap(),
                controller: controller.into(),
                unit_no: "2".into(),
                status: "Valid Entry Access".into(),
                holder: CardHolder::default(),
                label,
                window: None,
            };
            AttendanceRecord::from_classified(&event, day.and_hms_opt(18, 0, 0).unwrap())
        };
        let store = MemoryAttendanceStore::default()
            .with_record(record(17, ClockLabel::ClockOut, "Gate B"))
            .with_record(record(8, ClockLabel::ClockIn, "Gate A"));

        let filter = AttendanceReportQuery {
            from: Some(day),
            to: Some(day),
            ..Default::default()
        }
        .filter()
        .unwrap();
        let report = load_daily_report(&store, &filter).await.unwrap();

        assert_eq!(report.data.len(), 1);
        assert_eq!(report.data[0].actual_in.as_deref(), Some("08:00"));
        assert_eq!(report.data[0].controller_out.as_deref(), Some("Gate B"));
    }

    #[actix_web::test]
    async fn reversed_report_range_is_rejected() {
        let config = Config::for_tests();
        let stores = MySqlStores::new(&Pools::lazy(&config), &config);
        let app = init_service(
            App::new()
                .app_data(web::Data::new(stores))
                .route("/report", web::get().to(attendance_report)),
        )
        .await;

        let req = TestRequest::get()
            .uri("/report?from=2025-03-11&to=2025-03-10")
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = read_body_json(resp).await;
        assert_eq!(body["message"], "from must not be after to");
    }
}
