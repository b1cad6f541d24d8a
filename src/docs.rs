use crate::api::attendance::{DailyAttendanceList, RunAttendanceBody, RunAttendanceResponse};
use crate::api::schedule::{ScheduleComboList, SchedulingEmployeeList};
use crate::engine::persistence::PersistSummary;
use crate::engine::processor::BatchStats;
use crate::engine::propagation::PropagationSummary;
use crate::engine::run::RunReport;
use crate::model::attendance_report::DailyAttendance;
use crate::model::clock_event::{ClassifiedEvent, ClockLabel, Strategy};
use crate::model::scan_event::CardHolder;
use crate::model::schedule_profile::{ScheduleCombo, SchedulingEmployee};
use crate::model::shift::{ScheduleSource, ShiftWindow};
use crate::model::sync_log::{SyncSettings, SyncStatus, SyncSummary};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shiftclock API",
        version = "0.1.0",
        description = r#"
## Shift attendance classification

Turns raw badge scans into Clock In / Clock Out records against each
employee's shift schedule.

### Features
- **Attendance runs**
  - Classify a date range, synthesize missing clock-outs, persist and forward
  - Read stored attendance back as one row per staff and day
- **Schedule cache**
  - Reconcile the local schedule mirror with the source-of-truth system
  - Inspect sync history, the cached profiles and their shift patterns
  - Adjust the periodic sync interval at runtime

### Limits
Every route is rate limited per client IP. Batch runs and syncs have a much
lower budget than reads.
"#,
    ),
    paths(
        crate::api::attendance::run_attendance_batch,
        crate::api::attendance::attendance_report,

        crate::api::schedule::sync_now,
        crate::api::schedule::last_sync,
        crate::api::schedule::sync_logs,
        crate::api::schedule::sync_status,
        crate::api::schedule::update_sync_config,
        crate::api::schedule::list_employees,
        crate::api::schedule::list_combos,

        crate::api::health::health
    ),
    components(
        schemas(
            RunAttendanceBody,
            RunAttendanceResponse,
            RunReport,
            BatchStats,
            PersistSummary,
            PropagationSummary,
            ClassifiedEvent,
            ClockLabel,
            Strategy,
            CardHolder,
            ShiftWindow,
            ScheduleSource,
            DailyAttendance,
            DailyAttendanceList,
            SyncSummary,
            SyncSettings,
            SyncStatus,
            SchedulingEmployee,
            SchedulingEmployeeList,
            ScheduleCombo,
            ScheduleComboList
        )
    ),
    tags(
        (name = "Attendance", description = "Attendance batch runs"),
        (name = "Schedule", description = "Schedule cache reconciliation"),
        (name = "Health", description = "Service health"),
    )
)]
pub struct ApiDoc;
