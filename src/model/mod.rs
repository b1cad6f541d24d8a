pub mod attendance;
pub mod attendance_report;
pub mod clock_event;
pub mod scan_event;
pub mod schedule_profile;
pub mod shift;
pub mod sync_log;
