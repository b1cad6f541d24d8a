//! Storage seams used by the engine. MySQL implementations live in
//! [`mysql`]; tests use the in-memory ones in `memory`.

use chrono::{NaiveDate, NaiveDateTime};

use crate::engine::change_detector::ColumnLimits;
use crate::error::StoreError;
use crate::model::attendance::{AttendanceKey, AttendanceRecord, ClockingEntry, PendingClocking};
use crate::model::attendance_report::{AttendanceReportRow, ReportFilter};
use crate::model::scan_event::ScanEvent;
use crate::model::schedule_profile::{ProfileShiftRow, ScheduleLockRow, ScheduleProfileRecord};
use crate::model::sync_log::{SyncSettings, SyncSummary};

#[cfg(test)]
pub mod memory;
pub mod mysql;

/// Outcome of an insert-or-ignore into the schedule lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockInsert {
    Inserted,
    AlreadyPresent,
}

#[allow(async_fn_in_trait)]
pub trait ScheduleStore {
    async fn find_lock(
        &self,
        employee_id: &str,
        shift_date: NaiveDate,
    ) -> Result<Option<ScheduleLockRow>, StoreError>;

    async fn find_profile_shift(
        &self,
        employee_id: &str,
    ) -> Result<Option<ProfileShiftRow>, StoreError>;

    /// Must treat an existing `(employee, date)` row as `AlreadyPresent`.
    async fn insert_lock(&self, row: &ScheduleLockRow) -> Result<LockInsert, StoreError>;
}

/// Time range and optional single-employee filter for a scan fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanQuery {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub staff_no: Option<String>,
}

#[allow(async_fn_in_trait)]
pub trait ScanEventSource {
    /// Results are ordered by employee, date, then timestamp.
    async fn fetch(&self, query: &ScanQuery) -> Result<Vec<ScanEvent>, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait AttendanceStore {
    async fn exists(&self, key: &AttendanceKey) -> Result<bool, StoreError>;

    /// Returns `StoreError::Duplicate` when the key is already stored.
    async fn insert(&self, record: &AttendanceRecord) -> Result<(), StoreError>;

    /// Deletes the row with `record`'s key and inserts `record` as one unit;
    /// on failure the old row stays.
    async fn replace(&self, record: &AttendanceRecord) -> Result<(), StoreError>;

    async fn unprocessed(&self) -> Result<Vec<PendingClocking>, StoreError>;

    async fn mark_processed(
        &self,
        employee_id: &str,
        timestamp: NaiveDateTime,
    ) -> Result<u64, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait AttendanceReader {
    /// Stored rows matching `filter`, ordered by staff then timestamp.
    async fn report_rows(&self, filter: &ReportFilter) -> Result<Vec<AttendanceReportRow>, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait ClockingSink {
    /// Idempotent on `(finger_print_id, date_time)`.
    async fn forward(&self, entry: &ClockingEntry) -> Result<(), StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait ProfileSource {
    /// Every profile joined with its day-type schedule for `as_of`.
    async fn fetch_all(&self, as_of: NaiveDate) -> Result<Vec<ScheduleProfileRecord>, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait ProfileCache {
    async fn fetch_all(&self) -> Result<Vec<ScheduleProfileRecord>, StoreError>;

    async fn column_limits(&self) -> Result<ColumnLimits, StoreError>;

    async fn insert(&self, record: &ScheduleProfileRecord) -> Result<(), StoreError>;

    async fn update(&self, record: &ScheduleProfileRecord) -> Result<u64, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait SyncLogStore {
    async fn save(&self, summary: &SyncSummary) -> Result<(), StoreError>;

    async fn recent(&self, limit: u32) -> Result<Vec<SyncSummary>, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait SyncSettingsStore {
    async fn load_settings(&self) -> Result<Option<SyncSettings>, StoreError>;

    async fn save_settings(&self, settings: &SyncSettings) -> Result<(), StoreError>;
}
