//! In-memory stores for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{NaiveDate, NaiveDateTime};

use super::{
    AttendanceReader, AttendanceStore, ClockingSink, LockInsert, ProfileCache, ProfileSource,
    ScanEventSource, ScanQuery, ScheduleStore, SyncLogStore, SyncSettingsStore,
};
use crate::engine::change_detector::ColumnLimits;
use crate::error::StoreError;
use crate::model::attendance::{AttendanceKey, AttendanceRecord, ClockingEntry, PendingClocking};
use crate::model::attendance_report::{AttendanceReportRow, ReportFilter};
use crate::model::scan_event::ScanEvent;
use crate::model::schedule_profile::{ProfileShiftRow, ScheduleLockRow, ScheduleProfileRecord};
use crate::model::sync_log::{SyncSettings, SyncSummary};

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".into())
}

fn owned(v: Option<&str>) -> Option<String> {
    v.map(str::to_string)
}

#[derive(Default)]
pub struct MemoryScheduleStore {
    locks: Mutex<HashMap<(String, NaiveDate), ScheduleLockRow>>,
    profiles: HashMap<String, ProfileShiftRow>,
    lock_race: bool,
    unavailable: bool,
    broken_for: Option<String>,
    lock_reads: AtomicUsize,
    profile_reads: AtomicUsize,
    lock_writes: AtomicUsize,
}

impl MemoryScheduleStore {
    pub fn with_lock(
        self,
        employee_id: &str,
        shift_date: NaiveDate,
        time_in: Option<&str>,
        time_out: Option<&str>,
        next_day: Option<&str>,
    ) -> Self {
        if let Ok(mut locks) = self.locks.lock() {
            locks.insert(
                (employee_id.to_string(), shift_date),
                ScheduleLockRow {
                    employee_id: employee_id.to_string(),
                    shift_date,
                    scheduled_in: owned(time_in),
                    scheduled_out: owned(time_out),
                    next_day: owned(next_day),
                },
            );
        }
        self
    }

    pub fn with_profile(
        mut self,
        employee_id: &str,
        time_in: Option<&str>,
        time_out: Option<&str>,
        next_day: Option<&str>,
    ) -> Self {
        self.profiles.insert(
            employee_id.to_string(),
            ProfileShiftRow {
                time_in: owned(time_in),
                time_out: owned(time_out),
                next_day: owned(next_day),
            },
        );
        self
    }

    /// Every lock insert behaves as if another run got there first.
    pub fn with_lock_race(mut self) -> Self {
        self.lock_race = true;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Lock reads for this employee fail as if the row could not be decoded.
    pub fn broken_for(mut self, employee_id: &str) -> Self {
        self.broken_for = Some(employee_id.to_string());
        self
    }

    pub fn lock_reads(&self) -> usize {
        self.lock_reads.load(Ordering::SeqCst)
    }

    pub fn profile_reads(&self) -> usize {
        self.profile_reads.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.lock_reads() + self.profile_reads()
    }

    pub fn lock_writes(&self) -> usize {
        self.lock_writes.load(Ordering::SeqCst)
    }
}

impl ScheduleStore for MemoryScheduleStore {
    async fn find_lock(
        &self,
        employee_id: &str,
        shift_date: NaiveDate,
    ) -> Result<Option<ScheduleLockRow>, StoreError> {
        self.lock_reads.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(down());
        }
        if self.broken_for.as_deref() == Some(employee_id) {
            return Err(StoreError::Query(
                "error occurred while decoding column \"ScheduledIn\"".into(),
            ));
        }
        let locks = self.locks.lock().map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(locks.get(&(employee_id.to_string(), shift_date)).cloned())
    }

    async fn find_profile_shift(
        &self,
        employee_id: &str,
    ) -> Result<Option<ProfileShiftRow>, StoreError> {
        self.profile_reads.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(down());
        }
        Ok(self.profiles.get(employee_id).cloned())
    }

    async fn insert_lock(&self, row: &ScheduleLockRow) -> Result<LockInsert, StoreError> {
        if self.unavailable {
            return Err(down());
        }
        if self.lock_race {
            return Ok(LockInsert::AlreadyPresent);
        }
        let mut locks = self.locks.lock().map_err(|e| StoreError::Query(e.to_string()))?;
        let key = (row.employee_id.clone(), row.shift_date);
        if locks.contains_key(&key) {
            return Ok(LockInsert::AlreadyPresent);
        }
        locks.insert(key, row.clone());
        self.lock_writes.fetch_add(1, Ordering::SeqCst);
        Ok(LockInsert::Inserted)
    }
}

#[derive(Default)]
pub struct MemoryScanSource {
    events: Vec<ScanEvent>,
}

impl MemoryScanSource {
    pub fn new(events: Vec<ScanEvent>) -> Self {
        Self { events }
    }
}

impl ScanEventSource for MemoryScanSource {
    async fn fetch(&self, query: &ScanQuery) -> Result<Vec<ScanEvent>, StoreError> {
        let mut out: Vec<ScanEvent> = self
            .events
            .iter()
            .filter(|e| query.start <= e.timestamp && e.timestamp <= query.end)
            .filter(|e| query.staff_no.as_deref().is_none_or(|s| s == e.employee_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            (a.employee_id.as_str(), a.timestamp).cmp(&(b.employee_id.as_str(), b.timestamp))
        });
        Ok(out)
    }
}

#[derive(Default)]
pub struct MemoryAttendanceStore {
    rows: Mutex<Vec<AttendanceRecord>>,
    stale_exists: bool,
    failing_for: Option<String>,
    unavailable: bool,
}

impl MemoryAttendanceStore {
    /// `exists` always answers false, so only the unique key guards inserts.
    pub fn with_stale_exists(mut self) -> Self {
        self.stale_exists = true;
        self
    }

    pub fn failing_for(mut self, employee_id: &str) -> Self {
        self.failing_for = Some(employee_id.to_string());
        self
    }

    pub fn with_record(self, record: AttendanceRecord) -> Self {
        if let Ok(mut rows) = self.rows.lock() {
            rows.push(record);
        }
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn records(&self) -> Vec<AttendanceRecord> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    fn rows(&self) -> Result<std::sync::MutexGuard<'_, Vec<AttendanceRecord>>, StoreError> {
        if self.unavailable {
            return Err(down());
        }
        self.rows.lock().map_err(|e| StoreError::Query(e.to_string()))
    }
}

impl AttendanceStore for MemoryAttendanceStore {
    async fn exists(&self, key: &AttendanceKey) -> Result<bool, StoreError> {
        let rows = self.rows()?;
        Ok(!self.stale_exists && rows.iter().any(|r| r.key() == *key))
    }

    async fn insert(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let mut rows = self.rows()?;
        if self.failing_for.as_deref() == Some(record.employee_id.as_str()) {
            return Err(StoreError::Query("invalid column value".into()));
        }
        let key = record.key();
        if rows.iter().any(|r| r.key() == key) {
            return Err(StoreError::Duplicate);
        }
        rows.push(record.clone());
        Ok(())
    }

    async fn replace(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let mut rows = self.rows()?;
        if self.failing_for.as_deref() == Some(record.employee_id.as_str()) {
            return Err(StoreError::Query("invalid column value".into()));
        }
        let key = record.key();
        rows.retain(|r| r.key() != key);
        rows.push(record.clone());
        Ok(())
    }

    async fn unprocessed(&self) -> Result<Vec<PendingClocking>, StoreError> {
        let rows = self.rows()?;
        let mut pending: Vec<PendingClocking> = rows
            .iter()
            .filter(|r| !r.processed && r.label.is_attendance())
            .map(|r| PendingClocking {
                employee_id: r.employee_id.clone(),
                timestamp: r.timestamp,
                label: r.label,
                unit_no: r.unit_no.clone(),
            })
            .collect();
        pending.sort_by_key(|p| p.timestamp);
        Ok(pending)
    }

    async fn mark_processed(
        &self,
        employee_id: &str,
        timestamp: NaiveDateTime,
    ) -> Result<u64, StoreError> {
        let mut rows = self.rows()?;
        let mut marked = 0;
        for row in rows
            .iter_mut()
            .filter(|r| r.employee_id == employee_id && r.timestamp == timestamp)
            .filter(|r| r.label.is_attendance())
        {
            row.processed = true;
            marked += 1;
        }
        Ok(marked)
    }
}

impl AttendanceReader for MemoryAttendanceStore {
    async fn report_rows(&self, filter: &ReportFilter) -> Result<Vec<AttendanceReportRow>, StoreError> {
        let rows = self.rows()?;
        let mut matched: Vec<&AttendanceRecord> = rows
            .iter()
            .filter(|r| filter.from.is_none_or(|d| r.tr_date >= d))
            .filter(|r| filter.to.is_none_or(|d| r.tr_date <= d))
            .filter(|r| filter.employee_id.as_deref().is_none_or(|e| e == r.employee_id))
            .filter(|r| filter.department.as_deref().is_none_or(|d| d == r.department))
            .collect();
        matched.sort_by(|a, b| (&a.employee_id, a.timestamp).cmp(&(&b.employee_id, b.timestamp)));
        Ok(matched
            .into_iter()
            .take(filter.limit as usize)
            .map(|r| AttendanceReportRow {
                staff_no: r.employee_id.clone(),
                name: Some(r.name.clone()),
                department: Some(r.department.clone()),
                position: Some(r.position.clone()),
                tr_date: r.tr_date,
                tr_date_time: r.timestamp,
                clock_event: r.label.to_string(),
                controller: Some(r.controller.clone()),
                scheduled_in: r.scheduled_in,
                scheduled_out: r.scheduled_out,
            })
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryClockingSink {
    entries: Mutex<Vec<ClockingEntry>>,
    rejecting: Option<String>,
}

impl MemoryClockingSink {
    pub fn rejecting(mut self, employee_id: &str) -> Self {
        self.rejecting = Some(employee_id.to_string());
        self
    }

    pub fn entries(&self) -> Vec<ClockingEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ClockingSink for MemoryClockingSink {
    async fn forward(&self, entry: &ClockingEntry) -> Result<(), StoreError> {
        if self.rejecting.as_deref() == Some(entry.finger_print_id.as_str()) {
            return Err(StoreError::Query("clocking table rejected row".into()));
        }
        let mut entries = self.entries.lock().map_err(|e| StoreError::Query(e.to_string()))?;
        let seen = entries
            .iter()
            .any(|e| e.finger_print_id == entry.finger_print_id && e.date_time == entry.date_time);
        if !seen {
            entries.push(entry.clone());
        }
        Ok(())
    }
}

pub struct MemoryProfileSource {
    rows: Vec<ScheduleProfileRecord>,
    unavailable: bool,
}

impl MemoryProfileSource {
    pub fn new(rows: Vec<ScheduleProfileRecord>) -> Self {
        Self {
            rows,
            unavailable: false,
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }
}

impl ProfileSource for MemoryProfileSource {
    async fn fetch_all(&self, _as_of: NaiveDate) -> Result<Vec<ScheduleProfileRecord>, StoreError> {
        if self.unavailable {
            return Err(down());
        }
        Ok(self.rows.clone())
    }
}

pub struct MemoryProfileCache {
    rows: Mutex<Vec<ScheduleProfileRecord>>,
    limits: ColumnLimits,
    failing_for: Option<String>,
}

impl MemoryProfileCache {
    pub fn new(rows: Vec<ScheduleProfileRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
            limits: ColumnLimits::default(),
            failing_for: None,
        }
    }

    pub fn with_limits(mut self, limits: ColumnLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn failing_for(mut self, employee_id: &str) -> Self {
        self.failing_for = Some(employee_id.to_string());
        self
    }

    pub fn row(&self, employee_id: &str) -> Option<ScheduleProfileRecord> {
        let rows = self.rows.lock().ok()?;
        rows.iter().find(|r| r.employee_id == employee_id).cloned()
    }

    fn check(&self, record: &ScheduleProfileRecord) -> Result<(), StoreError> {
        if self.failing_for.as_deref() == Some(record.employee_id.as_str()) {
            return Err(StoreError::Query("data too long".into()));
        }
        Ok(())
    }
}

impl ProfileCache for MemoryProfileCache {
    async fn fetch_all(&self) -> Result<Vec<ScheduleProfileRecord>, StoreError> {
        let rows = self.rows.lock().map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(rows.clone())
    }

    async fn column_limits(&self) -> Result<ColumnLimits, StoreError> {
        Ok(self.limits.clone())
    }

    async fn insert(&self, record: &ScheduleProfileRecord) -> Result<(), StoreError> {
        self.check(record)?;
        let mut rows = self.rows.lock().map_err(|e| StoreError::Query(e.to_string()))?;
        if rows.iter().any(|r| r.employee_id == record.employee_id) {
            return Err(StoreError::Duplicate);
        }
        rows.push(record.clone());
        Ok(())
    }

    async fn update(&self, record: &ScheduleProfileRecord) -> Result<u64, StoreError> {
        self.check(record)?;
        let mut rows = self.rows.lock().map_err(|e| StoreError::Query(e.to_string()))?;
        let mut changed = 0;
        for row in rows.iter_mut().filter(|r| r.employee_id == record.employee_id) {
            *row = record.clone();
            changed += 1;
        }
        Ok(changed)
    }
}

#[derive(Default)]
pub struct MemorySyncLog {
    runs: Mutex<Vec<SyncSummary>>,
    settings: Mutex<Option<SyncSettings>>,
}

impl MemorySyncLog {
    pub fn with_run(self, summary: SyncSummary) -> Self {
        if let Ok(mut runs) = self.runs.lock() {
            runs.push(summary);
        }
        self
    }

    pub fn saved(&self) -> Vec<SyncSummary> {
        self.runs.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl SyncSettingsStore for MemorySyncLog {
    async fn load_settings(&self) -> Result<Option<SyncSettings>, StoreError> {
        let settings = self.settings.lock().map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(*settings)
    }

    async fn save_settings(&self, settings: &SyncSettings) -> Result<(), StoreError> {
        let mut stored = self.settings.lock().map_err(|e| StoreError::Query(e.to_string()))?;
        *stored = Some(*settings);
        Ok(())
    }
}

impl SyncLogStore for MemorySyncLog {
    async fn save(&self, summary: &SyncSummary) -> Result<(), StoreError> {
        let mut runs = self.runs.lock().map_err(|e| StoreError::Query(e.to_string()))?;
        runs.push(summary.clone());
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<SyncSummary>, StoreError> {
        let runs = self.runs.lock().map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(runs.iter().rev().take(limit as usize).cloned().collect())
    }
}
