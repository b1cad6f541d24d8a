use std::collections::HashMap;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use futures_util::StreamExt;
use sqlx::mysql::MySqlArguments;
use sqlx::query::Query;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::warn;

use super::{
    AttendanceReader, AttendanceStore, ClockingSink, LockInsert, ProfileCache, ProfileSource,
    ScanEventSource, ScanQuery, ScheduleStore, SyncLogStore, SyncSettingsStore,
};
use crate::config::Config;
use crate::db::Pools;
use crate::engine::change_detector::ColumnLimits;
use crate::error::StoreError;
use crate::model::attendance::{AttendanceKey, AttendanceRecord, ClockingEntry, PendingClocking};
use crate::model::attendance_report::{AttendanceReportRow, ReportFilter};
use crate::model::clock_event::ClockLabel;
use crate::model::scan_event::{ScanEvent, ScanEventRow};
use crate::model::schedule_profile::{ProfileShiftRow, ScheduleLockRow, ScheduleProfileRecord};
use crate::model::sync_log::{SyncSettings, SyncSummary};

const PROFILE_COLUMNS: &str = r#"
    CAST(employee_id AS CHAR) AS employee_id,
    employee_name, gender, division, department, section,
    supervisor_id, supervisor_name, position_title, grade_interval, phone,
    day_type, description,
    CAST(time_in AS CHAR) AS time_in,
    CAST(time_out AS CHAR) AS time_out,
    CAST(next_day AS CHAR) AS next_day
"#;

/// Schedule lock table plus the mirrored profile, both in the workflow database.
#[derive(Clone)]
pub struct MySqlScheduleStore {
    pool: MySqlPool,
}

impl MySqlScheduleStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl ScheduleStore for MySqlScheduleStore {
    async fn find_lock(
        &self,
        employee_id: &str,
        shift_date: NaiveDate,
    ) -> Result<Option<ScheduleLockRow>, StoreError> {
        let row = sqlx::query_as::<_, ScheduleLockRow>(
            r#"
            SELECT StaffNo AS employee_id,
                   ShiftDate AS shift_date,
                   CAST(ScheduledIn AS CHAR) AS scheduled_in,
                   CAST(ScheduledOut AS CHAR) AS scheduled_out,
                   CAST(NextDay AS CHAR) AS next_day
            FROM AttendanceScheduleLock
            WHERE StaffNo = ? AND ShiftDate = ?
            "#,
        )
        .bind(employee_id)
        .bind(shift_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_profile_shift(
        &self,
        employee_id: &str,
    ) -> Result<Option<ProfileShiftRow>, StoreError> {
        let row = sqlx::query_as::<_, ProfileShiftRow>(
            r#"
            SELECT CAST(time_in AS CHAR) AS time_in,
                   CAST(time_out AS CHAR) AS time_out,
                   CAST(next_day AS CHAR) AS next_day
            FROM MTIUsers
            WHERE employee_id = ?
            "#,
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_lock(&self, row: &ScheduleLockRow) -> Result<LockInsert, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT IGNORE INTO AttendanceScheduleLock
                (StaffNo, ShiftDate, ScheduledIn, ScheduledOut, NextDay)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.employee_id)
        .bind(row.shift_date)
        .bind(&row.scheduled_in)
        .bind(&row.scheduled_out)
        .bind(&row.next_day)
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 0 {
            LockInsert::AlreadyPresent
        } else {
            LockInsert::Inserted
        })
    }
}

/// Card directory joined onto the transaction log.
#[derive(Clone)]
pub struct MySqlScanSource {
    pool: MySqlPool,
    staff_prefix: String,
    valid_transaction: String,
    controllers: Vec<String>,
}

impl MySqlScanSource {
    pub fn new(pool: MySqlPool, config: &Config) -> Self {
        Self {
            pool,
            staff_prefix: config.staff_prefix.clone(),
            valid_transaction: config.valid_transaction.clone(),
            controllers: config.controller_list.clone(),
        }
    }
}

impl ScanEventSource for MySqlScanSource {
    async fn fetch(&self, query: &ScanQuery) -> Result<Vec<ScanEvent>, StoreError> {
        let mut qb: QueryBuilder<MySql> = QueryBuilder::new(
            r#"
            SELECT CAST(c.CardNo AS CHAR) AS card_no,
                   c.Name AS name,
                   c.Title AS title,
                   c.Position AS position,
                   c.Department AS department,
                   c.CardType AS card_type,
                   c.Company AS company,
                   c.StaffNo AS staff_no,
                   t.TrDateTime AS tr_date_time,
                   t.`Transaction` AS tr_transaction,
                   t.TrController AS tr_controller,
                   CAST(t.UnitNo AS CHAR) AS unit_no
            FROM CardDB c
            INNER JOIN tblTransaction t ON c.CardNo = t.CardNo
            WHERE t.TrDateTime BETWEEN "#,
        );
        qb.push_bind(query.start)
            .push(" AND ")
            .push_bind(query.end);

        match &query.staff_no {
            Some(staff_no) => qb.push(" AND c.StaffNo = ").push_bind(staff_no.clone()),
            None => qb
                .push(" AND c.StaffNo LIKE ")
                .push_bind(format!("{}%", self.staff_prefix)),
        };
        qb.push(" AND t.`Transaction` = ")
            .push_bind(self.valid_transaction.clone());

        if !self.controllers.is_empty() {
            qb.push(" AND t.TrController IN (");
            let mut list = qb.separated(", ");
            for controller in &self.controllers {
                list.push_bind(controller.clone());
            }
            list.push_unseparated(")");
        }
        qb.push(" ORDER BY c.StaffNo, t.TrDate, t.TrDateTime");

        let mut stream = qb.build_query_as::<ScanEventRow>().fetch(&self.pool);
        let mut events = Vec::new();
        while let Some(row) = stream.next().await {
            events.push(ScanEvent::from(row?));
        }
        Ok(events)
    }
}

/// The attendance report table.
#[derive(Clone)]
pub struct MySqlAttendanceStore {
    pool: MySqlPool,
    staff_prefix: String,
}

impl MySqlAttendanceStore {
    pub fn new(pool: MySqlPool, staff_prefix: &str) -> Self {
        Self {
            pool,
            staff_prefix: staff_prefix.to_string(),
        }
    }
}

fn insert_report_row(r: &AttendanceRecord) -> Query<'_, MySql, MySqlArguments> {
    sqlx::query(
        r#"
        INSERT INTO tblAttendanceReport (
            CardNo, Name, Title, Position, Department, CardType,
            Company, StaffNo, TrDateTime, TrDate,
            dtTransaction, TrController, ClockEvent, UnitNo, InsertedDate, Processed,
            ScheduledClockIn, ScheduledClockOut
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&r.card_no)
    .bind(&r.name)
    .bind(&r.title)
    .bind(&r.position)
    .bind(&r.department)
    .bind(&r.card_type)
    .bind(&r.company)
    .bind(&r.employee_id)
    .bind(r.timestamp)
    .bind(r.tr_date)
    .bind(&r.status)
    .bind(&r.controller)
    .bind(r.label.as_ref())
    .bind(&r.unit_no)
    .bind(r.inserted_at)
    .bind(r.processed)
    .bind(r.scheduled_in)
    .bind(r.scheduled_out)
}

fn delete_report_row(key: &AttendanceKey) -> Query<'_, MySql, MySqlArguments> {
    sqlx::query(
        r#"
        DELETE FROM tblAttendanceReport
        WHERE StaffNo = ? AND TrDateTime = ? AND ClockEvent = ?
        "#,
    )
    .bind(&key.employee_id)
    .bind(key.timestamp)
    .bind(key.label.as_ref())
}

impl AttendanceStore for MySqlAttendanceStore {
    async fn exists(&self, key: &AttendanceKey) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM tblAttendanceReport
            WHERE StaffNo = ? AND TrDateTime = ? AND ClockEvent = ?
            "#,
        )
        .bind(&key.employee_id)
        .bind(key.timestamp)
        .bind(key.label.as_ref())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn insert(&self, r: &AttendanceRecord) -> Result<(), StoreError> {
        insert_report_row(r).execute(&self.pool).await?;
        Ok(())
    }

    async fn replace(&self, r: &AttendanceRecord) -> Result<(), StoreError> {
        let key = r.key();
        // rolled back on drop unless committed
        let mut tx = self.pool.begin().await?;
        delete_report_row(&key).execute(&mut *tx).await?;
        insert_report_row(r).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn unprocessed(&self) -> Result<Vec<PendingClocking>, StoreError> {
        let rows = sqlx::query_as::<_, (String, NaiveDateTime, String, Option<String>)>(
            r#"
            SELECT StaffNo, TrDateTime, ClockEvent, CAST(UnitNo AS CHAR)
            FROM tblAttendanceReport
            WHERE Processed = 0
              AND StaffNo LIKE ?
              AND ClockEvent IN ('Clock In', 'Clock Out')
            ORDER BY TrDateTime, StaffNo
            "#,
        )
        .bind(format!("{}%", self.staff_prefix))
        .fetch_all(&self.pool)
        .await?;

        let mut pending = Vec::with_capacity(rows.len());
        for (employee_id, timestamp, label, unit_no) in rows {
            match ClockLabel::from_str(&label) {
                Ok(label) => pending.push(PendingClocking {
                    employee_id,
                    timestamp,
                    label,
                    unit_no: unit_no.unwrap_or_default(),
                }),
                Err(_) => warn!(employee_id, %timestamp, label, "Unknown clock event label"),
            }
        }
        Ok(pending)
    }

    async fn mark_processed(
        &self,
        employee_id: &str,
        timestamp: NaiveDateTime,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE tblAttendanceReport
            SET Processed = 1
            WHERE StaffNo = ? AND TrDateTime = ?
              AND ClockEvent IN ('Clock In', 'Clock Out')
            "#,
        )
        .bind(employee_id)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

impl AttendanceReader for MySqlAttendanceStore {
    async fn report_rows(&self, filter: &ReportFilter) -> Result<Vec<AttendanceReportRow>, StoreError> {
        let mut qb: QueryBuilder<MySql> = QueryBuilder::new(
            r#"
            SELECT StaffNo AS staff_no, Name AS name, Department AS department,
                   Position AS position, TrDate AS tr_date, TrDateTime AS tr_date_time,
                   ClockEvent AS clock_event, TrController AS controller,
                   ScheduledClockIn AS scheduled_in, ScheduledClockOut AS scheduled_out
            FROM tblAttendanceReport
            WHERE 1 = 1
            "#,
        );
        if let Some(from) = filter.from {
            qb.push(" AND TrDate >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND TrDate <= ").push_bind(to);
        }
        if let Some(employee_id) = &filter.employee_id {
            qb.push(" AND StaffNo = ").push_bind(employee_id);
        }
        if let Some(department) = &filter.department {
            qb.push(" AND Department = ").push_bind(department);
        }
        qb.push(" ORDER BY StaffNo, TrDateTime LIMIT ").push_bind(filter.limit);

        let rows = qb
            .build_query_as::<AttendanceReportRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

/// Downstream clocking table in the profile database.
#[derive(Clone)]
pub struct MySqlClockingSink {
    pool: MySqlPool,
}

impl MySqlClockingSink {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl ClockingSink for MySqlClockingSink {
    async fn forward(&self, e: &ClockingEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT IGNORE INTO mcg_clocking_tbl (
                terminal_id, finger_print_id, date_log, time_log, function_key,
                date_time, status_clock, insert_date
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&e.terminal_id)
        .bind(&e.finger_print_id)
        .bind(e.date_log)
        .bind(&e.time_log)
        .bind(e.function_key)
        .bind(e.date_time)
        .bind(e.status_clock)
        .bind(e.insert_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Source-of-truth employee table joined with its day-type schedule.
#[derive(Clone)]
pub struct MySqlProfileSource {
    pool: MySqlPool,
    site_code: String,
    employee_table: String,
    day_type_table: String,
}

impl MySqlProfileSource {
    /// Table names must already be validated identifiers.
    pub fn new(pool: MySqlPool, config: &Config) -> Self {
        Self {
            pool,
            site_code: config.site_code.clone(),
            employee_table: config.profile_employee_table.clone(),
            day_type_table: config.profile_day_type_table.clone(),
        }
    }
}

impl ProfileSource for MySqlProfileSource {
    async fn fetch_all(&self, as_of: NaiveDate) -> Result<Vec<ScheduleProfileRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT CAST(e.employee_id AS CHAR) AS employee_id,
                   e.employee_name, e.gender, e.division, e.department, e.section,
                   e.supervisor_id, e.supervisor_name, e.position_title, e.grade_interval,
                   e.phone,
                   dt.day_type, dt.description,
                   CAST(dt.time_in AS CHAR) AS time_in,
                   CAST(dt.time_out AS CHAR) AS time_out,
                   CAST(dt.next_day AS CHAR) AS next_day
            FROM `{}` e
            INNER JOIN `{}` dt
                ON dt.employee_id = e.employee_id
               AND dt.site_code = ?
               AND dt.shift_date = ?
            "#,
            self.employee_table, self.day_type_table
        );
        let rows = sqlx::query_as::<_, ScheduleProfileRecord>(&sql)
            .bind(&self.site_code)
            .bind(as_of)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

/// The mirrored profile table (`MTIUsers`) in the workflow database.
#[derive(Clone)]
pub struct MySqlProfileCache {
    pool: MySqlPool,
}

impl MySqlProfileCache {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl ProfileCache for MySqlProfileCache {
    async fn fetch_all(&self) -> Result<Vec<ScheduleProfileRecord>, StoreError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM MTIUsers ORDER BY employee_id");
        let rows = sqlx::query_as::<_, ScheduleProfileRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn column_limits(&self) -> Result<ColumnLimits, StoreError> {
        let rows = sqlx::query_as::<_, (String, Option<i64>)>(
            r#"
            SELECT CAST(COLUMN_NAME AS CHAR),
                   CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED)
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE()
              AND TABLE_NAME = 'MTIUsers'
              AND CHARACTER_MAXIMUM_LENGTH IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let limits: HashMap<String, usize> = rows
            .into_iter()
            .filter_map(|(column, len)| Some((column, usize::try_from(len?).ok()?)))
            .collect();
        Ok(ColumnLimits::new(limits))
    }

    async fn insert(&self, r: &ScheduleProfileRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO MTIUsers (
                employee_id, employee_name, gender, division, department, section,
                supervisor_id, supervisor_name, position_title, grade_interval, phone,
                day_type, description, time_in, time_out, next_day
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&r.employee_id)
        .bind(&r.employee_name)
        .bind(&r.gender)
        .bind(&r.division)
        .bind(&r.department)
        .bind(&r.section)
        .bind(&r.supervisor_id)
        .bind(&r.supervisor_name)
        .bind(&r.position_title)
        .bind(&r.grade_interval)
        .bind(&r.phone)
        .bind(&r.day_type)
        .bind(&r.description)
        .bind(&r.time_in)
        .bind(&r.time_out)
        .bind(&r.next_day)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, r: &ScheduleProfileRecord) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE MTIUsers SET
                employee_name = ?, gender = ?, division = ?, department = ?, section = ?,
                supervisor_id = ?, supervisor_name = ?, position_title = ?, grade_interval = ?,
                phone = ?, day_type = ?, description = ?, time_in = ?, time_out = ?, next_day = ?
            WHERE employee_id = ?
            "#,
        )
        .bind(&r.employee_name)
        .bind(&r.gender)
        .bind(&r.division)
        .bind(&r.department)
        .bind(&r.section)
        .bind(&r.supervisor_id)
        .bind(&r.supervisor_name)
        .bind(&r.position_title)
        .bind(&r.grade_interval)
        .bind(&r.phone)
        .bind(&r.day_type)
        .bind(&r.description)
        .bind(&r.time_in)
        .bind(&r.time_out)
        .bind(&r.next_day)
        .bind(&r.employee_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct SyncLogRow {
    run_id: String,
    timestamp: NaiveDateTime,
    total: i64,
    updated: i64,
    inserted: i64,
    unchanged: i64,
    failed: i64,
    success: bool,
    error: Option<String>,
    details_updated: Option<String>,
    details_inserted: Option<String>,
}

fn details(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or_default()
}

impl From<SyncLogRow> for SyncSummary {
    fn from(row: SyncLogRow) -> Self {
        Self {
            run_id: row.run_id,
            timestamp: row.timestamp,
            total: count(row.total),
            updated: count(row.updated),
            inserted: count(row.inserted),
            unchanged: count(row.unchanged),
            failed: count(row.failed),
            success: row.success,
            error: row.error,
            details_updated: details(row.details_updated),
            details_inserted: details(row.details_inserted),
        }
    }
}

#[derive(Clone)]
pub struct MySqlSyncLog {
    pool: MySqlPool,
}

impl MySqlSyncLog {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl SyncLogStore for MySqlSyncLog {
    async fn save(&self, s: &SyncSummary) -> Result<(), StoreError> {
        let updated = serde_json::to_string(&s.details_updated)
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let inserted = serde_json::to_string(&s.details_inserted)
            .map_err(|e| StoreError::Query(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO SyncLogs (
                run_id, timestamp, total, updated, inserted, unchanged, failed,
                success, error, details_updated, details_inserted
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&s.run_id)
        .bind(s.timestamp)
        .bind(s.total)
        .bind(s.updated)
        .bind(s.inserted)
        .bind(s.unchanged)
        .bind(s.failed)
        .bind(s.success)
        .bind(&s.error)
        .bind(updated)
        .bind(inserted)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<SyncSummary>, StoreError> {
        let rows = sqlx::query_as::<_, SyncLogRow>(
            r#"
            SELECT run_id, timestamp, total, updated, inserted, unchanged, failed,
                   success, error, details_updated, details_inserted
            FROM SyncLogs
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SyncSummary::from).collect())
    }
}

impl SyncSettingsStore for MySqlSyncLog {
    async fn load_settings(&self) -> Result<Option<SyncSettings>, StoreError> {
        let row = sqlx::query_as::<_, (bool, u64)>(
            "SELECT enabled, interval_minutes FROM SyncSettings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row
            .filter(|(_, minutes)| *minutes > 0)
            .map(|(enabled, interval_minutes)| SyncSettings {
                enabled,
                interval_minutes,
            }))
    }

    async fn save_settings(&self, settings: &SyncSettings) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO SyncSettings (id, enabled, interval_minutes, updated_at)
            VALUES (1, ?, ?, NOW())
            ON DUPLICATE KEY UPDATE
                enabled = VALUES(enabled),
                interval_minutes = VALUES(interval_minutes),
                updated_at = NOW()
            "#,
        )
        .bind(settings.enabled)
        .bind(settings.interval_minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Every store the service needs, wired to the right pool.
#[derive(Clone)]
pub struct MySqlStores {
    pub workflow: MySqlPool,
    pub schedules: MySqlScheduleStore,
    pub scans: MySqlScanSource,
    pub attendance: MySqlAttendanceStore,
    pub clocking: MySqlClockingSink,
    pub profiles: MySqlProfileSource,
    pub profile_cache: MySqlProfileCache,
    pub sync_log: MySqlSyncLog,
}

impl MySqlStores {
    pub fn new(pools: &Pools, config: &Config) -> Self {
        Self {
            workflow: pools.workflow.clone(),
            schedules: MySqlScheduleStore::new(pools.workflow.clone()),
            scans: MySqlScanSource::new(pools.transactions.clone(), config),
            attendance: MySqlAttendanceStore::new(pools.workflow.clone(), &config.staff_prefix),
            clocking: MySqlClockingSink::new(pools.profiles.clone()),
            profiles: MySqlProfileSource::new(pools.profiles.clone(), config),
            profile_cache: MySqlProfileCache::new(pools.workflow.clone()),
            sync_log: MySqlSyncLog::new(pools.workflow.clone()),
        }
    }
}
