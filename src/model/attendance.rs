use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::clock_event::{ClassifiedEvent, ClockLabel};

/// Storage identity of an attendance record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttendanceKey {
    pub employee_id: String,
    pub timestamp: NaiveDateTime,
    pub label: ClockLabel,
}

/// Durable form of a [`ClassifiedEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub card_no: String,
    pub name: String,
    pub title: String,
    pub position: String,
    pub department: String,
    pub card_type: String,
    pub company: String,
    pub employee_id: String,
    pub timestamp: NaiveDateTime,
    pub tr_date: NaiveDate,
    pub status: String,
    pub controller: String,
    pub label: ClockLabel,
    pub unit_no: String,
    pub inserted_at: NaiveDateTime,
    pub processed: bool,
    pub scheduled_in: Option<NaiveTime>,
    pub scheduled_out: Option<NaiveTime>,
}

impl AttendanceRecord {
    /// Only Clock In / Clock Out start unprocessed; every other label is terminal.
    pub fn from_classified(event: &ClassifiedEvent, inserted_at: NaiveDateTime) -> Self {
        Self {
            card_no: event.holder.card_no.clone(),
            name: event.holder.name.clone(),
            title: event.holder.title.clone(),
            position: event.holder.position.clone(),
            department: event.holder.department.clone(),
            card_type: event.holder.card_type.clone(),
            company: event.holder.company.clone(),
            employee_id: event.employee_id.clone(),
            timestamp: event.timestamp,
            tr_date: event.timestamp.date(),
            status: event.status.clone(),
            controller: event.controller.clone(),
            label: event.label,
            unit_no: event.unit_no.clone(),
            inserted_at,
            processed: !event.label.is_attendance(),
            scheduled_in: event.window.as_ref().map(|w| w.start.time()),
            scheduled_out: event.window.as_ref().map(|w| w.end.time()),
        }
    }

    pub fn key(&self) -> AttendanceKey {
        AttendanceKey {
            employee_id: self.employee_id.clone(),
            timestamp: self.timestamp,
            label: self.label,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PersistOutcome {
    Inserted,
    Skipped,
}

/// Unprocessed Clock In / Clock Out awaiting propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingClocking {
    pub employee_id: String,
    pub timestamp: NaiveDateTime,
    pub label: ClockLabel,
    pub unit_no: String,
}

/// Row shape of the downstream clocking table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockingEntry {
    pub terminal_id: String,
    pub finger_print_id: String,
    pub date_log: NaiveDateTime,
    pub time_log: String,
    pub function_key: u8,
    pub date_time: NaiveDateTime,
    pub status_clock: &'static str,
    pub insert_date: NaiveDateTime,
}

impl ClockingEntry {
    pub fn from_pending(pending: &PendingClocking, now: NaiveDateTime) -> Option<Self> {
        let function_key = pending.label.function_key()?;
        Some(Self {
            terminal_id: pending.unit_no.clone(),
            finger_print_id: pending.employee_id.clone(),
            date_log: pending.timestamp.date().and_time(NaiveTime::MIN),
            time_log: pending.timestamp.format("%H:%M").to_string(),
            function_key,
            date_time: pending.timestamp,
            status_clock: "NEW",
            insert_date: now,
        })
    }
}
