use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use crate::error::StoreError;
use crate::model::attendance::{AttendanceRecord, PersistOutcome};
use crate::model::clock_event::ClassifiedEvent;
use crate::store::AttendanceStore;

/// Stores `event` unless its `(employee, timestamp, label)` key already
/// exists. With `replace_existing` the old row is swapped for the new one in
/// a single store operation, so a failed write keeps the old row.
///
/// The explicit existence check is an optimisation; the store's unique key
/// is what actually prevents double inserts, so a duplicate-key error on
/// insert is reported as `Skipped`.
pub async fn persist<A: AttendanceStore>(
    store: &A,
    event: &ClassifiedEvent,
    replace_existing: bool,
    now: NaiveDateTime,
) -> Result<PersistOutcome, StoreError> {
    let record = AttendanceRecord::from_classified(event, now);
    let key = record.key();

    let write = if store.exists(&key).await? {
        if !replace_existing {
            info!(
                employee_id = %key.employee_id,
                timestamp = %key.timestamp,
                label = %key.label,
                "Skipping insert: record already exists"
            );
            return Ok(PersistOutcome::Skipped);
        }
        store.replace(&record).await
    } else {
        store.insert(&record).await
    };

    match write {
        Ok(()) => {
            info!(
                employee_id = %key.employee_id,
                timestamp = %key.timestamp,
                replaced = replace_existing,
                "Stored attendance record"
            );
            Ok(PersistOutcome::Inserted)
        }
        Err(StoreError::Duplicate) => Ok(PersistOutcome::Skipped),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct PersistSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Persists every event; per-record failures are counted, an unreachable
/// store aborts.
#[instrument(name = "persist_batch", skip_all, fields(events = events.len(), replace_existing = replace_existing))]
pub async fn persist_batch<A: AttendanceStore>(
    store: &A,
    events: &[ClassifiedEvent],
    replace_existing: bool,
    now: NaiveDateTime,
) -> Result<PersistSummary, StoreError> {
    let mut summary = PersistSummary::default();

    for event in events {
        match persist(store, event, replace_existing, now).await {
            Ok(PersistOutcome::Inserted) => summary.inserted += 1,
            Ok(PersistOutcome::Skipped) => summary.skipped += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(
                    error = %e,
                    employee_id = %event.employee_id,
                    timestamp = %event.timestamp,
                    "Failed to persist attendance record"
                );
                summary.failed += 1;
            }
        }
    }

    info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        failed = summary.failed,
        "Attendance records persisted"
    );
    Ok(summary)
}
