use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use sha2::{Digest, Sha256};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::schedule_profile::{MIRRORED_COLUMNS, ScheduleProfileRecord};
use crate::model::shift::{TimeOfDay, parse_next_day};
use crate::model::sync_log::SyncSummary;
use crate::store::{ProfileCache, ProfileSource, SyncLogStore};

/// Maximum character lengths of the cache's text columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnLimits(HashMap<String, usize>);

impl ColumnLimits {
    pub fn new(limits: HashMap<String, usize>) -> Self {
        Self(limits)
    }

    pub fn limit(&self, column: &str) -> Option<usize> {
        self.0.get(column).copied().filter(|n| *n > 0)
    }
}

/// Canonical text of one field: null is empty, times are `HH:MM:SS`,
/// the next-day flag is `1`/`0`, everything else is trimmed text.
pub fn canonical(column: &str, value: Option<&str>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match column {
        "time_in" | "time_out" => match TimeOfDay::parse(value) {
            TimeOfDay::Parsed(t) => t.format("%H:%M:%S").to_string(),
            TimeOfDay::Invalid => value.trim().to_string(),
        },
        "next_day" => if parse_next_day(Some(value)) { "1" } else { "0" }.to_string(),
        _ => value.trim().to_string(),
    }
}

/// SHA-256 (hex) over the canonical mirrored fields joined with `|`.
pub fn fingerprint(record: &ScheduleProfileRecord) -> String {
    let payload = record
        .mirrored_fields()
        .iter()
        .map(|(column, value)| canonical(column, *value))
        .collect::<Vec<_>>()
        .join("|");
    hex::encode(Sha256::digest(payload.as_bytes()))
}

/// The record exactly as it will be written to the cache: times and the
/// next-day flag in canonical form (unparseable times become null) and text
/// cut to the column limits.
pub fn prepare_for_cache(record: &ScheduleProfileRecord, limits: &ColumnLimits) -> ScheduleProfileRecord {
    let mut prepared = record.clone();
    for column in MIRRORED_COLUMNS {
        let Some(slot) = prepared.field_mut(column) else {
            continue;
        };
        let Some(value) = slot.take() else {
            continue;
        };
        *slot = match column {
            "time_in" | "time_out" => match TimeOfDay::parse(&value) {
                TimeOfDay::Parsed(t) => Some(t.format("%H:%M:%S").to_string()),
                TimeOfDay::Invalid => {
                    warn!(employee_id = %record.employee_id, column, value, "Dropping unparseable shift time");
                    None
                }
            },
            "next_day" => Some(canonical(column, Some(&value))),
            _ => Some(match limits.limit(column) {
                Some(max) if value.chars().count() > max => value.chars().take(max).collect(),
                _ => value,
            }),
        };
    }
    prepared
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    Insert(ScheduleProfileRecord),
    Update(ScheduleProfileRecord),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub actions: Vec<ReconcileAction>,
    pub unchanged: u64,
    pub total: u64,
}

impl ReconcilePlan {
    pub fn inserts(&self) -> u64 {
        self.actions
            .iter()
            .filter(|a| matches!(a, ReconcileAction::Insert(_)))
            .count() as u64
    }

    pub fn updates(&self) -> u64 {
        self.actions.len() as u64 - self.inserts()
    }
}

/// Fingerprints of the cached rows, keyed by employee id.
pub fn cached_fingerprints(rows: &[ScheduleProfileRecord]) -> HashMap<String, String> {
    rows.iter()
        .map(|r| (r.employee_id.clone(), fingerprint(r)))
        .collect()
}

/// Decides insert / update / nothing for each source record.
///
/// Source records are fingerprinted after [`prepare_for_cache`], so a value
/// that only differs beyond the column limit does not cause a rewrite every
/// run. A repeated employee id is compared against the version planned
/// earlier in the same batch.
pub fn reconcile(
    source: &[ScheduleProfileRecord],
    cached: &HashMap<String, String>,
    limits: &ColumnLimits,
) -> ReconcilePlan {
    let mut known = cached.clone();
    let mut plan = ReconcilePlan {
        total: source.len() as u64,
        ..Default::default()
    };

    for record in source {
        let prepared = prepare_for_cache(record, limits);
        let new_hash = fingerprint(&prepared);
        match known.insert(prepared.employee_id.clone(), new_hash.clone()) {
            Some(old) if old == new_hash => plan.unchanged += 1,
            Some(_) => plan.actions.push(ReconcileAction::Update(prepared)),
            None => plan.actions.push(ReconcileAction::Insert(prepared)),
        }
    }
    plan
}

/// Writes a plan to the cache. Per-record failures are logged and counted;
/// an unreachable cache aborts.
pub async fn apply<C: ProfileCache>(
    cache: &C,
    plan: &ReconcilePlan,
    run_id: &str,
    timestamp: NaiveDateTime,
) -> Result<SyncSummary, StoreError> {
    let mut summary = SyncSummary {
        run_id: run_id.to_string(),
        timestamp,
        total: plan.total,
        updated: 0,
        inserted: 0,
        unchanged: plan.unchanged,
        failed: 0,
        success: true,
        error: None,
        details_updated: Vec::new(),
        details_inserted: Vec::new(),
    };

    for action in &plan.actions {
        let (record, result) = match action {
            ReconcileAction::Update(r) => (r, cache.update(r).await.map(|_| ())),
            ReconcileAction::Insert(r) => (r, cache.insert(r).await),
        };
        match result {
            Ok(()) => match action {
                ReconcileAction::Update(_) => {
                    summary.updated += 1;
                    summary.details_updated.push(record.change_summary());
                }
                ReconcileAction::Insert(_) => {
                    summary.inserted += 1;
                    summary.details_inserted.push(record.change_summary());
                }
            },
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(error = %e, employee_id = %record.employee_id, "Failed to write schedule profile");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Full reconciliation: read both sides, plan, apply, log the run.
#[instrument(name = "schedule_sync", skip_all, fields(%as_of))]
pub async fn run_sync<P, C, L>(
    source: &P,
    cache: &C,
    log: &L,
    as_of: NaiveDate,
    now: NaiveDateTime,
) -> SyncSummary
where
    P: ProfileSource,
    C: ProfileCache,
    L: SyncLogStore,
{
    let run_id = Uuid::new_v4().to_string();

    let summary = match sync_once(source, cache, &run_id, as_of, now).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, run_id, "Schedule sync failed");
            SyncSummary::failed_run(run_id, now, e.to_string())
        }
    };

    info!(
        run_id = %summary.run_id,
        total = summary.total,
        updated = summary.updated,
        inserted = summary.inserted,
        unchanged = summary.unchanged,
        failed = summary.failed,
        "Sync completed"
    );
    for item in &summary.details_updated {
        info!(change = "updated", "{item}");
    }
    for item in &summary.details_inserted {
        info!(change = "inserted", "{item}");
    }

    if let Err(e) = log.save(&summary).await {
        warn!(error = %e, run_id = %summary.run_id, "Failed to store sync log");
    }
    summary
}

async fn sync_once<P: ProfileSource, C: ProfileCache>(
    source: &P,
    cache: &C,
    run_id: &str,
    as_of: NaiveDate,
    now: NaiveDateTime,
) -> Result<SyncSummary, StoreError> {
    let source_rows = source.fetch_all(as_of).await?;
    let cached_rows = cache.fetch_all().await?;
    let limits = cache.column_limits().await?;

    let plan = reconcile(&source_rows, &cached_fingerprints(&cached_rows), &limits);
    apply(cache, &plan, run_id, now).await
}
