use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use super::classifier::{Classifier, in_clock_out_span};
use super::resolver::{ManualShift, ScheduleResolver};
use crate::error::StoreError;
use crate::model::clock_event::{ClassifiedEvent, ClockLabel, Strategy};
use crate::model::scan_event::ScanEvent;
use crate::store::ScheduleStore;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub tolerance_seconds: i64,
    pub strategy: Strategy,
    pub manual: Option<ManualShift>,
    /// End of the fetched range; clock-outs are only declared missing once
    /// their whole span lies before it.
    pub batch_end: NaiveDateTime,
    pub synthesize_missing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct BatchStats {
    /// Scans retrieved.
    pub total: usize,
    /// Scans left after dropping `No Shift Data`.
    pub processed: usize,
    /// Clock In / Clock Out among the processed scans.
    pub valid: usize,
    pub invalid: usize,
    pub no_shift_data: usize,
    pub synthesized: usize,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub events: Vec<ClassifiedEvent>,
    pub stats: BatchStats,
}

/// Classifies one batch, drops `No Shift Data` and appends synthesized
/// Missing Clock Out events.
#[instrument(name = "process_batch", skip_all, fields(scans = events.len(), strategy = ?options.strategy))]
pub async fn process<S: ScheduleStore>(
    resolver: &ScheduleResolver<'_, S>,
    events: &[ScanEvent],
    options: &BatchOptions,
) -> Result<BatchOutcome, StoreError> {
    let classified = match options.strategy {
        Strategy::Bracket => bracket(events),
        Strategy::Windowed => {
            let classifier = Classifier::new(resolver, options.tolerance_seconds, options.manual);
            let mut out = Vec::with_capacity(events.len());
            for event in events {
                out.push(classifier.classify(event).await?);
            }
            out
        }
    };

    let mut stats = BatchStats {
        total: events.len(),
        ..Default::default()
    };

    let mut kept: Vec<ClassifiedEvent> = Vec::with_capacity(classified.len());
    for event in classified {
        if event.label == ClockLabel::NoShiftData {
            stats.no_shift_data += 1;
            continue;
        }
        kept.push(event);
    }
    stats.processed = kept.len();
    stats.valid = kept.iter().filter(|e| e.label.is_attendance()).count();
    stats.invalid = stats.processed - stats.valid;

    if options.synthesize_missing {
        let missing =
            synthesize_missing_clock_outs(resolver, &kept, options.batch_end, options.manual).await?;
        stats.synthesized = missing.len();
        kept.extend(missing);
    }

    info!(
        total = stats.total,
        processed = stats.processed,
        valid = stats.valid,
        invalid = stats.invalid,
        synthesized = stats.synthesized,
        "Batch classified"
    );

    Ok(BatchOutcome {
        events: kept,
        stats,
    })
}

/// First scan of each (employee, date) is Clock In, the last is Clock Out,
/// everything between is Mid Scan. A lone scan is Clock In only.
pub fn bracket(events: &[ScanEvent]) -> Vec<ClassifiedEvent> {
    let mut groups: BTreeMap<(&str, NaiveDate), Vec<&ScanEvent>> = BTreeMap::new();
    for event in events {
        groups
            .entry((event.employee_id.as_str(), event.date()))
            .or_default()
            .push(event);
    }

    let mut out = Vec::with_capacity(events.len());
    for (_, mut group) in groups {
        group.sort_by_key(|e| e.timestamp);
        let last = group.len() - 1;
        for (i, event) in group.into_iter().enumerate() {
            let label = match i {
                0 => ClockLabel::ClockIn,
                i if i == last => ClockLabel::ClockOut,
                _ => ClockLabel::MidScan,
            };
            out.push(ClassifiedEvent::from_scan(event, label, None));
        }
    }
    out
}

/// One Missing Clock Out per (employee, shift) whose Clock In has no Clock Out
/// inside `[end - 1h, end + 8h]`, once `batch_end` has passed that span.
pub async fn synthesize_missing_clock_outs<S: ScheduleStore>(
    resolver: &ScheduleResolver<'_, S>,
    classified: &[ClassifiedEvent],
    batch_end: NaiveDateTime,
    manual: Option<ManualShift>,
) -> Result<Vec<ClassifiedEvent>, StoreError> {
    let mut seen: HashSet<(&str, NaiveDateTime)> = HashSet::new();
    let mut out = Vec::new();

    for clock_in in classified.iter().filter(|e| e.label == ClockLabel::ClockIn) {
        let employee_id = clock_in.employee_id.as_str();
        let Some(window) = resolver
            .resolve(employee_id, clock_in.timestamp.date(), manual)
            .await?
        else {
            continue;
        };

        let (_, out_end) = window.clock_out_span();
        if batch_end < out_end {
            debug!(employee_id, %out_end, "Shift may still be open, not synthesizing");
            continue;
        }

        let has_clock_out = classified.iter().any(|e| {
            e.employee_id == clock_in.employee_id
                && e.label == ClockLabel::ClockOut
                && in_clock_out_span(e.timestamp, &window)
        });
        if has_clock_out || !seen.insert((employee_id, window.end)) {
            continue;
        }

        debug!(employee_id, shift_end = %window.end, "Missing clock out");
        out.push(ClassifiedEvent::missing_clock_out(clock_in, window));
    }

    Ok(out)
}
