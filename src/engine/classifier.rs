use chrono::{NaiveDateTime, Timelike};

use super::resolver::{ManualShift, ScheduleResolver};
use crate::error::StoreError;
use crate::model::clock_event::{ClassifiedEvent, ClockLabel};
use crate::model::scan_event::ScanEvent;
use crate::model::shift::ShiftWindow;
use crate::store::ScheduleStore;

fn before_noon(ts: NaiveDateTime) -> bool {
    ts.hour() < 12
}

fn within(ts: NaiveDateTime, (lo, hi): (NaiveDateTime, NaiveDateTime)) -> bool {
    lo <= ts && ts <= hi
}

/// Labels a scan against its own day's window and, for morning scans, the
/// previous day's window. First matching rule wins:
///
/// 1. no window: `No Shift Data`
/// 2. `[start - tolerance, start + 1h]`: `Clock In`
/// 3. `[end - 1h, end + 8h]`: `Clock Out`
/// 4. before noon and inside the previous window's clock-out span: `Clock Out`
/// 5. otherwise `Outside Range`
pub fn label_for(
    ts: NaiveDateTime,
    window: Option<&ShiftWindow>,
    previous: Option<&ShiftWindow>,
    tolerance_seconds: i64,
) -> ClockLabel {
    let Some(window) = window else {
        return ClockLabel::NoShiftData;
    };
    if within(ts, window.clock_in_span(tolerance_seconds)) {
        return ClockLabel::ClockIn;
    }
    if within(ts, window.clock_out_span()) {
        return ClockLabel::ClockOut;
    }
    if before_noon(ts) {
        if let Some(prev) = previous {
            if within(ts, prev.clock_out_span()) {
                return ClockLabel::ClockOut;
            }
        }
    }
    ClockLabel::OutsideRange
}

/// True when `ts` falls in the clock-out span of `window`.
pub fn in_clock_out_span(ts: NaiveDateTime, window: &ShiftWindow) -> bool {
    within(ts, window.clock_out_span())
}

/// Rule-based classifier bound to one batch's resolver.
pub struct Classifier<'r, 'a, S> {
    resolver: &'r ScheduleResolver<'a, S>,
    tolerance_seconds: i64,
    manual: Option<ManualShift>,
}

impl<'r, 'a, S: ScheduleStore> Classifier<'r, 'a, S> {
    pub fn new(
        resolver: &'r ScheduleResolver<'a, S>,
        tolerance_seconds: i64,
        manual: Option<ManualShift>,
    ) -> Self {
        Self {
            resolver,
            tolerance_seconds,
            manual,
        }
    }

    /// The previous day's window is only resolved when rules 1-3 miss on a
    /// morning scan.
    pub async fn classify(&self, event: &ScanEvent) -> Result<ClassifiedEvent, StoreError> {
        let window = self
            .resolver
            .resolve(&event.employee_id, event.date(), self.manual)
            .await?;

        let label = label_for(event.timestamp, window.as_ref(), None, self.tolerance_seconds);
        if label != ClockLabel::OutsideRange || !before_noon(event.timestamp) {
            return Ok(ClassifiedEvent::from_scan(event, label, window));
        }

        let previous = match event.date().pred_opt() {
            Some(prev_date) => {
                self.resolver
                    .resolve(&event.employee_id, prev_date, self.manual)
                    .await?
            }
            None => None,
        };
        let label = label_for(
            event.timestamp,
            window.as_ref(),
            previous.as_ref(),
            self.tolerance_seconds,
        );
        let used = if label == ClockLabel::ClockOut { previous } else { window };
        Ok(ClassifiedEvent::from_scan(event, label, used))
    }
}
