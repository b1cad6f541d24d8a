use chrono::{NaiveDate, NaiveTime};
use moka::future::Cache;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::model::schedule_profile::ScheduleLockRow;
use crate::model::shift::{ScheduleSource, ShiftWindow, TimeOfDay, parse_next_day};
use crate::store::{LockInsert, ScheduleStore};

/// Shift times supplied by the operator, bypassing every store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualShift {
    pub time_in: NaiveTime,
    pub time_out: NaiveTime,
}

impl ManualShift {
    /// Only a complete pair counts as an override.
    pub fn from_parts(time_in: Option<NaiveTime>, time_out: Option<NaiveTime>) -> Option<Self> {
        match (time_in, time_out) {
            (Some(time_in), Some(time_out)) => Some(Self { time_in, time_out }),
            _ => None,
        }
    }
}

/// Resolves `(employee, date)` to a [`ShiftWindow`].
///
/// Precedence: manual override, then the per-date lock row, then the
/// mirrored profile (which is locked for that date as a side effect).
/// Results are memoised for the lifetime of the resolver, i.e. one batch.
pub struct ScheduleResolver<'a, S> {
    store: &'a S,
    windows: Cache<(String, NaiveDate), Option<ShiftWindow>>,
}

impl<'a, S: ScheduleStore> ScheduleResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            windows: Cache::builder().max_capacity(50_000).build(),
        }
    }

    pub async fn resolve(
        &self,
        employee_id: &str,
        shift_date: NaiveDate,
        manual: Option<ManualShift>,
    ) -> Result<Option<ShiftWindow>, StoreError> {
        if let Some(m) = manual {
            return Ok(Some(ShiftWindow::resolve(
                employee_id,
                shift_date,
                m.time_in,
                m.time_out,
                false,
                ScheduleSource::ManualOverride,
            )));
        }

        let key = (employee_id.to_string(), shift_date);
        if let Some(hit) = self.windows.get(&key).await {
            return Ok(hit);
        }

        // A bad row for one employee must not sink the batch; only an
        // unreachable store does.
        let window = match self.lookup(employee_id, shift_date).await {
            Ok(window) => window,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, employee_id, %shift_date, "Schedule lookup failed, treating as no schedule");
                None
            }
        };
        self.windows.insert(key, window.clone()).await;
        Ok(window)
    }

    async fn lookup(
        &self,
        employee_id: &str,
        shift_date: NaiveDate,
    ) -> Result<Option<ShiftWindow>, StoreError> {
        if let Some(lock) = self.store.find_lock(employee_id, shift_date).await? {
            return Ok(window_from_columns(
                employee_id,
                shift_date,
                lock.scheduled_in.as_deref(),
                lock.scheduled_out.as_deref(),
                lock.next_day.as_deref(),
                ScheduleSource::Cached,
            ));
        }

        let Some(profile) = self.store.find_profile_shift(employee_id).await? else {
            debug!(employee_id, %shift_date, "No schedule profile");
            return Ok(None);
        };

        let time_in = TimeOfDay::from_column(profile.time_in.as_deref()).time();
        let time_out = TimeOfDay::from_column(profile.time_out.as_deref()).time();
        let (Some(time_in), Some(time_out)) = (time_in, time_out) else {
            warn!(
                employee_id,
                time_in = ?profile.time_in,
                time_out = ?profile.time_out,
                "Unusable profile shift times, treating as no schedule"
            );
            return Ok(None);
        };
        let next_day = parse_next_day(profile.next_day.as_deref());

        let lock = ScheduleLockRow {
            employee_id: employee_id.to_string(),
            shift_date,
            scheduled_in: Some(time_in.format("%H:%M:%S").to_string()),
            scheduled_out: Some(time_out.format("%H:%M:%S").to_string()),
            next_day: Some(if next_day { "1" } else { "0" }.to_string()),
        };
        match self.store.insert_lock(&lock).await {
            Ok(LockInsert::Inserted) => debug!(employee_id, %shift_date, "Schedule locked"),
            Ok(LockInsert::AlreadyPresent) => {
                debug!(employee_id, %shift_date, "Schedule already locked by another run")
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(error = %e, employee_id, %shift_date, "Failed to lock schedule"),
        }

        Ok(Some(ShiftWindow::resolve(
            employee_id,
            shift_date,
            time_in,
            time_out,
            next_day,
            ScheduleSource::Profile,
        )))
    }
}

fn window_from_columns(
    employee_id: &str,
    shift_date: NaiveDate,
    time_in: Option<&str>,
    time_out: Option<&str>,
    next_day: Option<&str>,
    source: ScheduleSource,
) -> Option<ShiftWindow> {
    if time_in.is_none() || time_out.is_none() {
        return None;
    }
    match (TimeOfDay::from_column(time_in), TimeOfDay::from_column(time_out)) {
        (TimeOfDay::Parsed(start), TimeOfDay::Parsed(end)) => Some(ShiftWindow::resolve(
            employee_id,
            shift_date,
            start,
            end,
            parse_next_day(next_day),
            source,
        )),
        _ => {
            warn!(employee_id, %shift_date, ?time_in, ?time_out, "Unparseable locked schedule");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryScheduleStore;
    use chrono::Duration;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[actix_web::test]
    async fn manual_override_never_touches_the_store() {
        let store = MemoryScheduleStore::default()
            .with_lock("E1", d(10), Some("09:00:00"), Some("18:00:00"), Some("0"))
            .with_profile("E1", Some("10:00"), Some("19:00"), Some("0"));
        let resolver = ScheduleResolver::new(&store);

        let manual = ManualShift::from_parts(Some(t(21, 0)), Some(t(5, 0)));
        let w = resolver.resolve("E1", d(10), manual).await.unwrap().unwrap();

        assert_eq!(w.source, ScheduleSource::ManualOverride);
        assert_eq!(w.start, d(10).and_time(t(21, 0)));
        assert_eq!(w.end, d(11).and_time(t(5, 0)));
        assert_eq!(store.reads(), 0);
    }

    #[test]
    fn half_override_is_ignored() {
        assert!(ManualShift::from_parts(Some(t(8, 0)), None).is_none());
    }

    #[actix_web::test]
    async fn lock_row_beats_profile() {
        let store = MemoryScheduleStore::default()
            .with_lock("E1", d(10), Some("09:00"), Some("18:00:00"), None)
            .with_profile("E1", Some("10:00"), Some("19:00"), Some("0"));
        let resolver = ScheduleResolver::new(&store);

        let w = resolver.resolve("E1", d(10), None).await.unwrap().unwrap();
        assert_eq!(w.source, ScheduleSource::Cached);
        assert_eq!(w.start, d(10).and_time(t(9, 0)));
        assert_eq!(store.profile_reads(), 0);
    }

    #[actix_web::test]
    async fn lock_row_next_day_flag_is_honoured() {
        let store = MemoryScheduleStore::default().with_lock(
            "E1",
            d(10),
            Some("20:00:00"),
            Some("23:00:00"),
            Some("1"),
        );
        let resolver = ScheduleResolver::new(&store);

        let w = resolver.resolve("E1", d(10), None).await.unwrap().unwrap();
        assert_eq!(w.end, d(11).and_time(t(23, 0)));
    }

    #[actix_web::test]
    async fn profile_is_locked_then_reused() {
        let store =
            MemoryScheduleStore::default().with_profile("E1", Some("22:00"), Some("06:00"), Some("Y"));

        let first = ScheduleResolver::new(&store)
            .resolve("E1", d(10), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.source, ScheduleSource::Profile);
        assert_eq!(first.end - first.start, Duration::hours(8));
        assert_eq!(store.lock_writes(), 1);

        let second = ScheduleResolver::new(&store)
            .resolve("E1", d(10), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.source, ScheduleSource::Cached);
        assert_eq!((second.start, second.end), (first.start, first.end));
        assert_eq!(store.lock_writes(), 1);
    }

    #[actix_web::test]
    async fn concurrent_lock_is_harmless() {
        let store = MemoryScheduleStore::default()
            .with_profile("E1", Some("08:00"), Some("17:00"), None)
            .with_lock_race();
        let resolver = ScheduleResolver::new(&store);

        let w = resolver.resolve("E1", d(10), None).await.unwrap();
        assert!(w.is_some());
    }

    #[actix_web::test]
    async fn repeated_lookups_hit_the_batch_cache() {
        let store =
            MemoryScheduleStore::default().with_lock("E1", d(10), Some("08:00"), Some("17:00"), None);
        let resolver = ScheduleResolver::new(&store);

        for _ in 0..3 {
            resolver.resolve("E1", d(10), None).await.unwrap();
        }
        resolver.resolve("E2", d(10), None).await.unwrap();
        resolver.resolve("E2", d(10), None).await.unwrap();
        assert_eq!(store.lock_reads(), 2);
    }

    #[actix_web::test]
    async fn missing_or_malformed_times_are_absent() {
        let store = MemoryScheduleStore::default()
            .with_lock("E1", d(10), Some("08:00"), None, None)
            .with_lock("E2", d(10), Some("eight"), Some("17:00"), None)
            .with_profile("E3", Some("n/a"), Some("17:00"), None);
        let resolver = ScheduleResolver::new(&store);

        assert!(resolver.resolve("E1", d(10), None).await.unwrap().is_none());
        assert!(resolver.resolve("E2", d(10), None).await.unwrap().is_none());
        assert!(resolver.resolve("E3", d(10), None).await.unwrap().is_none());
        assert!(resolver.resolve("E4", d(10), None).await.unwrap().is_none());
        assert_eq!(store.lock_writes(), 0);
    }

    #[actix_web::test]
    async fn unreachable_store_is_an_error() {
        let store = MemoryScheduleStore::default().unavailable();
        let resolver = ScheduleResolver::new(&store);

        let err = resolver.resolve("E1", d(10), None).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[actix_web::test]
    async fn undecodable_row_is_absent_not_fatal() {
        let store = MemoryScheduleStore::default()
            .with_profile("BAD", Some("08:00"), Some("17:00"), None)
            .broken_for("BAD");
        let resolver = ScheduleResolver::new(&store);

        assert!(resolver.resolve("BAD", d(10), None).await.unwrap().is_none());
        assert_eq!(store.lock_writes(), 0);
    }

    #[actix_web::test]
    async fn windows_always_end_after_start() {
        let cases = [("00:00", "00:00"), ("23:59", "00:01"), ("12:00", "11:59:59"), ("06:00", "14:00")];
        let mut store = MemoryScheduleStore::default();
        for (i, (a, b)) in cases.iter().enumerate() {
            store = store.with_profile(&format!("E{i}"), Some(a), Some(b), None);
        }
        let resolver = ScheduleResolver::new(&store);
        for i in 0..cases.len() {
            let w = resolver.resolve(&format!("E{i}"), d(10), None).await.unwrap().unwrap();
            assert!(w.end > w.start, "{:?}", cases[i]);
        }
    }
}
