use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use actix_web::rt::time::timeout;
use chrono::{Local, NaiveDateTime};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::engine::change_detector::run_sync;
use crate::model::sync_log::{SyncSettings, SyncStatus, SyncSummary};
use crate::store::mysql::MySqlStores;
use crate::store::{ProfileCache, ProfileSource, SyncLogStore};

/// Longest accepted sync interval: one week.
pub const MAX_INTERVAL_MINUTES: u64 = 10_080;

/// Exponential backoff after a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            max: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// `base * 2^(attempt - 1)`, capped at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Shared between the HTTP handlers and the periodic task: the last run
/// summary, the schedule, retry bookkeeping and a flag that keeps two
/// reconciliations from overlapping.
pub struct SyncState {
    running: AtomicBool,
    last: RwLock<Option<SyncSummary>>,
    settings: RwLock<SyncSettings>,
    next_run_at: RwLock<Option<NaiveDateTime>>,
    retry_count: AtomicU32,
    retry: RetryPolicy,
    rescheduled: Notify,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new(SyncSettings::default(), RetryPolicy::default())
    }
}

/// Held for the duration of one run; clears the running flag on drop.
pub struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncState {
    pub fn new(settings: SyncSettings, retry: RetryPolicy) -> Self {
        Self {
            running: AtomicBool::new(false),
            last: RwLock::new(None),
            settings: RwLock::new(settings),
            next_run_at: RwLock::new(None),
            retry_count: AtomicU32::new(0),
            retry,
            rescheduled: Notify::new(),
        }
    }

    /// `None` while another run is in progress.
    pub fn try_begin(&self) -> Option<SyncGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| SyncGuard(&self.running))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last_run(&self) -> Option<SyncSummary> {
        self.last.read().ok().and_then(|last| last.clone())
    }

    /// Stores the summary and updates the retry streak.
    pub fn record(&self, summary: &SyncSummary) {
        if let Ok(mut last) = self.last.write() {
            *last = Some(summary.clone());
        }
        if summary.success {
            self.retry_count.store(0, Ordering::SeqCst);
        } else {
            self.retry_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn settings(&self) -> SyncSettings {
        self.settings.read().map(|s| *s).unwrap_or_default()
    }

    /// Applies new settings and wakes the scheduler so they take effect now.
    pub fn update_settings(&self, settings: SyncSettings) {
        if let Ok(mut current) = self.settings.write() {
            *current = settings;
        }
        info!(
            enabled = settings.enabled,
            interval_minutes = settings.interval_minutes,
            "Sync settings changed"
        );
        self.rescheduled.notify_one();
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    /// Wait before the next scheduled run; `None` while disabled.
    pub fn next_delay(&self) -> Option<Duration> {
        let settings = self.settings();
        if !settings.enabled {
            return None;
        }
        match self.retry_count() {
            0 => {
                let minutes = settings.interval_minutes.clamp(1, MAX_INTERVAL_MINUTES);
                Some(Duration::from_secs(minutes * 60))
            }
            attempt => Some(self.retry.delay(attempt)),
        }
    }

    fn set_next_run(&self, at: Option<NaiveDateTime>) {
        if let Ok(mut next) = self.next_run_at.write() {
            *next = at;
        }
    }

    pub fn status(&self) -> SyncStatus {
        let settings = self.settings();
        let retry_count = self.retry_count();
        SyncStatus {
            running: self.is_running(),
            enabled: settings.enabled,
            interval_minutes: settings.interval_minutes,
            next_run_at: self.next_run_at.read().ok().and_then(|next| *next),
            retrying: retry_count > 0,
            retry_count,
            last_run: self.last_run(),
        }
    }

    /// Runs one reconciliation unless one is already in flight.
    pub async fn run_guarded<P, C, L>(&self, source: &P, cache: &C, log: &L) -> Option<SyncSummary>
    where
        P: ProfileSource,
        C: ProfileCache,
        L: SyncLogStore,
    {
        let Some(_guard) = self.try_begin() else {
            warn!("Schedule sync already running, skipping");
            return None;
        };
        let now = Local::now().naive_local();
        let summary = run_sync(source, cache, log, now.date(), now).await;
        self.record(&summary);
        Some(summary)
    }

    /// Scheduled variant of [`run_guarded`](Self::run_guarded): skipped when
    /// the log already holds a successful run inside the interval, e.g. one
    /// made by another instance.
    pub async fn run_scheduled<P, C, L>(&self, source: &P, cache: &C, log: &L) -> Option<SyncSummary>
    where
        P: ProfileSource,
        C: ProfileCache,
        L: SyncLogStore,
    {
        let now = Local::now().naive_local();
        if synced_recently(log, now, self.settings().interval_minutes).await {
            return None;
        }
        self.run_guarded(source, cache, log).await
    }
}

/// True when the newest logged run succeeded less than `interval - 10s` ago.
/// Failed runs never count, so retries are not suppressed.
pub async fn synced_recently<L: SyncLogStore>(log: &L, now: NaiveDateTime, interval_minutes: u64) -> bool {
    let newest = match log.recent(1).await {
        Ok(runs) => runs.into_iter().next(),
        Err(e) => {
            warn!(error = %e, "Failed to check last sync run");
            return false;
        }
    };
    let Some(newest) = newest.filter(|run| run.success) else {
        return false;
    };

    let minutes = interval_minutes.clamp(1, MAX_INTERVAL_MINUTES) as i64;
    let window = chrono::Duration::minutes(minutes) - chrono::Duration::seconds(10);
    let elapsed = now - newest.timestamp;
    if elapsed < window {
        info!(
            elapsed_secs = elapsed.num_seconds(),
            interval_minutes, "Skipping sync, a recent run already succeeded"
        );
        return true;
    }
    false
}

/// Periodic reconciliation for serve mode. Waits one interval before the
/// first run, backs off after failures and reschedules whenever the
/// settings change.
pub async fn run_periodic(stores: MySqlStores, state: actix_web::web::Data<SyncState>) {
    info!("Periodic schedule sync started");
    loop {
        let Some(delay) = state.next_delay() else {
            state.set_next_run(None);
            info!("Periodic schedule sync disabled, waiting for new settings");
            state.rescheduled.notified().await;
            continue;
        };

        let now = Local::now().naive_local();
        state.set_next_run(chrono::Duration::from_std(delay).ok().map(|d| now + d));
        if timeout(delay, state.rescheduled.notified()).await.is_ok() {
            continue;
        }

        state
            .run_scheduled(&stores.profiles, &stores.profile_cache, &stores.sync_log)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schedule_profile::ScheduleProfileRecord;
    use crate::store::memory::{MemoryProfileCache, MemoryProfileSource, MemorySyncLog};

    fn run(success: bool, timestamp: NaiveDateTime) -> SyncSummary {
        let mut summary = SyncSummary::failed_run("r".into(), timestamp, "down".into());
        summary.success = success;
        summary
    }

    #[test]
    fn guard_is_single_flight() {
        let state = SyncState::default();
        let guard = state.try_begin();
        assert!(guard.is_some());
        assert!(state.try_begin().is_none());
        assert!(state.status().running);
        drop(guard);
        assert!(!state.is_running());
        assert!(state.try_begin().is_some());
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(30));
        assert_eq!(policy.delay(2), Duration::from_secs(60));
        assert_eq!(policy.delay(4), Duration::from_secs(240));
        assert_eq!(policy.delay(5), Duration::from_secs(300));
        assert_eq!(policy.delay(40), Duration::from_secs(300));
    }

    #[test]
    fn failures_switch_to_retry_delay() {
        let state = SyncState::default();
        let now = Local::now().naive_local();
        assert_eq!(state.next_delay(), Some(Duration::from_secs(300)));

        state.record(&run(false, now));
        state.record(&run(false, now));
        assert_eq!(state.next_delay(), Some(Duration::from_secs(60)));
        let status = state.status();
        assert!(status.retrying);
        assert_eq!(status.retry_count, 2);

        state.record(&run(true, now));
        assert_eq!(state.next_delay(), Some(Duration::from_secs(300)));
        assert!(!state.status().retrying);
    }

    #[actix_web::test]
    async fn new_settings_wake_the_scheduler() {
        let state = SyncState::default();
        state.update_settings(SyncSettings {
            enabled: false,
            interval_minutes: 15,
        });

        assert!(state.next_delay().is_none());
        assert_eq!(state.status().interval_minutes, 15);
        assert!(
            timeout(Duration::from_millis(100), state.rescheduled.notified())
                .await
                .is_ok()
        );
    }

    #[actix_web::test]
    async fn recent_success_elsewhere_skips_the_run() {
        let now = Local::now().naive_local();
        let log = MemorySyncLog::default().with_run(run(true, now - chrono::Duration::minutes(2)));
        assert!(synced_recently(&log, now, 5).await);
        assert!(!synced_recently(&log, now + chrono::Duration::minutes(4), 5).await);

        let failed = MemorySyncLog::default().with_run(run(false, now));
        assert!(!synced_recently(&failed, now, 5).await);
        assert!(!synced_recently(&MemorySyncLog::default(), now, 5).await);
    }

    #[actix_web::test]
    async fn scheduled_run_respects_the_log() {
        let state = SyncState::default();
        let source = MemoryProfileSource::new(vec![]);
        let cache = MemoryProfileCache::new(vec![]);
        let log = MemorySyncLog::default().with_run(run(true, Local::now().naive_local()));

        assert!(state.run_scheduled(&source, &cache, &log).await.is_none());
        assert_eq!(log.saved().len(), 1);
    }

    #[actix_web::test]
    async fn guarded_run_records_last_summary() {
        let state = SyncState::default();
        let source = MemoryProfileSource::new(vec![ScheduleProfileRecord {
            employee_id: "MTI1".into(),
            ..Default::default()
        }]);
        let cache = MemoryProfileCache::new(vec![]);
        let log = MemorySyncLog::default();

        let summary = state.run_guarded(&source, &cache, &log).await.unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(state.last_run().unwrap().run_id, summary.run_id);
        assert!(!state.is_running());
        assert_eq!(state.retry_count(), 0);
    }

    #[actix_web::test]
    async fn busy_state_refuses_second_run() {
        let state = SyncState::default();
        let _held = state.try_begin();
        let source = MemoryProfileSource::new(vec![]);
        let cache = MemoryProfileCache::new(vec![]);
        let log = MemorySyncLog::default();

        assert!(state.run_guarded(&source, &cache, &log).await.is_none());
        assert!(log.saved().is_empty());
    }
}
