use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::error::StoreError;
use crate::model::attendance::ClockingEntry;
use crate::store::{AttendanceStore, ClockingSink};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct PropagationSummary {
    pub pending: usize,
    pub forwarded: usize,
    pub failed: usize,
}

/// Forwards every unprocessed Clock In / Clock Out and marks it processed.
///
/// A record whose forward or mark fails stays unprocessed and is picked up
/// again by the next run.
#[instrument(name = "propagate", skip_all)]
pub async fn propagate<A: AttendanceStore, K: ClockingSink>(
    store: &A,
    sink: &K,
    now: NaiveDateTime,
) -> Result<PropagationSummary, StoreError> {
    let pending = store.unprocessed().await?;
    let mut summary = PropagationSummary {
        pending: pending.len(),
        ..Default::default()
    };

    if pending.is_empty() {
        info!("No unprocessed clock events");
        return Ok(summary);
    }

    for item in &pending {
        let Some(entry) = ClockingEntry::from_pending(item, now) else {
            continue;
        };

        let result = match sink.forward(&entry).await {
            Ok(()) => store
                .mark_processed(&item.employee_id, item.timestamp)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => summary.forwarded += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(
                    error = %e,
                    employee_id = %item.employee_id,
                    timestamp = %item.timestamp,
                    "Clock event not forwarded, will retry next run"
                );
                summary.failed += 1;
            }
        }
    }

    info!(
        forwarded = summary.forwarded,
        failed = summary.failed,
        "Clock events forwarded"
    );
    Ok(summary)
}
