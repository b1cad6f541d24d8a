use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Outcome of one schedule reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    #[schema(example = "0f5a3c5e-6a47-4d8e-9a56-2f1a3c6d9e01")]
    pub run_id: String,
    #[schema(example = "2025-03-10T06:00:00", format = "date-time", value_type = String)]
    pub timestamp: NaiveDateTime,
    pub total: u64,
    pub updated: u64,
    pub inserted: u64,
    pub unchanged: u64,
    pub failed: u64,
    pub success: bool,
    pub error: Option<String>,
    pub details_updated: Vec<String>,
    pub details_inserted: Vec<String>,
}

impl SyncSummary {
    pub fn failed_run(run_id: String, timestamp: NaiveDateTime, error: String) -> Self {
        Self {
            run_id,
            timestamp,
            total: 0,
            updated: 0,
            inserted: 0,
            unchanged: 0,
            failed: 0,
            success: false,
            error: Some(error),
            details_updated: Vec::new(),
            details_inserted: Vec::new(),
        }
    }
}

/// Periodic sync schedule, adjustable at runtime and kept in the workflow
/// database so it survives restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    pub enabled: bool,
    #[schema(example = 5, minimum = 1)]
    pub interval_minutes: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 5,
        }
    }
}

/// Scheduler state as reported by the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub running: bool,
    pub enabled: bool,
    pub interval_minutes: u64,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub next_run_at: Option<NaiveDateTime>,
    pub retrying: bool,
    pub retry_count: u32,
    pub last_run: Option<SyncSummary>,
}
