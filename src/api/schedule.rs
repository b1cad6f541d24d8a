use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use crate::model::schedule_profile::{ScheduleCombo, SchedulingEmployee, schedule_combos};
use crate::model::sync_log::{SyncSettings, SyncStatus, SyncSummary};
use crate::store::mysql::MySqlStores;
use crate::store::{ProfileCache, SyncLogStore, SyncSettingsStore};
use crate::utils::sync_state::{MAX_INTERVAL_MINUTES, SyncState};

const DEFAULT_LOG_LIMIT: u32 = 20;
const MAX_LOG_LIMIT: u32 = 200;

#[derive(Debug, Deserialize, IntoParams)]
pub struct SyncLogQuery {
    /// Number of runs to return (1-200, default 20).
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmployeeQuery {
    /// Only employees whose schedule description matches.
    #[param(example = "Day Shift")]
    pub day_type: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct SchedulingEmployeeList {
    pub data: Vec<SchedulingEmployee>,
}

#[derive(Serialize, ToSchema)]
pub struct ScheduleComboList {
    pub data: Vec<ScheduleCombo>,
}

fn check_settings(settings: &SyncSettings) -> Result<(), String> {
    if settings.interval_minutes == 0 {
        return Err("intervalMinutes must be a positive number".into());
    }
    if settings.interval_minutes > MAX_INTERVAL_MINUTES {
        return Err(format!("intervalMinutes must be at most {MAX_INTERVAL_MINUTES}"));
    }
    Ok(())
}

/// Reconcile the schedule cache now
#[utoipa::path(
    post,
    path = "/api/v1/schedule/sync",
    responses(
        (status = 200, description = "Sync finished", body = SyncSummary),
        (status = 409, description = "A sync is already running", body = Object, example = json!({
            "message": "Sync already running"
        })),
        (status = 429, description = "Too many requests")
    ),
    tag = "Schedule"
)]
pub async fn sync_now(
    stores: web::Data<MySqlStores>,
    state: web::Data<SyncState>,
) -> actix_web::Result<impl Responder> {
    match state
        .run_guarded(&stores.profiles, &stores.profile_cache, &stores.sync_log)
        .await
    {
        Some(summary) => Ok(HttpResponse::Ok().json(summary)),
        None => Ok(HttpResponse::Conflict().json(json!({
            "message": "Sync already running"
        }))),
    }
}

/// Last sync run handled by this process
#[utoipa::path(
    get,
    path = "/api/v1/schedule/sync/last",
    responses(
        (status = 200, description = "Last run summary", body = SyncSummary),
        (status = 404, description = "No run yet", body = Object, example = json!({
            "message": "No sync has run yet"
        }))
    ),
    tag = "Schedule"
)]
pub async fn last_sync(state: web::Data<SyncState>) -> actix_web::Result<impl Responder> {
    match state.last_run() {
        Some(summary) => Ok(HttpResponse::Ok().json(summary)),
        None => Ok(HttpResponse::NotFound().json(json!({
            "message": "No sync has run yet"
        }))),
    }
}

/// Recent sync runs, newest first
#[utoipa::path(
    get,
    path = "/api/v1/schedule/sync/logs",
    params(SyncLogQuery),
    responses(
        (status = 200, description = "Stored run logs", body = [SyncSummary]),
        (status = 500, description = "Internal server error")
    ),
    tag = "Schedule"
)]
pub async fn sync_logs(
    stores: web::Data<MySqlStores>,
    query: web::Query<SyncLogQuery>,
) -> actix_web::Result<impl Responder> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);

    let logs = stores.sync_log.recent(limit).await.map_err(|e| {
        error!(error = %e, "Failed to load sync logs");
        ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Ok().json(json!({ "data": logs })))
}

/// Cached schedule profiles
#[utoipa::path(
    get,
    path = "/api/v1/schedule/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Cached profiles", body = SchedulingEmployeeList),
        (status = 500, description = "Internal server error")
    ),
    tag = "Schedule"
)]
pub async fn list_employees(
    stores: web::Data<MySqlStores>,
    query: web::Query<EmployeeQuery>,
) -> actix_web::Result<impl Responder> {
    let rows = stores.profile_cache.fetch_all().await.map_err(|e| {
        error!(error = %e, "Failed to load schedule profiles");
        ErrorInternalServerError("Internal Server Error")
    })?;

    let day_type = query.day_type.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let data = rows
        .into_iter()
        .filter(|r| day_type.is_none_or(|d| r.description.as_deref() == Some(d)))
        .map(SchedulingEmployee::from)
        .collect();

    Ok(HttpResponse::Ok().json(SchedulingEmployeeList { data }))
}

/// Scheduler state of this process
#[utoipa::path(
    get,
    path = "/api/v1/schedule/sync/status",
    responses(
        (status = 200, description = "Current schedule and retry state", body = SyncStatus)
    ),
    tag = "Schedule"
)]
pub async fn sync_status(state: web::Data<SyncState>) -> actix_web::Result<impl Responder> {
    Ok(HttpResponse::Ok().json(state.status()))
}

/// Change the periodic sync schedule
#[utoipa::path(
    put,
    path = "/api/v1/schedule/sync/config",
    request_body = SyncSettings,
    responses(
        (status = 200, description = "Settings saved and applied", body = SyncStatus),
        (status = 400, description = "Invalid interval", body = Object, example = json!({
            "message": "intervalMinutes must be a positive number"
        })),
        (status = 429, description = "Too many requests"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Schedule"
)]
pub async fn update_sync_config(
    stores: web::Data<MySqlStores>,
    state: web::Data<SyncState>,
    body: web::Json<SyncSettings>,
) -> actix_web::Result<impl Responder> {
    let settings = body.into_inner();
    if let Err(message) = check_settings(&settings) {
        return Ok(HttpResponse::BadRequest().json(json!({ "message": message })));
    }

    stores.sync_log.save_settings(&settings).await.map_err(|e| {
        error!(error = %e, "Failed to save sync settings");
        ErrorInternalServerError("Internal Server Error")
    })?;
    state.update_settings(settings);

    Ok(HttpResponse::Ok().json(state.status()))
}

async fn load_combos<C: ProfileCache>(cache: &C) -> actix_web::Result<ScheduleComboList> {
    let rows = cache.fetch_all().await.map_err(|e| {
        error!(error = %e, "Failed to load schedule profiles");
        ErrorInternalServerError("Internal Server Error")
    })?;
    Ok(ScheduleComboList {
        data: schedule_combos(rows),
    })
}

/// Distinct shift patterns in the cache, with head counts
#[utoipa::path(
    get,
    path = "/api/v1/schedule/combos",
    responses(
        (status = 200, description = "Shift patterns", body = ScheduleComboList),
        (status = 500, description = "Internal server error")
    ),
    tag = "Schedule"
)]
pub async fn list_combos(stores: web::Data<MySqlStores>) -> actix_web::Result<impl Responder> {
    let combos = load_combos(&stores.profile_cache).await?;
    Ok(HttpResponse::Ok().json(combos))
}
