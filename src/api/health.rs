use actix_web::{HttpResponse, Responder, web};
use serde_json::json;
use tracing::warn;

use crate::store::mysql::MySqlStores;

/// Liveness plus a ping of the workflow database
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service and database reachable", body = Object, example = json!({
            "status": "ok"
        })),
        (status = 503, description = "Workflow database unreachable", body = Object, example = json!({
            "status": "unavailable"
        }))
    ),
    tag = "Health"
)]
pub async fn health(stores: web::Data<MySqlStores>) -> impl Responder {
    match sqlx::query("SELECT 1").execute(&stores.workflow).await {
        Ok(_) => HttpResponse::Ok().json(json!({ "status": "ok" })),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            HttpResponse::ServiceUnavailable().json(json!({ "status": "unavailable" }))
        }
    }
}
