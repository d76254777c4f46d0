use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::common::AppState;
use crate::error::{AppError, AppResult};

use super::types::{AlertResponse, AlertsQuery, ResolveAlertsRequest, ResolveAlertsResponse};

/// Upper bound on ids accepted by one bulk resolve request
const MAX_RESOLVE_IDS: usize = 1000;

/// List alerts of a greenhouse, newest first
#[utoipa::path(
    get,
    path = "/api/greenhouses/{greenhouse_id}/alerts",
    params(
        ("greenhouse_id" = i64, Path, description = "Greenhouse ID"),
        AlertsQuery,
    ),
    responses(
        (status = 200, description = "Alerts retrieved successfully", body = Vec<AlertResponse>),
    ),
    tag = "alerts"
)]
pub async fn list_greenhouse_alerts(
    State(state): State<AppState>,
    Path(greenhouse_id): Path<i64>,
    Query(query): Query<AlertsQuery>,
) -> AppResult<Json<Vec<AlertResponse>>> {
    let alerts = state
        .alert_store
        .list_for_greenhouse(greenhouse_id, query.resolved)
        .await?;

    Ok(Json(alerts.into_iter().map(AlertResponse::from).collect()))
}

/// Mark alerts as resolved
///
/// Idempotent: alerts that are already resolved or unknown are skipped and
/// not counted.
#[utoipa::path(
    post,
    path = "/api/alerts/resolve",
    request_body = ResolveAlertsRequest,
    responses(
        (status = 200, description = "Alerts resolved", body = ResolveAlertsResponse),
        (status = 400, description = "Too many ids"),
    ),
    tag = "alerts"
)]
pub async fn resolve_alerts(
    State(state): State<AppState>,
    Json(body): Json<ResolveAlertsRequest>,
) -> AppResult<Json<ResolveAlertsResponse>> {
    if body.ids.len() > MAX_RESOLVE_IDS {
        return Err(AppError::BadRequest(format!(
            "At most {MAX_RESOLVE_IDS} alert ids per request"
        )));
    }

    let resolved = state.alert_store.resolve_by_ids(&body.ids).await?;
    tracing::info!(requested = body.ids.len(), resolved, "Bulk alert resolve");

    Ok(Json(ResolveAlertsResponse { resolved }))
}
