use axum::{
    extract::{Path, State},
    Json,
};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait};
use serde::Serialize;
use utoipa::ToSchema;

use crate::common::AppState;
use crate::entity::{alerts, sensors};
use crate::error::{AppError, AppResult};
use crate::pipeline::DispatchError;
use crate::services::sensors as sensor_service;

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteSensorResponse {
    pub sensor_id: i64,
    /// Open alerts of the sensor that were resolved before deletion
    pub resolved_alerts: u64,
}

async fn set_active(db: &DatabaseConnection, sensor_id: i64, active: bool) -> AppResult<()> {
    sensors::Entity::update_many()
        .col_expr(sensors::Column::IsActive, Expr::value(active))
        .filter(sensors::Column::Id.eq(sensor_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Delete a sensor
///
/// The sensor stops taking readings first. Its open alerts are then resolved
/// after any of its readings still being evaluated, and the row is deleted
/// together with a final resolve in one transaction. If resolution fails the
/// sensor is kept and reactivated so the request can be retried.
#[utoipa::path(
    delete,
    path = "/api/sensors/{sensor_id}",
    params(
        ("sensor_id" = i64, Path, description = "Sensor ID"),
    ),
    responses(
        (status = 200, description = "Sensor deleted", body = DeleteSensorResponse),
        (status = 404, description = "Sensor not found"),
        (status = 503, description = "Alert resolution failed; sensor kept"),
    ),
    tag = "sensors"
)]
pub async fn delete_sensor(
    State(state): State<AppState>,
    Path(sensor_id): Path<i64>,
) -> AppResult<Json<DeleteSensorResponse>> {
    let sensor = sensors::Entity::find_by_id(sensor_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sensor '{sensor_id}' not found")))?;

    set_active(&state.db, sensor_id, false).await?;
    sensor_service::invalidate(&state.sensor_cache, sensor_id).await;

    let queued = match state.dispatcher.sensor_deleted(sensor_id).await {
        Ok(resolved) => resolved,
        Err(e) => {
            if sensor.is_active {
                if let Err(restore) = set_active(&state.db, sensor_id, true).await {
                    tracing::error!(error = %restore, sensor_id, "Failed to reactivate sensor");
                }
            }
            return Err(match e {
                DispatchError::Store(store) => AppError::Store(store),
                other => AppError::Dispatch(other),
            });
        }
    };

    // Catches alerts opened by readings that passed the activity check just
    // before deactivation. Alerts for the sensor after this commit fail on
    // the foreign key.
    let txn = state.db.begin().await?;
    let stragglers = alerts::Entity::update_many()
        .col_expr(alerts::Column::IsResolved, Expr::value(true))
        .filter(alerts::Column::SensorId.eq(sensor_id))
        .filter(alerts::Column::IsResolved.eq(false))
        .exec(&txn)
        .await?
        .rows_affected;
    sensors::Entity::delete_by_id(sensor_id).exec(&txn).await?;
    txn.commit().await?;

    sensor_service::invalidate(&state.sensor_cache, sensor_id).await;

    let resolved_alerts = queued + stragglers;
    tracing::info!(sensor_id, resolved_alerts, "Sensor deleted");

    Ok(Json(DeleteSensorResponse {
        sensor_id,
        resolved_alerts,
    }))
}
