use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DbErr, Set, SqlErr};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::common::AppState;
use crate::entity::sensor_data;
use crate::error::{AppError, AppResult};
use crate::reading::Reading;
use crate::services::sensors;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReadingRequest {
    /// Raw sensor value
    pub value: f64,
    /// Observation time; defaults to the time of ingestion
    pub timestamp: Option<DateTime<Utc>>,
    /// Optional calibration notes
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadingResponse {
    pub id: i64,
    pub sensor_id: i64,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub notes: String,
}

/// Record a sensor reading
///
/// The reading is stored first. Alert evaluation and the live update to
/// subscribers run asynchronously afterwards and cannot fail this request.
#[utoipa::path(
    post,
    path = "/api/sensors/{sensor_id}/readings",
    params(
        ("sensor_id" = i64, Path, description = "Sensor ID"),
    ),
    request_body = CreateReadingRequest,
    responses(
        (status = 201, description = "Reading stored", body = ReadingResponse),
        (status = 404, description = "Sensor not found"),
        (status = 409, description = "Sensor is inactive"),
    ),
    tag = "readings"
)]
pub async fn create_reading(
    State(state): State<AppState>,
    Path(sensor_id): Path<i64>,
    Json(body): Json<CreateReadingRequest>,
) -> AppResult<(StatusCode, Json<ReadingResponse>)> {
    let sensor = sensors::lookup(&state.db, &state.sensor_cache, sensor_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sensor '{sensor_id}' not found")))?;

    if !sensor.is_active {
        return Err(AppError::Conflict(format!(
            "Sensor '{sensor_id}' is inactive"
        )));
    }

    let observed_at = body.timestamp.unwrap_or_else(Utc::now);

    let row = sensor_data::ActiveModel {
        sensor_id: Set(sensor_id),
        value: Set(body.value),
        timestamp: Set(observed_at.into()),
        notes: Set(body.notes),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| insert_error(e, sensor_id))?;

    let timestamp = row.timestamp.with_timezone(&Utc);

    let reading = Reading {
        sensor_id,
        sensor_kind: sensor.kind,
        sensor_name: sensor.name,
        greenhouse_id: sensor.greenhouse_id,
        value: row.value,
        observed_at: timestamp,
    };

    // The row is committed and submission publishes the live update before
    // queueing; a saturated pipeline only costs the alert check.
    if let Err(e) = state.dispatcher.submit_reading(reading).await {
        tracing::warn!(error = %e, sensor_id, reading_id = row.id, "Alert evaluation not queued");
    }

    Ok((
        StatusCode::CREATED,
        Json(ReadingResponse {
            id: row.id,
            sensor_id,
            value: row.value,
            timestamp,
            notes: row.notes,
        }),
    ))
}

/// A sensor deleted after the lookup surfaces as a foreign-key violation.
fn insert_error(err: DbErr, sensor_id: i64) -> AppError {
    match err.sql_err() {
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
            AppError::NotFound(format!("Sensor '{sensor_id}' not found"))
        }
        _ => err.into(),
    }
}
