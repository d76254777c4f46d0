pub mod alerts;
pub mod health;
pub mod live;
pub mod readings;
pub mod sensors;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::common::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthz,
        readings::create_reading,
        sensors::delete_sensor,
        alerts::list_greenhouse_alerts,
        alerts::resolve_alerts,
        live::greenhouse_data,
    ),
    components(
        schemas(
            health::HealthResponse,
            readings::CreateReadingRequest,
            readings::ReadingResponse,
            sensors::DeleteSensorResponse,
            alerts::AlertResponse,
            alerts::ResolveAlertsRequest,
            alerts::ResolveAlertsResponse,
            crate::alerts::Severity,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "readings", description = "Sensor reading ingestion"),
        (name = "sensors", description = "Sensor lifecycle"),
        (name = "alerts", description = "Threshold alerts"),
        (name = "live", description = "WebSocket live updates"),
    ),
    info(
        title = "GreenGrow API",
        description = "Greenhouse telemetry alerts and live updates",
        version = "0.1.0"
    )
)]
struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/sensors/{sensor_id}/readings",
            post(readings::create_reading),
        )
        .route("/sensors/{sensor_id}", delete(sensors::delete_sensor))
        .route(
            "/greenhouses/{greenhouse_id}/alerts",
            get(alerts::list_greenhouse_alerts),
        )
        .route("/alerts/resolve", post(alerts::resolve_alerts))
        .layer(RequestBodyLimitLayer::new(64 * 1024)) // 64KB body limit
        .layer(CompressionLayer::new());

    // WebSocket upgrades must not pass through compression
    let live_routes = Router::new().route(
        "/greenhouses/{greenhouse_id}/data",
        get(live::greenhouse_data),
    );

    let health_routes = Router::new().route("/healthz", get(health::healthz));

    // OpenAPI documentation
    let docs_routes = Router::new().merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    // Combine all routes
    Router::new()
        .nest("/api", api_routes)
        .merge(live_routes)
        .merge(health_routes)
        .merge(docs_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
