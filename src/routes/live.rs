use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::live::{GroupKey, Subscription, SubscriptionRegistry};

/// Subscribe to live sensor updates of a greenhouse
///
/// Upgrades to a WebSocket that receives one `sensor_data_update` JSON
/// message per reading recorded for the greenhouse.
#[utoipa::path(
    get,
    path = "/greenhouses/{greenhouse_id}/data",
    params(
        ("greenhouse_id" = String, Path, description = "Greenhouse ID (positive integer)"),
    ),
    responses(
        (status = 101, description = "Switching to the WebSocket protocol"),
        (status = 400, description = "Invalid greenhouse id"),
    ),
    tag = "live"
)]
pub async fn greenhouse_data(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(greenhouse_id): Path<String>,
) -> AppResult<Response> {
    let group = GroupKey::parse(&greenhouse_id).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let registry = state.registry.clone();
    let heartbeat = Duration::from_secs(state.config.ws_heartbeat_seconds.max(1));

    Ok(ws.on_upgrade(move |socket| serve_subscriber(socket, registry, group, heartbeat)))
}

async fn serve_subscriber(
    socket: WebSocket,
    registry: Arc<SubscriptionRegistry>,
    group: GroupKey,
    heartbeat: Duration,
) {
    let Subscription {
        id, mut receiver, ..
    } = registry.connect(group).await;

    let (mut sink, mut stream) = socket.split();
    let mut ticker = tokio::time::interval(heartbeat);
    // First tick completes immediately
    ticker.tick().await;

    let mut close_code = None;

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(
                        connection_id = %id,
                        group = %group,
                        text = %text.as_str(),
                        "Ignoring inbound client message"
                    );
                }
                Some(Ok(Message::Close(frame))) => {
                    close_code = frame.map(|f| f.code);
                    break;
                }
                // Pings are answered by the WebSocket layer
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %id, error = %e, "WebSocket receive error");
                    break;
                }
                None => break,
            },

            outbound = receiver.recv() => match outbound {
                Some(payload) => {
                    if let Err(e) = sink.send(Message::Text(payload.to_string().into())).await {
                        tracing::warn!(connection_id = %id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                // Removed from the registry
                None => break,
            },

            _ = ticker.tick() => {
                if let Err(e) = sink.send(Message::Ping(Bytes::new())).await {
                    tracing::debug!(connection_id = %id, error = %e, "Heartbeat failed");
                    break;
                }
            }
        }
    }

    registry.disconnect(id, close_code).await;
}
