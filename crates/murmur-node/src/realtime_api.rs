//! Real-time WebSocket API for live chat.
//!
//! - `/ws?sender=<name>` - Upgrades to a live connection for `sender`
//! - `/api/realtime/stats` - Statistics about live connections
//!
//! ## WebSocket Protocol
//!
//! ```json
//! // Send a chat message
//! {"type": "message", "content": "Hi"}
//! ```
//!
//! Every persisted message is delivered to all connected peers as
//! `{"type": "message", "id", "sender", "content", "created_at"}`.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{future, SinkExt, StreamExt};
use murmur_realtime::{serve_connection, ConnectionConfig, Frame, HubHandle, RealtimeError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{ApiError, AppState};
use crate::observability::METRICS;

/// Create the real-time API routes.
pub fn realtime_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/realtime/stats", get(get_stats))
}

/// Query parameters accepted by the upgrade endpoint.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub sender: Option<String>,
}

/// WebSocket upgrade handler.
///
/// The sender is checked before the upgrade so a missing name is a plain
/// 400 response rather than a failed handshake.
async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(sender) = params.sender.filter(|s| !s.is_empty()) else {
        return ApiError::BadRequest("sender query parameter is required".to_string())
            .into_response();
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let hub = state.hub.clone();
    let config = state.connection.clone();

    ws.max_message_size(config.max_frame_size)
        .max_frame_size(config.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, hub, sender, config))
}

/// Handle an upgraded WebSocket connection.
async fn handle_socket(
    socket: WebSocket,
    hub: HubHandle,
    sender: String,
    config: ConnectionConfig,
) {
    let (ws_sender, ws_receiver) = socket.split();

    let sink =
        ws_sender.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(to_message(frame))));
    let stream = ws_receiver.map(|result| result.map(to_frame));

    info!(sender = %sender, "WebSocket client connected");
    METRICS.websocket_connections.inc();

    match serve_connection(hub, sender.clone(), sink, stream, config).await {
        Ok(()) => {}
        Err(RealtimeError::HubClosed) => {
            warn!(sender = %sender, "Hub stopped while serving connection")
        }
        Err(e) => debug!(sender = %sender, error = %e, "Connection ended with error"),
    }

    METRICS.websocket_connections.dec();
    info!(sender = %sender, "WebSocket client disconnected");
}

fn to_frame(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(data) => Frame::Binary(data),
        Message::Ping(data) => Frame::Ping(data),
        Message::Pong(data) => Frame::Pong(data),
        Message::Close(_) => Frame::Close,
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data),
        Frame::Ping(data) => Message::Ping(data),
        Frame::Pong(data) => Message::Pong(data),
        Frame::Close => Message::Close(None),
    }
}

/// Statistics response.
#[derive(Debug, Serialize)]
struct StatsResponse {
    current_connections: usize,
    total_connections: u64,
    total_messages: u64,
    total_evictions: u64,
}

/// Get real-time connection statistics.
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.hub.stats();
    Json(StatsResponse {
        current_connections: stats.current_connections,
        total_connections: stats.total_connections,
        total_messages: stats.total_messages,
        total_evictions: stats.total_evictions,
    })
}
