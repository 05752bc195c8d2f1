//! HTTP API for the Murmur node.
//!
//! Implements the message REST endpoints and assembles the full router.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use murmur_realtime::{ConnectionConfig, Hub, HubConfig, HubHandle};
use murmur_storage::{Message, MessageStore, StorageError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use validator::Validate;

use crate::health::health_routes;
use crate::observability::{metrics_handler, metrics_middleware, request_id_middleware};
use crate::realtime_api::realtime_routes;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Message store shared by the REST handlers and the hub.
    pub store: Arc<dyn MessageStore>,
    /// Handle to the running connection hub.
    pub hub: HubHandle,
    /// Limits applied to every live connection.
    pub connection: ConnectionConfig,
}

impl AppState {
    /// Spawns a hub over `store` and builds the state around it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        store: Arc<dyn MessageStore>,
        hub: HubConfig,
        connection: ConnectionConfig,
    ) -> Self {
        let hub = Hub::spawn(store.clone(), hub);
        Self {
            store,
            hub,
            connection,
        }
    }
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("message not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => ApiError::NotFound(id),
            StorageError::Validation(reason) => ApiError::BadRequest(reason),
            other => ApiError::Storage(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Request to create a message.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateMessageRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "sender is required"))]
    pub sender: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "content is required"))]
    pub content: String,
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .route("/messages", get(list_messages).post(create_message))
        .route("/messages/{id}", get(get_message).delete(delete_message))
        .route("/metrics", get(metrics_handler))
        .merge(realtime_routes())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Lists all messages, oldest first.
async fn list_messages(State(state): State<AppState>) -> Result<Json<Vec<Message>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

/// Creates a new message.
async fn create_message(
    State(state): State<AppState>,
    payload: Result<Json<CreateMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let message = Message::new(req.sender, req.content)?;
    state.store.save(&message).await?;

    tracing::debug!(message_id = %message.id, sender = %message.sender, "Message created");

    Ok((StatusCode::CREATED, Json(message)))
}

/// Gets a message by id.
async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Message>, ApiError> {
    Ok(Json(state.store.get(&id).await?))
}

/// Deletes a message by id.
async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
