//! Route definitions for the SagaCrush gateway.
//!
//! Provides the chat endpoints, the session commands and a health check.

use crate::error::ChatError;
use crate::orchestrator::{ChatService, TurnRequest};
use crate::persona::DEFAULT_MODE;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use saga_common::GatewayConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

const SERVICE_NAME: &str = "saga-gateway";

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Chat request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiRequest {
    pub message: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_mode() -> String {
    DEFAULT_MODE.to_string()
}

/// Chat response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub reply: String,
    pub session_id: String,
}

/// Body for the clear/delete commands.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Session command response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub message: String,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Session store part of the health check.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreStatus {
    pub backend: String,
    pub healthy: bool,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub store: StoreStatus,
}

fn error_response(err: ChatError) -> (StatusCode, Json<ErrorResponse>) {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
}

/// Runs the turn on its own task. A request timeout drops this handler, not
/// the turn, so a reply that was already generated is still persisted.
async fn chat_handler(
    State(service): State<Arc<ChatService>>,
    Json(req): Json<ChatApiRequest>,
) -> ApiResult<ChatApiResponse> {
    let turn = tokio::spawn(async move {
        service
            .handle_turn(TurnRequest {
                message: req.message,
                mode: req.mode,
                session_id: req.session_id,
            })
            .await
    });

    let reply = turn
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Turn task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "turn aborted".into(),
                    code: "turn_aborted".into(),
                }),
            )
        })?
        .map_err(error_response)?;

    Ok(Json(ChatApiResponse {
        reply: reply.reply,
        session_id: reply.session_id,
    }))
}

async fn new_chat_handler(State(service): State<Arc<ChatService>>) -> ApiResult<SessionResponse> {
    let session_id = service.new_session().await.map_err(error_response)?;
    Ok(Json(SessionResponse {
        session_id,
        message: "New chat session created.".into(),
    }))
}

async fn clear_chat_handler(
    State(service): State<Arc<ChatService>>,
    Json(req): Json<SessionRequest>,
) -> ApiResult<SessionResponse> {
    let session_id = service
        .clear_session(req.session_id)
        .await
        .map_err(error_response)?;
    Ok(Json(SessionResponse {
        session_id,
        message: "Chat history cleared, facts preserved.".into(),
    }))
}

async fn delete_chat_handler(
    State(service): State<Arc<ChatService>>,
    Json(req): Json<SessionRequest>,
) -> ApiResult<SessionResponse> {
    let session_id = service
        .delete_session(req.session_id)
        .await
        .map_err(error_response)?;
    Ok(Json(SessionResponse {
        session_id,
        message: "Chat session deleted.".into(),
    }))
}

async fn health_handler(State(service): State<Arc<ChatService>>) -> Json<HealthResponse> {
    let store = service.health().await;
    Json(HealthResponse {
        status: if store.healthy { "healthy" } else { "degraded" }.into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: SERVICE_NAME.into(),
        store: StoreStatus {
            backend: store.backend,
            healthy: store.healthy,
        },
    })
}

/// Chat and session command routes.
pub fn chat_routes() -> Router<Arc<ChatService>> {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/new_chat", post(new_chat_handler))
        .route("/clear_chat", post(clear_chat_handler))
        .route("/delete_chat", post(delete_chat_handler))
}

/// Health check routes.
pub fn health_routes() -> Router<Arc<ChatService>> {
    Router::new().route("/health", get(health_handler))
}

/// CORS for the configured origins. Credentials are allowed, so methods and
/// headers mirror the request instead of using a wildcard.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Build the complete router with all routes and middleware.
pub fn build_routes(service: Arc<ChatService>, config: &GatewayConfig) -> Router {
    Router::new()
        .merge(chat_routes())
        .merge(health_routes())
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(cors_layer(&config.cors_origins))
        .with_state(service)
}
