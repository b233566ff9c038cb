//! Inbound HTTP surface: GitHub webhook deliveries and sheet-edit triggers.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use issuesheet_core::{AppError, WebhookError};
use issuesheet_sync::{verify_signature, Dispatch, EventDispatcher, SheetEdit, WebhookPayload};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
const EVENT_HEADER: &str = "X-GitHub-Event";

/// Shared state. The dispatcher sits behind an async mutex so only one
/// invocation touches the sheet at a time.
pub struct ServerState {
    dispatcher: Mutex<EventDispatcher>,
    webhook_secret: Option<String>,
}

impl ServerState {
    pub fn new(dispatcher: EventDispatcher, webhook_secret: Option<String>) -> Self {
        Self {
            dispatcher: Mutex::new(dispatcher),
            webhook_secret,
        }
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/webhook", post(receive_webhook))
        .route("/sheet-edit", post(receive_sheet_edit))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve until Ctrl-C.
pub async fn serve(state: Arc<ServerState>, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening for webhooks on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
    hint: &'static str,
}

/// An invocation failure, mapped onto an HTTP status.
pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        ApiError(err.into())
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            AppError::Webhook(WebhookError::MalformedPayload(_)) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_PAYLOAD")
            }
            AppError::Webhook(_) => (StatusCode::UNAUTHORIZED, "BAD_SIGNATURE"),
            AppError::Tracker(_) => (StatusCode::BAD_GATEWAY, "TRACKER_ERROR"),
            AppError::Sheet(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SHEET_ERROR"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            AppError::Io(_) | AppError::Other(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        tracing::error!("Invocation failed ({}): {}", status, self.0);
        let body = ErrorResponse {
            error: self.0.to_string(),
            code,
            hint: self.0.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

async fn receive_webhook(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Dispatch>, ApiError> {
    if let Some(secret) = &state.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        verify_signature(secret, &body, signature)?;
    }

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if event == "ping" {
        return Ok(Json(Dispatch::Ignored {
            reason: "ping".to_string(),
        }));
    }

    let payload = WebhookPayload::from_slice(&body)?;
    let dispatcher = state.dispatcher.lock().await;
    Ok(Json(dispatcher.on_webhook(&payload).await?))
}

async fn receive_sheet_edit(
    State(state): State<Arc<ServerState>>,
    Json(edit): Json<SheetEdit>,
) -> Result<Json<Dispatch>, ApiError> {
    let dispatcher = state.dispatcher.lock().await;
    Ok(Json(dispatcher.on_sheet_edit(&edit).await?))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "issuesheet",
    })
}
