use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use marvin_slack::{ConnectionManager, ConnectionState, ConnectionSummary};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AdminState {
    connection: Arc<ConnectionManager>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connection_state: ConnectionState,
    pub connection: Option<ConnectionSummary>,
    pub checked_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReconnectResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn router(connection: Arc<ConnectionManager>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/reconnect", post(reconnect))
        .with_state(AdminState { connection })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    connection: Arc<ConnectionManager>,
) -> std::io::Result<JoinHandle<()>> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.admin.start",
        bind_address = %address,
        "admin endpoint started"
    );

    Ok(tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(connection)).await {
            error!(
                event_name = "system.admin.error",
                error = %error,
                "admin endpoint server terminated unexpectedly"
            );
        }
    }))
}

pub async fn health(State(state): State<AdminState>) -> (StatusCode, Json<HealthResponse>) {
    let connection_state = state.connection.state();
    let ready = connection_state == ConnectionState::Connected;

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        connection_state,
        connection: state.connection.connection(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

pub async fn reconnect(State(state): State<AdminState>) -> (StatusCode, Json<ReconnectResponse>) {
    match state.connection.trigger_reconnect().await {
        Ok(summary) => (
            StatusCode::OK,
            Json(ReconnectResponse { status: "connected", connection: Some(summary), error: None }),
        ),
        Err(error) => {
            warn!(
                event_name = "system.admin.reconnect_failed",
                error = %error,
                "manual reconnect failed"
            );
            (
                StatusCode::BAD_GATEWAY,
                Json(ReconnectResponse {
                    status: "failed",
                    connection: None,
                    error: Some(error.to_string()),
                }),
            )
        }
    }
}
