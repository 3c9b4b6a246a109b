//! Router, handlers and server lifecycle

use crate::error::{HttpError, HttpResult};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{SERVICE_NAME, VERSION};
use strata_migrate::{CommandRequest, CommandResponse, Orchestrator};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, warn};

/// Path of the migration command endpoint
pub const MIGRATIONS_PATH: &str = "/internal/migrations";

pub const HEALTH_PATH: &str = "/health";

/// Upper bound for a single request; migration work itself runs in the background
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Build the service router
pub fn build_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = AppState { orchestrator };

    Router::new()
        .route(MIGRATIONS_PATH, post(migrations_handler))
        .route(HEALTH_PATH, get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}

async fn migrations_handler(
    State(state): State<AppState>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> HttpResult<(StatusCode, Json<CommandResponse>)> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(reason = %rejection.body_text(), "Rejected malformed migration request");
        HttpError::bad_request(format!("Invalid JSON: {}", rejection.body_text()))
    })?;

    let response = state.orchestrator.handle_command(&request).await?;
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    Ok((status, Json(response)))
}

async fn health_handler(State(state): State<AppState>) -> HttpResult<Json<Value>> {
    let database = state.orchestrator.database();
    let latency = database.health_check().await.map_err(|err| {
        error!(error = %err, "Database health check failed");
        HttpError::health_check(err.to_string())
    })?;

    Ok(Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": VERSION,
        "backend": database.backend_type().to_string(),
        "database_latency_ms": latency.as_millis() as u64,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// Start the server with graceful shutdown
pub async fn start_server(addr: SocketAddr, router: Router) -> HttpResult<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| HttpError::startup(format!("Failed to bind to {}: {}", addr, e)))?;

    info!("Migration service listening on {}", addr);

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| HttpError::internal(format!("Server error: {}", e)))?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            warn!("Received terminate signal, shutting down gracefully...");
        },
    }
}
