//! HTTP transport for the RPC surface.
//!
//! One POST route carries every action inside an `{action, parameters}`
//! envelope. Broker failures never become transport failures: the handler
//! answers 200 with `{"error": "<string>"}` and callers branch on the
//! presence of that field.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::{error, info};

use crate::config::READY_MARKER;
use crate::db::SessionBroker;
use crate::error::BrokerResult;
use crate::rpc::registry::HandlerRegistry;

#[derive(Clone)]
struct AppState {
    registry: Arc<HandlerRegistry>,
    broker: Arc<SessionBroker>,
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    action: String,
    #[serde(default)]
    parameters: JsonValue,
}

/// Build the RPC router.
pub fn router(registry: Arc<HandlerRegistry>, broker: Arc<SessionBroker>) -> Router {
    let state = AppState { registry, broker };
    Router::new()
        .route("/execute", post(execute))
        .route("/health", get(health))
        .with_state(state)
}

async fn execute(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Json<JsonValue> {
    match state.registry.dispatch(&request.action, request.parameters).await {
        Ok(result) => Json(json!({ "result": result })),
        Err(err) => {
            error!(action = %request.action, error = %err, "RPC action failed");
            Json(json!({ "error": err.to_string() }))
        }
    }
}

async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

/// Bind the listener, log readiness, and serve until SIGINT/SIGTERM. All
/// registered connections are force-closed on the way out.
pub async fn serve(
    host: &str,
    port: u16,
    registry: Arc<HandlerRegistry>,
    broker: Arc<SessionBroker>,
) -> BrokerResult<()> {
    let app = router(registry, Arc::clone(&broker));

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| crate::error::BrokerError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    // The supervisor on the client side scans stdout for this exact line.
    info!("{} on http://{}", READY_MARKER, addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_signal())
        .await
        .map_err(|e| crate::error::BrokerError::internal(format!("Server error: {}", e)))?;

    let open = broker.connection_count().await;
    if open > 0 {
        info!(connections = open, "Closing remaining database connections");
    }
    broker.close_all().await;
    info!("Server stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => error!(error = %err, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
