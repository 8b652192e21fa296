//! HTTP route handlers.

use std::sync::Arc;

use axum::{http::StatusCode, response::Json, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::store::{SharedTaskStore, StoreError};

use super::categories;
use super::tasks;

/// Shared application state.
pub struct AppState {
    pub store: SharedTaskStore,
}

/// Map a store error onto an HTTP response.
pub(super) fn store_error(err: StoreError) -> (StatusCode, String) {
    match err {
        StoreError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
        StoreError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        StoreError::Conflict(msg) => (StatusCode::BAD_REQUEST, format!("{msg} already exists")),
        StoreError::Sqlite(e) => {
            tracing::error!("database error: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        }
    }
}

/// Build the API router.
pub fn router(store: SharedTaskStore) -> Router {
    let state = Arc::new(AppState { store });
    Router::new()
        .route("/api/health", get(health))
        .nest("/api/tasks", tasks::routes())
        .nest("/api/categories", categories::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config, store: SharedTaskStore) -> anyhow::Result<()> {
    let app = router(store);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Wait for SIGTERM/SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
