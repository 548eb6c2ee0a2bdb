//! Planning poker server library - HTTP/WebSocket server for estimation sessions.
//!
//! This library provides the routes, connection handling, broadcast hub and
//! issue tracker adapter. It's separated from main.rs to enable integration testing.

pub mod config;
pub mod dispatch;
pub mod hub;
pub mod linear;
pub mod logging;
pub mod routes;
pub mod state;
pub mod websocket;

use axum::{Router, routing::get};
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();

    Router::new()
        .route("/ws", get(routes::ws::upgrade))
        .route("/api/health", get(routes::health))
        .fallback_service(ServeDir::new(static_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Fill the queue from the configured cycle. Failures are logged and the
/// server carries on without tracker issues.
pub async fn load_cycle(state: &AppState, cycle: &str) {
    let Some(tracker) = &state.tracker else {
        warn!(target: "poker::startup", "Cycle {} configured without a Linear API key", cycle);
        return;
    };

    match tracker.fetch_issues_for_cycle(cycle).await {
        Ok(issues) => {
            info!(target: "poker::startup", "Loaded {} issues from {}", issues.len(), cycle);
            state.hub.apply(|session| session.load_tracker_issues(issues));
        }
        Err(e) => {
            warn!(target: "poker::startup", "Failed to load issues from {}: {}", cycle, e);
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let terminate = async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!(target: "poker::startup", "Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!(target: "poker::startup", "Received SIGINT, shutting down...");
        }
        _ = terminate => {
            info!(target: "poker::startup", "Received SIGTERM, shutting down...");
        }
    }
}
