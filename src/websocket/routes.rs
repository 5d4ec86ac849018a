use crate::server::RelayServer;
use axum::routing::get;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::handler::websocket_handler;
use super::metrics::{health_check, metrics_handler};

pub const HEALTH_PATH: &str = "/_relay/health";
pub const METRICS_PATH: &str = "/_relay/metrics";

/// Create the Axum router: operational endpoints plus a room upgrade on every other path.
pub fn create_router(cors_origins: &str) -> axum::Router<Arc<RelayServer>> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let cors = if cors_origins.trim() == "*" {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            tracing::warn!("No valid CORS origins configured, using permissive CORS");
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    axum::Router::new()
        .route(HEALTH_PATH, get(health_check))
        .route(METRICS_PATH, get(metrics_handler))
        .fallback(websocket_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve the relay on `listener` until `shutdown` resolves.
///
/// When `shutdown` fires, every live connection is told to close before the
/// listener stops accepting.
pub async fn run_server<F>(
    listener: TcpListener,
    server: Arc<RelayServer>,
    cors_origins: &str,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(cors_origins).with_state(server.clone());

    let shutdown_server = server.clone();
    let graceful = async move {
        shutdown.await;
        shutdown_server.begin_shutdown();
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful)
    .await?;

    Ok(())
}
