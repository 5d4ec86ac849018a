use crate::metrics::MetricsSnapshot;
use crate::server::RelayServer;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use std::sync::Arc;

fn enforce_metrics_auth(headers: &HeaderMap, expected: &str) -> Result<(), StatusCode> {
    let Some(raw_header) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        tracing::warn!("Unauthorized metrics access attempt: missing Authorization header");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let Some(token) = raw_header.strip_prefix("Bearer ") else {
        tracing::warn!("Unauthorized metrics access attempt: invalid Authorization scheme");
        return Err(StatusCode::UNAUTHORIZED);
    };

    if token.trim() == expected {
        return Ok(());
    }

    tracing::warn!("Unauthorized metrics access attempt: token rejected");
    Err(StatusCode::UNAUTHORIZED)
}

/// Relay counters as JSON. Requires a bearer token when one is configured.
pub async fn metrics_handler(
    headers: HeaderMap,
    State(server): State<Arc<RelayServer>>,
) -> Result<Json<MetricsSnapshot>, StatusCode> {
    if let Some(expected) = server.config().metrics_auth_token.as_deref() {
        enforce_metrics_auth(&headers, expected)?;
    }

    Ok(Json(server.metrics_snapshot()))
}

/// Health check endpoint
pub async fn health_check(State(server): State<Arc<RelayServer>>) -> Result<&'static str, StatusCode> {
    if server.health_check() {
        Ok("OK")
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
