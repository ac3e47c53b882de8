//! Health check endpoint

use axum::{extract::State, http::StatusCode, Json};

use crate::{models::HealthResponse, state::AppState};

/// Health check endpoint
///
/// Probes the authorization store; answers 503 while it is unreachable.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse),
        (status = 503, description = "Store unavailable", body = HealthResponse),
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store_available = state.engine.list_permissions().await.is_ok();
    let (status, label) = if store_available {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store_available,
            uptime_seconds: state.started_at.elapsed().as_secs(),
        }),
    )
}
