//! Prometheus metrics endpoint

use axum::{extract::State, http::header, response::IntoResponse};

use crate::state::AppState;

/// Engine metrics in Prometheus text format
#[utoipa::path(
    get,
    path = "/metrics",
    responses((status = 200, description = "Prometheus metrics", content_type = "text/plain")),
    tag = "health"
)]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = match state.engine.metrics() {
        Some(metrics) => metrics.export_prometheus().await,
        None => String::new(),
    };

    if let Some(stats) = state.engine.resolver().cache_stats() {
        body.push_str(&format!(
            "\n# HELP rbac_cache_entries Cached effective permission sets\n\
             # TYPE rbac_cache_entries gauge\n\
             rbac_cache_entries {}\n",
            stats.entries
        ));
    }

    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
