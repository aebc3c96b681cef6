//! Liveness endpoint with dependency probes

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub env: String,
    pub version: String,
    pub time: String,
    pub cache: &'static str,
    pub database: &'static str,
}

fn probe_status(healthy: bool) -> &'static str {
    if healthy {
        "UP"
    } else {
        "DOWN"
    }
}

/// GET /health
///
/// Always 200; dependency state is reported in the body.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (cache, database) = tokio::join!(state.cache.ping(), state.directory.ping());

    if let Err(e) = &cache {
        tracing::warn!(error = %e, "Health check: cache unreachable");
    }
    if let Err(e) = &database {
        tracing::warn!(error = %e, "Health check: database unreachable");
    }

    let all_up = cache.is_ok() && database.is_ok();

    Json(HealthResponse {
        status: if all_up { "UP" } else { "DEGRADED" },
        service: env!("CARGO_PKG_NAME"),
        env: state.config.environment.clone(),
        version: state.config.version.clone(),
        time: chrono::Utc::now().to_rfc3339(),
        cache: probe_status(cache.is_ok()),
        database: probe_status(database.is_ok()),
    })
}
