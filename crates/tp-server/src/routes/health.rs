//! Liveness and gate occupancy.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::context::AppContext;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub downloads: DownloadStats,
}

#[derive(Debug, Serialize)]
pub struct DownloadStats {
    pub active: usize,
    pub capacity: usize,
}

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        downloads: DownloadStats {
            active: ctx.gate.in_flight(),
            capacity: ctx.gate.capacity(),
        },
    })
}
