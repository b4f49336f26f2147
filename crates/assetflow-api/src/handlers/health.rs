use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::{AppState, Backends};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backends: Backends,
}

/// Liveness only. Backends are reported, not probed.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backends: state.backends.clone(),
    })
}
