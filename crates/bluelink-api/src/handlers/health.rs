//! Health check handler

use axum::extract::State;
use axum::Json;
use bluelink_core::SessionPhase;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Last observed session phase
    pub session: SessionPhase,
    /// Successful renewals since startup
    pub renewals: u64,
}

/// GET /health
///
/// Not rate limited and not authenticated.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        session: state.guard().phase(),
        renewals: state.guard().renewal_count(),
    })
}
