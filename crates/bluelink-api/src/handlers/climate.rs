//! Climate control handlers

use axum::extract::State;
use axum::Extension;
use bluelink_core::{ClimateSettings, RemoteAction};

use super::dispatch;
use crate::auth::RequestParams;
use crate::error::ApiError;
use crate::state::AppState;

/// Start climate control
///
/// POST /api/start_climate
///
/// Optional body fields: `temperature` (°F, 62-82, default 72), `defrost`,
/// `heating`, `duration_minutes`.
pub async fn start_climate(
    State(state): State<AppState>,
    Extension(params): Extension<RequestParams>,
) -> Result<&'static str, ApiError> {
    let settings: ClimateSettings = params.parse()?;
    settings.validate().map_err(ApiError::BadRequest)?;
    dispatch(&state, RemoteAction::StartClimate(settings)).await
}

/// Stop climate control
///
/// POST /api/stop_climate
pub async fn stop_climate(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    dispatch(&state, RemoteAction::StopClimate).await
}
