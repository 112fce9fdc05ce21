//! Door lock handlers

use axum::extract::State;
use bluelink_core::RemoteAction;

use super::dispatch;
use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/lock_door
pub async fn lock_door(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    dispatch(&state, RemoteAction::LockDoors).await
}

/// POST /api/unlock_door
pub async fn unlock_door(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    dispatch(&state, RemoteAction::UnlockDoors).await
}
