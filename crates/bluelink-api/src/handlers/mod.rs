//! HTTP request handlers

pub mod climate;
pub mod doors;
pub mod health;
pub mod status;

use bluelink_core::RemoteAction;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Run a remote action on a fresh session and return its confirmation text
pub(crate) async fn dispatch(
    state: &AppState,
    action: RemoteAction,
) -> Result<&'static str, ApiError> {
    let session = state.guard().ensure_fresh().await?;
    state
        .portal()
        .remote_action(state.credentials(), &session, &action)
        .await?;
    info!(action = action.name(), "Remote action accepted");
    Ok(action.confirmation())
}
