//! Vehicle status read handlers

use axum::extract::State;
use bluelink_core::{find_registration, PortalError};

use crate::error::ApiError;
use crate::state::AppState;

/// Read the odometer from the account's vehicle list
///
/// POST /api/get_odometer
pub async fn get_odometer(State(state): State<AppState>) -> Result<String, ApiError> {
    let session = state.guard().ensure_fresh().await?;
    let credentials = state.credentials();

    let vehicles = state
        .portal()
        .list_vehicles(credentials, &session.token)
        .await?;
    let vehicle = find_registration(&vehicles, &credentials.vin)?;
    let mileage = vehicle
        .mileage
        .as_deref()
        .ok_or_else(|| PortalError::Decode("owner info: missing Mileage".to_string()))?;

    Ok(format!("Odometer: {}", mileage))
}

/// POST /api/get_battery
pub async fn get_battery(State(state): State<AppState>) -> Result<String, ApiError> {
    let session = state.guard().ensure_fresh().await?;
    let battery = state
        .portal()
        .battery_status(state.credentials(), &session)
        .await?;
    Ok(battery.to_string())
}

/// POST /api/get_location
pub async fn get_location(State(state): State<AppState>) -> Result<String, ApiError> {
    let session = state.guard().ensure_fresh().await?;
    let location = state
        .portal()
        .vehicle_location(state.credentials(), &session)
        .await?;
    Ok(location.to_string())
}
