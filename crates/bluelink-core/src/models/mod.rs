//! Data models shared by the portal client, the guard and the API layer

mod account;
mod action;
mod vehicle;

pub use account::Credentials;
pub use action::{ClimateSettings, RemoteAction, MAX_CLIMATE_TEMP, MIN_CLIMATE_TEMP};
pub use vehicle::{BatteryStatus, OwnedVehicle, VehicleLocation};
