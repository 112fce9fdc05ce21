//! Vehicle records and telemetry read from the portal

use serde::{Deserialize, Serialize};

/// One vehicle on the owner's account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedVehicle {
    pub vin: String,
    pub registration_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Odometer reading as reported by the portal (miles)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mileage: Option<String>,
}

/// Battery state reported by the vehicle status service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// 12 V battery state of charge, percent
    pub state_of_charge: u8,
    /// High-voltage battery charge for electrified models, percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ev_charge: Option<u8>,
}

impl std::fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Battery: {}%", self.state_of_charge)?;
        if let Some(ev) = self.ev_charge {
            write!(f, ", EV: {}%", ev)?;
        }
        Ok(())
    }
}

/// Last known vehicle position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl std::fmt::Display for VehicleLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Location: {}, {}", self.latitude, self.longitude)
    }
}
