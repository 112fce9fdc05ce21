//! Typed shapes of the portal's JSON responses
//!
//! The portal wraps most payloads in an envelope with a result code
//! (`E_IFRESULT`), an optional failure message and the payload itself under
//! `RESPONSE_STRING`. Every field is optional so that missing pieces turn into
//! decode errors instead of failed deserialization of the whole body.

use bluelink_core::{BatteryStatus, OwnedVehicle, PortalError, PortalResult, VehicleLocation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::wire::RESULT_SUCCESS;

/// `GET token.json`
#[derive(Debug, Deserialize)]
pub(crate) struct PortalTokenResponse {
    #[serde(default)]
    pub jwt_token: Option<String>,
}

/// Common response envelope
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub(crate) struct Envelope<T> {
    #[serde(rename = "E_IFRESULT", default)]
    pub result: Option<String>,
    #[serde(rename = "E_IFFAILMSG", default)]
    pub fail_message: Option<String>,
    #[serde(
        rename = "RESPONSE_STRING",
        default = "Option::default",
        deserialize_with = "lenient_payload"
    )]
    pub response: Option<T>,
}

/// Failure responses carry an empty string or null where the payload would be
fn lenient_payload<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => T::deserialize(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.result.as_deref() == Some(RESULT_SUCCESS)
    }

    /// Whether the portal explicitly reported a failure
    pub fn is_failure(&self) -> bool {
        matches!(self.result.as_deref(), Some(r) if r != RESULT_SUCCESS)
    }

    pub fn failure_reason(&self) -> String {
        self.fail_message
            .clone()
            .or_else(|| self.result.clone())
            .unwrap_or_else(|| "no result code".to_string())
    }

    /// Take the payload, turning an explicit failure into `Rejected`
    pub fn into_payload(self, what: &str) -> PortalResult<T> {
        if self.is_failure() {
            return Err(PortalError::Rejected(format!(
                "{}: {}",
                what,
                self.failure_reason()
            )));
        }
        self.response
            .ok_or_else(|| PortalError::Decode(format!("{}: missing RESPONSE_STRING", what)))
    }
}

/// `RESPONSE_STRING` of the login call
#[derive(Debug, Deserialize)]
pub(crate) struct LoginPayload {
    #[serde(default)]
    pub jwt_id: Option<String>,
}

/// `RESPONSE_STRING` of the owner-info service
#[derive(Debug, Deserialize)]
pub(crate) struct OwnerInfoPayload {
    #[serde(rename = "OwnersVehiclesInfo", default)]
    pub vehicles: Vec<VehicleEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VehicleEntry {
    #[serde(rename = "VinNumber", default)]
    pub vin: Option<String>,
    #[serde(rename = "RegistrationID", default)]
    pub registration_id: Option<String>,
    #[serde(rename = "VehicleNickName", default)]
    pub nickname: Option<String>,
    #[serde(rename = "Mileage", default)]
    pub mileage: Option<serde_json::Value>,
}

impl VehicleEntry {
    /// Convert to the core model; entries without VIN or registration id are unusable
    pub fn into_vehicle(self) -> Option<OwnedVehicle> {
        let mileage = match self.mileage {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Some(OwnedVehicle {
            vin: self.vin?,
            registration_id: self.registration_id?,
            nickname: self.nickname,
            mileage,
        })
    }
}

/// `RESPONSE_STRING` of the vehicle status service
#[derive(Debug, Deserialize)]
pub(crate) struct VehicleStatusPayload {
    #[serde(rename = "vehicleStatus", default)]
    pub vehicle_status: Option<VehicleStatusEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VehicleStatusEntry {
    #[serde(default)]
    pub battery: Option<BatteryEntry>,
    #[serde(rename = "evStatus", default)]
    pub ev_status: Option<EvStatusEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatteryEntry {
    #[serde(rename = "batSoc", default)]
    pub state_of_charge: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EvStatusEntry {
    #[serde(rename = "batteryStatus", default)]
    pub battery_status: Option<u8>,
}

impl VehicleStatusPayload {
    pub fn into_battery(self) -> PortalResult<BatteryStatus> {
        let status = self.vehicle_status.ok_or_else(|| {
            PortalError::Decode("vehicle status: missing vehicleStatus".to_string())
        })?;
        let state_of_charge = status
            .battery
            .and_then(|b| b.state_of_charge)
            .ok_or_else(|| {
                PortalError::Decode("vehicle status: missing battery.batSoc".to_string())
            })?;
        Ok(BatteryStatus {
            state_of_charge,
            ev_charge: status.ev_status.and_then(|ev| ev.battery_status),
        })
    }
}

/// `RESPONSE_STRING` of the location service
#[derive(Debug, Deserialize)]
pub(crate) struct LocationPayload {
    #[serde(default)]
    pub coord: Option<CoordEntry>,
    #[serde(default)]
    pub head: Option<f64>,
    #[serde(default)]
    pub speed: Option<SpeedEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CoordEntry {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SpeedEntry {
    #[serde(default)]
    pub value: Option<f64>,
}

impl LocationPayload {
    pub fn into_location(self) -> PortalResult<VehicleLocation> {
        let coord = self
            .coord
            .ok_or_else(|| PortalError::Decode("location: missing coord".to_string()))?;
        Ok(VehicleLocation {
            latitude: coord.lat,
            longitude: coord.lon,
            heading: self.head,
            speed: self.speed.and_then(|s| s.value),
        })
    }
}
