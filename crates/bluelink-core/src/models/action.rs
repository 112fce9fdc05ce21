//! Remote actions that change vehicle state

use serde::{Deserialize, Serialize};

/// Lowest cabin temperature (°F) the portal accepts
pub const MIN_CLIMATE_TEMP: u8 = 62;
/// Highest cabin temperature (°F) the portal accepts
pub const MAX_CLIMATE_TEMP: u8 = 82;

/// Settings for a remote climate start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClimateSettings {
    /// Target cabin temperature in °F
    #[serde(default = "default_temperature")]
    pub temperature: u8,
    #[serde(default)]
    pub defrost: bool,
    /// Rear window and mirror heating
    #[serde(default)]
    pub heating: bool,
    /// Engine run time in minutes; the portal default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u8>,
}

fn default_temperature() -> u8 {
    72
}

impl Default for ClimateSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            defrost: false,
            heating: false,
            duration_minutes: None,
        }
    }
}

impl ClimateSettings {
    /// Check the settings against the ranges the portal accepts
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_CLIMATE_TEMP..=MAX_CLIMATE_TEMP).contains(&self.temperature) {
            return Err(format!(
                "temperature {} out of range {}-{}",
                self.temperature, MIN_CLIMATE_TEMP, MAX_CLIMATE_TEMP
            ));
        }
        if self.duration_minutes == Some(0) {
            return Err("duration_minutes must be at least 1".to_string());
        }
        Ok(())
    }
}

/// A state-changing command sent through the portal's remote action endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAction {
    StartClimate(ClimateSettings),
    StopClimate,
    LockDoors,
    UnlockDoors,
}

impl RemoteAction {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            RemoteAction::StartClimate(_) => "start_climate",
            RemoteAction::StopClimate => "stop_climate",
            RemoteAction::LockDoors => "lock_doors",
            RemoteAction::UnlockDoors => "unlock_doors",
        }
    }

    /// Human-readable confirmation returned to API callers
    pub fn confirmation(&self) -> &'static str {
        match self {
            RemoteAction::StartClimate(_) => "Climate started",
            RemoteAction::StopClimate => "Climate stopped",
            RemoteAction::LockDoors => "Doors locked",
            RemoteAction::UnlockDoors => "Doors unlocked",
        }
    }
}
