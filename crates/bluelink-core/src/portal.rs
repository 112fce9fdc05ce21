//! Portal trait - the seam between the session core and the upstream owners portal

use async_trait::async_trait;

use crate::error::{PortalError, PortalResult};
use crate::models::{BatteryStatus, Credentials, OwnedVehicle, RemoteAction, VehicleLocation};
use crate::session::Session;

/// Token and expiry returned by a successful login or refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub token: String,
    /// Expiry in seconds since the epoch; `None` when the claims could not be decoded
    pub expires_at: Option<i64>,
}

/// Upstream owners portal.
///
/// Every method is a live network call. Implementations keep no state
/// between calls beyond what is passed in through the token or session.
#[async_trait]
pub trait Portal: Send + Sync {
    // =========================================================================
    // Login handshake
    // =========================================================================

    /// Fetch the bootstrap token that proves the client reached the real site
    async fn fetch_portal_token(&self) -> PortalResult<String>;

    /// Confirm the bootstrap token is accepted. Failure is not retried.
    async fn validate_csrf(&self, portal_token: &str) -> PortalResult<()>;

    /// Submit the account credentials and obtain a session token
    async fn login(&self, credentials: &Credentials, portal_token: &str)
        -> PortalResult<LoginGrant>;

    /// Whether [`Portal::refresh`] is offered
    fn supports_refresh(&self) -> bool {
        false
    }

    /// Extend an existing session without the full handshake
    async fn refresh(
        &self,
        _credentials: &Credentials,
        _session: &Session,
    ) -> PortalResult<LoginGrant> {
        Err(PortalError::NotSupported("session refresh".to_string()))
    }

    // =========================================================================
    // Vehicle lookup
    // =========================================================================

    /// List the vehicles owned by the account
    async fn list_vehicles(
        &self,
        credentials: &Credentials,
        token: &str,
    ) -> PortalResult<Vec<OwnedVehicle>>;

    /// Resolve the registration id of the vehicle with the given VIN
    async fn resolve_registration(
        &self,
        credentials: &Credentials,
        token: &str,
        vin: &str,
    ) -> PortalResult<String> {
        let vehicles = self.list_vehicles(credentials, token).await?;
        find_registration(&vehicles, vin).map(|v| v.registration_id.clone())
    }

    // =========================================================================
    // Vehicle commands
    // =========================================================================

    /// Send a state-changing remote action
    async fn remote_action(
        &self,
        credentials: &Credentials,
        session: &Session,
        action: &RemoteAction,
    ) -> PortalResult<()>;

    /// Read the battery state
    async fn battery_status(
        &self,
        _credentials: &Credentials,
        _session: &Session,
    ) -> PortalResult<BatteryStatus> {
        Err(PortalError::NotSupported("battery status".to_string()))
    }

    /// Read the last known vehicle position
    async fn vehicle_location(
        &self,
        _credentials: &Credentials,
        _session: &Session,
    ) -> PortalResult<VehicleLocation> {
        Err(PortalError::NotSupported("vehicle location".to_string()))
    }
}

/// Find the vehicle whose VIN matches exactly (case-sensitive, whole string)
pub fn find_registration<'a>(
    vehicles: &'a [OwnedVehicle],
    vin: &str,
) -> PortalResult<&'a OwnedVehicle> {
    vehicles
        .iter()
        .find(|v| v.vin == vin)
        .ok_or_else(|| PortalError::NotFound(format!("VIN {} not on account", vin)))
}
