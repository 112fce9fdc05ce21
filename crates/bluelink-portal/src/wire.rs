//! Fixed integration constants of the owners portal.
//!
//! Paths, browser headers and service names are dictated by the portal's
//! own undocumented web API and have to match what its pages send.

/// Production portal origin
pub const DEFAULT_BASE_URL: &str = "https://owners.hyundaiusa.com";

// =============================================================================
// Endpoints
// =============================================================================

/// Bootstrap token (`{"jwt_token": ...}`)
pub const PORTAL_TOKEN_PATH: &str = "/etc/designs/ownercommon/us/token.json";
/// CSRF validation of the bootstrap token
pub const CSRF_PATH: &str = "/libs/granite/csrf/token.json";
/// Credential login
pub const LOGIN_PATH: &str = "/bin/common/connectCar";
/// Account servlet (owner info, vehicle list)
pub const ACCOUNT_PATH: &str = "/bin/common/MyAccountServlet";
/// Remote actions and vehicle status reads
pub const REMOTE_ACTION_PATH: &str = "/bin/common/remoteAction";

// =============================================================================
// Pages sent as `url` form field and referer
// =============================================================================

pub const INDEX_PAGE: &str = "/us/en/index.html";
pub const DASHBOARD_PAGE: &str = "/us/en/page/dashboard.html";
pub const DASHBOARD_REFERER_PAGE: &str = "/content/myhyundai/us/en/page/dashboard.html";
pub const BLUE_LINK_PAGE: &str = "/us/en/page/blue-link.html";

// =============================================================================
// Headers
// =============================================================================

/// Header carrying the bootstrap token on the CSRF check
pub const CSRF_TOKEN_HEADER: &str = "csrf_token";
/// Header the portal pages send with a literal `undefined`
pub const PAGE_CSRF_HEADER: &str = "CSRF-Token";
pub const PAGE_CSRF_VALUE: &str = "undefined";
pub const REQUESTED_WITH: &str = "XMLHttpRequest";
pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";
pub const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) ",
    "AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.2 Safari/605.1.15"
);

/// Prefix the portal puts in front of session JWTs
pub const SESSION_TOKEN_PREFIX: &str = "JWT-";

// =============================================================================
// Services
// =============================================================================

pub const SERVICE_OWNER_INFO: &str = "getOwnerInfoService";
pub const SERVICE_CLIMATE_START: &str = "postRemoteFatcStart";
pub const SERVICE_CLIMATE_STOP: &str = "postRemoteFatcStop";
pub const SERVICE_DOOR_LOCK: &str = "postRemoteDoorLock";
pub const SERVICE_DOOR_UNLOCK: &str = "postRemoteDoorUnlock";
pub const SERVICE_VEHICLE_STATUS: &str = "getRemoteVehicleStatus";
pub const SERVICE_VEHICLE_LOCATION: &str = "getVehicleLocation";

/// Head-unit generation sent with every remote action
pub const VEHICLE_GENERATION: &str = "2";
/// Driver seat heater setting sent with climate start
pub const SEAT_HEATER_VENT_INFO: &str = r#"{"drvSeatHeatState":"2"}"#;
/// Engine run time value the pages send when none is chosen
pub const DEFAULT_IGNITION_DURATION: &str = "NaN";

/// `E_IFRESULT` value of a successful call
pub const RESULT_SUCCESS: &str = "Z:Success";

/// Cookie header value carrying the session token and account name
pub fn session_cookie(token: &str, username: &str) -> String {
    format!("jwt_token={}; s_name={}", token, username)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie() {
        assert_eq!(
            session_cookie("JWT-abc", "owner@example.com"),
            "jwt_token=JWT-abc; s_name=owner@example.com"
        );
    }
}
