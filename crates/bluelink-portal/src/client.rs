//! Owners portal HTTP client

use std::time::Duration;

use async_trait::async_trait;
use bluelink_core::{
    BatteryStatus, Credentials, LoginGrant, OwnedVehicle, Portal, PortalError, PortalResult,
    RemoteAction, Session, VehicleLocation,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::claims::{decode_expiry, ClaimsUnit};
use crate::error::{network_error, ClientError};
use crate::types::{
    Envelope, LocationPayload, LoginPayload, OwnerInfoPayload, PortalTokenResponse,
    VehicleEntry, VehicleStatusPayload,
};
use crate::wire;

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest response body excerpt carried in errors and logs
const BODY_EXCERPT_LEN: usize = 512;

/// Portal client settings
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Unit of the `exp` claim in session tokens
    pub claims_unit: ClaimsUnit,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: wire::DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            claims_unit: ClaimsUnit::Auto,
        }
    }
}

/// Owners portal client
///
/// Stateless apart from the connection pool: the session token and
/// registration id are passed in on every call.
#[derive(Debug, Clone)]
pub struct PortalClient {
    client: Client,
    base_url: Url,
    claims_unit: ClaimsUnit,
}

impl PortalClient {
    /// Create a client for the portal at `base_url` with default settings
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_config(PortalConfig {
            base_url: base_url.to_string(),
            ..PortalConfig::default()
        })
    }

    /// Create a client with custom configuration
    pub fn with_config(config: PortalConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(wire::USER_AGENT)
            .build()?;

        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::UnsupportedUrl(config.base_url));
        }

        Ok(Self {
            client,
            base_url,
            claims_unit: config.claims_unit,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> PortalResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| PortalError::Network(format!("invalid portal path {}: {}", path, e)))
    }

    /// Absolute page URL, as the portal pages send it in `url` and `Referer`
    fn page(&self, path: &str) -> String {
        self.base_url
            .join(path)
            .map(String::from)
            .unwrap_or_else(|_| path.to_string())
    }

    /// Headers the portal's own pages send with XHR calls
    fn browser_headers(&self, referer_page: &str, cookie: &str) -> PortalResult<HeaderMap> {
        let origin = self.base_url.origin().ascii_serialization();
        let referer = self.page(referer_page);

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, wire::PAGE_CSRF_HEADER, wire::PAGE_CSRF_VALUE)?;
        insert_header(&mut headers, "accept-language", wire::ACCEPT_LANGUAGE)?;
        insert_header(&mut headers, "x-requested-with", wire::REQUESTED_WITH)?;
        insert_header(&mut headers, "referer", &referer)?;
        insert_header(&mut headers, "content-type", wire::FORM_CONTENT_TYPE)?;
        insert_header(&mut headers, "origin", &origin)?;
        insert_header(&mut headers, "cookie", cookie)?;
        Ok(headers)
    }

    /// Read a response body, failing on non-success status
    async fn read_body(&self, response: Response, what: &str) -> PortalResult<String> {
        let status = response.status();
        let body = response.text().await.map_err(network_error)?;
        // Success bodies can carry session tokens
        debug!(%status, body_len = body.len(), "{} response", what);

        if !status.is_success() {
            debug!(body = %excerpt(&body), "{} failed", what);
            return Err(PortalError::status(status.as_u16(), excerpt(&body)));
        }
        Ok(body)
    }

    /// POST a remote-action service call for the session's vehicle
    async fn remote_call<T: DeserializeOwned>(
        &self,
        credentials: &Credentials,
        session: &Session,
        service: &str,
        extra: Vec<(&'static str, String)>,
    ) -> PortalResult<Envelope<T>> {
        let url = self.endpoint(wire::REMOTE_ACTION_PATH)?;
        let cookie = wire::session_cookie(&session.token, &credentials.username);
        let headers = self.browser_headers(wire::BLUE_LINK_PAGE, &cookie)?;

        let mut params: Vec<(&str, String)> = vec![
            ("vin", credentials.vin.clone()),
            ("username", credentials.username.clone()),
            ("token", session.token.clone()),
            ("pin", credentials.pin.clone()),
            ("service", service.to_string()),
            ("url", self.page(wire::BLUE_LINK_PAGE)),
            ("regId", session.registration_id.clone()),
            ("gen", wire::VEHICLE_GENERATION.to_string()),
        ];
        params.extend(extra);

        let response = self
            .client
            .post(url)
            .headers(headers)
            .query(&params)
            .send()
            .await
            .map_err(network_error)?;

        let body = self.read_body(response, service).await?;
        parse_json(&body, service)
    }
}

#[async_trait]
impl Portal for PortalClient {
    #[instrument(skip(self))]
    async fn fetch_portal_token(&self) -> PortalResult<String> {
        let url = self.endpoint(wire::PORTAL_TOKEN_PATH)?;
        let response = self.client.get(url).send().await.map_err(network_error)?;
        let body = self.read_body(response, "portal token").await?;

        let parsed: PortalTokenResponse = parse_json(&body, "portal token")?;
        match parsed.jwt_token {
            Some(token) if !token.is_empty() => {
                debug!(token_len = token.len(), "Fetched portal token");
                Ok(token)
            }
            _ => Err(PortalError::Decode(
                "portal token: missing jwt_token".to_string(),
            )),
        }
    }

    #[instrument(skip(self, portal_token))]
    async fn validate_csrf(&self, portal_token: &str) -> PortalResult<()> {
        let url = self.endpoint(wire::CSRF_PATH)?;
        let response = self
            .client
            .get(url)
            .header(wire::CSRF_TOKEN_HEADER, portal_token)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(error = %e, "Could not read CSRF rejection body");
                    String::new()
                }
            };
            warn!(%status, "Portal rejected CSRF token");
            return Err(PortalError::status(status.as_u16(), excerpt(&body)));
        }
        Ok(())
    }

    #[instrument(skip(self, credentials, portal_token), fields(username = %credentials.username))]
    async fn login(
        &self,
        credentials: &Credentials,
        portal_token: &str,
    ) -> PortalResult<LoginGrant> {
        let url = self.endpoint(wire::LOGIN_PATH)?;
        let params = [
            (":cq_csrf_token", portal_token.to_string()),
            ("url", self.page(wire::INDEX_PAGE)),
            ("username", credentials.username.clone()),
            ("password", credentials.password.clone()),
        ];

        let response = self
            .client
            .post(url)
            .query(&params)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PortalError::Credentials(format!(
                "login answered {}",
                status
            )));
        }
        let body = self.read_body(response, "login").await?;
        let envelope: Envelope<LoginPayload> = parse_json(&body, "login")?;

        let token = match envelope.response.as_ref().and_then(|p| p.jwt_id.clone()) {
            Some(token) if !token.is_empty() => token,
            _ if envelope.is_failure() => {
                return Err(PortalError::Credentials(envelope.failure_reason()))
            }
            _ => return Err(PortalError::Decode("login: missing jwt_id".to_string())),
        };

        let expires_at = match decode_expiry(&token, self.claims_unit) {
            Ok(expires_at) => {
                debug!(expires_at, "Decoded session expiry");
                Some(expires_at)
            }
            Err(e) => {
                warn!(error = %e, "Could not decode session token claims");
                None
            }
        };

        Ok(LoginGrant { token, expires_at })
    }

    #[instrument(skip(self, credentials, token))]
    async fn list_vehicles(
        &self,
        credentials: &Credentials,
        token: &str,
    ) -> PortalResult<Vec<OwnedVehicle>> {
        let url = self.endpoint(wire::ACCOUNT_PATH)?;
        let cookie = wire::session_cookie(token, &credentials.username);
        let headers = self.browser_headers(wire::DASHBOARD_REFERER_PAGE, &cookie)?;
        let params = [
            ("username", credentials.username.clone()),
            ("token", token.to_string()),
            ("service", wire::SERVICE_OWNER_INFO.to_string()),
            ("url", self.page(wire::DASHBOARD_PAGE)),
        ];

        let response = self
            .client
            .post(url)
            .headers(headers)
            .query(&params)
            .send()
            .await
            .map_err(network_error)?;

        let body = self.read_body(response, "owner info").await?;
        let envelope: Envelope<OwnerInfoPayload> = parse_json(&body, "owner info")?;
        let payload = envelope.into_payload("owner info")?;

        let total = payload.vehicles.len();
        let vehicles: Vec<OwnedVehicle> = payload
            .vehicles
            .into_iter()
            .filter_map(VehicleEntry::into_vehicle)
            .collect();
        if vehicles.len() < total {
            debug!(
                skipped = total - vehicles.len(),
                "Skipped vehicle entries without VIN or registration id"
            );
        }
        Ok(vehicles)
    }

    #[instrument(skip(self, credentials, session, action), fields(action = action.name()))]
    async fn remote_action(
        &self,
        credentials: &Credentials,
        session: &Session,
        action: &RemoteAction,
    ) -> PortalResult<()> {
        let (service, extra) = action_params(action);
        let envelope: Envelope<serde_json::Value> =
            self.remote_call(credentials, session, service, extra).await?;

        if envelope.is_success() {
            Ok(())
        } else {
            Err(PortalError::Rejected(format!(
                "{}: {}",
                action.name(),
                envelope.failure_reason()
            )))
        }
    }

    #[instrument(skip(self, credentials, session))]
    async fn battery_status(
        &self,
        credentials: &Credentials,
        session: &Session,
    ) -> PortalResult<BatteryStatus> {
        let envelope: Envelope<VehicleStatusPayload> = self
            .remote_call(credentials, session, wire::SERVICE_VEHICLE_STATUS, Vec::new())
            .await?;
        envelope.into_payload("vehicle status")?.into_battery()
    }

    #[instrument(skip(self, credentials, session))]
    async fn vehicle_location(
        &self,
        credentials: &Credentials,
        session: &Session,
    ) -> PortalResult<VehicleLocation> {
        let envelope: Envelope<LocationPayload> = self
            .remote_call(credentials, session, wire::SERVICE_VEHICLE_LOCATION, Vec::new())
            .await?;
        envelope.into_payload("vehicle location")?.into_location()
    }
}

/// Service name and extra form fields for a remote action
fn action_params(action: &RemoteAction) -> (&'static str, Vec<(&'static str, String)>) {
    match action {
        RemoteAction::StartClimate(settings) => {
            let duration = settings
                .duration_minutes
                .map(|m| m.to_string())
                .unwrap_or_else(|| wire::DEFAULT_IGNITION_DURATION.to_string());
            (
                wire::SERVICE_CLIMATE_START,
                vec![
                    ("airCtrl", "true".to_string()),
                    ("igniOnDuration", duration),
                    ("airTempvalue", settings.temperature.to_string()),
                    ("defrost", settings.defrost.to_string()),
                    ("heating1", if settings.heating { "1" } else { "0" }.to_string()),
                    ("seatHeaterVentInfo", wire::SEAT_HEATER_VENT_INFO.to_string()),
                ],
            )
        }
        RemoteAction::StopClimate => (wire::SERVICE_CLIMATE_STOP, Vec::new()),
        RemoteAction::LockDoors => (wire::SERVICE_DOOR_LOCK, Vec::new()),
        RemoteAction::UnlockDoors => (wire::SERVICE_DOOR_UNLOCK, Vec::new()),
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> PortalResult<()> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| PortalError::Decode(format!("invalid header name {}: {}", name, e)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| PortalError::Decode(format!("invalid {} header value: {}", name, e)))?;
    headers.insert(name, value);
    Ok(())
}

fn parse_json<T: DeserializeOwned>(body: &str, what: &str) -> PortalResult<T> {
    serde_json::from_str(body).map_err(|e| PortalError::Decode(format!("{}: {}", what, e)))
}

fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT_LEN {
        return body.to_string();
    }
    let mut end = BODY_EXCERPT_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluelink_core::ClimateSettings;

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            PortalClient::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            PortalClient::new("mailto:owner@example.com"),
            Err(ClientError::UnsupportedUrl(_))
        ));
    }

    #[test]
    fn test_page_urls_follow_base() {
        let client = PortalClient::new("http://127.0.0.1:4000").unwrap();
        assert_eq!(
            client.page(wire::BLUE_LINK_PAGE),
            "http://127.0.0.1:4000/us/en/page/blue-link.html"
        );
    }

    #[test]
    fn test_browser_headers() {
        let client = PortalClient::new(wire::DEFAULT_BASE_URL).unwrap();
        let headers = client
            .browser_headers(wire::BLUE_LINK_PAGE, "jwt_token=JWT-x; s_name=owner")
            .unwrap();
        assert_eq!(headers["origin"], "https://owners.hyundaiusa.com");
        assert_eq!(
            headers["referer"],
            "https://owners.hyundaiusa.com/us/en/page/blue-link.html"
        );
        assert_eq!(headers["x-requested-with"], "XMLHttpRequest");
        assert_eq!(headers["csrf-token"], "undefined");
        assert_eq!(headers["cookie"], "jwt_token=JWT-x; s_name=owner");
    }

    #[test]
    fn test_climate_params() {
        let action = RemoteAction::StartClimate(ClimateSettings {
            temperature: 68,
            defrost: true,
            heating: true,
            duration_minutes: Some(10),
        });
        let (service, params) = action_params(&action);
        assert_eq!(service, "postRemoteFatcStart");
        let get = |k: &str| params.iter().find(|(n, _)| *n == k).map(|(_, v)| v.as_str());
        assert_eq!(get("airTempvalue"), Some("68"));
        assert_eq!(get("defrost"), Some("true"));
        assert_eq!(get("heating1"), Some("1"));
        assert_eq!(get("igniOnDuration"), Some("10"));
        assert_eq!(get("airCtrl"), Some("true"));
    }

    #[test]
    fn test_default_climate_params() {
        let (_, params) = action_params(&RemoteAction::StartClimate(ClimateSettings::default()));
        let get = |k: &str| params.iter().find(|(n, _)| *n == k).map(|(_, v)| v.as_str());
        assert_eq!(get("airTempvalue"), Some("72"));
        assert_eq!(get("heating1"), Some("0"));
        assert_eq!(get("igniOnDuration"), Some("NaN"));
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let body = "é".repeat(400);
        let short = excerpt(&body);
        assert!(short.ends_with("..."));
        assert!(short.len() <= BODY_EXCERPT_LEN + 3);
    }
}
