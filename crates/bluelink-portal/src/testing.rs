//! Test utilities for bluelink-portal
//!
//! [`FakePortalServer`] serves the portal endpoints the client talks to
//! from an in-process axum router, so the real [`PortalClient`] can be
//! driven end to end without network access.
//!
//! [`PortalClient`]: crate::PortalClient

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bluelink_core::testing::FakePortal;
use bluelink_core::{Clock, Credentials, SystemClock};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::claims::encode_unsigned_token;
use crate::wire;

/// Request counts seen by the fake portal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortalHits {
    pub token_fetches: usize,
    pub csrf_checks: usize,
    pub logins: usize,
    pub owner_info: usize,
    pub remote_calls: usize,
}

impl PortalHits {
    /// Requests belonging to a full login handshake
    pub fn handshake(&self) -> usize {
        self.token_fetches + self.csrf_checks + self.logins + self.owner_info
    }

    pub fn total(&self) -> usize {
        self.handshake() + self.remote_calls
    }
}

#[derive(Default)]
struct Hits {
    token_fetches: AtomicUsize,
    csrf_checks: AtomicUsize,
    logins: AtomicUsize,
    owner_info: AtomicUsize,
    remote_calls: AtomicUsize,
}

struct Behaviour {
    /// Session lifetime in seconds; `None` issues tokens without `exp`
    session_ttl: Option<i64>,
    exp_in_millis: bool,
    csrf_status: StatusCode,
    login_status: StatusCode,
    command_failure: Option<String>,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            session_ttl: Some(FakePortal::DEFAULT_TTL),
            exp_in_millis: false,
            csrf_status: StatusCode::OK,
            login_status: StatusCode::OK,
            command_failure: None,
        }
    }
}

/// Shared state of the fake portal
pub struct PortalFixture {
    credentials: Credentials,
    registration_id: String,
    clock: Arc<dyn Clock>,
    hits: Hits,
    behaviour: Mutex<Behaviour>,
    bootstrap_tokens: Mutex<HashSet<String>>,
    session_tokens: Mutex<HashSet<String>>,
    last_form: Mutex<Option<HashMap<String, String>>>,
    issued: AtomicUsize,
}

impl PortalFixture {
    fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            credentials: FakePortal::credentials(),
            registration_id: FakePortal::REGISTRATION_ID.to_string(),
            clock,
            hits: Hits::default(),
            behaviour: Mutex::new(Behaviour::default()),
            bootstrap_tokens: Mutex::new(HashSet::new()),
            session_tokens: Mutex::new(HashSet::new()),
            last_form: Mutex::new(None),
            issued: AtomicUsize::new(0),
        }
    }

    /// Credentials the fake account accepts
    pub fn credentials(&self) -> Credentials {
        self.credentials.clone()
    }

    pub fn registration_id(&self) -> &str {
        &self.registration_id
    }

    pub fn hits(&self) -> PortalHits {
        let h = &self.hits;
        PortalHits {
            token_fetches: h.token_fetches.load(Ordering::SeqCst),
            csrf_checks: h.csrf_checks.load(Ordering::SeqCst),
            logins: h.logins.load(Ordering::SeqCst),
            owner_info: h.owner_info.load(Ordering::SeqCst),
            remote_calls: h.remote_calls.load(Ordering::SeqCst),
        }
    }

    /// Form fields of the most recent remote action request
    pub fn last_form(&self) -> Option<HashMap<String, String>> {
        self.last_form.lock().clone()
    }

    pub fn set_session_ttl(&self, ttl: Option<i64>) {
        self.behaviour.lock().session_ttl = ttl;
    }

    pub fn set_exp_in_millis(&self, millis: bool) {
        self.behaviour.lock().exp_in_millis = millis;
    }

    pub fn set_csrf_status(&self, status: StatusCode) {
        self.behaviour.lock().csrf_status = status;
    }

    pub fn set_login_status(&self, status: StatusCode) {
        self.behaviour.lock().login_status = status;
    }

    /// Make every remote command answer with the given failure message
    pub fn fail_commands(&self, message: Option<&str>) {
        self.behaviour.lock().command_failure = message.map(str::to_string);
    }

    /// Forget all issued session tokens, as the portal does on expiry
    pub fn expire_sessions(&self) {
        self.session_tokens.lock().clear();
    }

    fn issue_session_token(&self) -> String {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let behaviour = self.behaviour.lock();
        let mut claims = json!({
            "sub": self.credentials.username,
            "jti": serial,
        });
        if let Some(ttl) = behaviour.session_ttl {
            let exp = self.clock.now() + ttl;
            claims["exp"] = if behaviour.exp_in_millis {
                json!(exp * 1000)
            } else {
                json!(exp)
            };
        }
        drop(behaviour);

        let token = encode_unsigned_token(&claims);
        self.session_tokens.lock().insert(token.clone());
        token
    }

    fn session_valid(&self, form: &HashMap<String, String>) -> bool {
        form.get("token")
            .map(|t| self.session_tokens.lock().contains(t))
            .unwrap_or(false)
    }
}

type Fixture = Arc<PortalFixture>;

fn router(fixture: Fixture) -> Router {
    Router::new()
        .route(wire::PORTAL_TOKEN_PATH, get(portal_token))
        .route(wire::CSRF_PATH, get(csrf))
        .route(wire::LOGIN_PATH, post(login))
        .route(wire::ACCOUNT_PATH, post(account))
        .route(wire::REMOTE_ACTION_PATH, post(remote_action))
        .with_state(fixture)
}

fn failure(message: &str) -> Json<Value> {
    Json(json!({
        "E_IFRESULT": "E:Failure",
        "E_IFFAILMSG": message,
        "RESPONSE_STRING": "",
    }))
}

fn success(payload: Value) -> Json<Value> {
    Json(json!({
        "E_IFRESULT": wire::RESULT_SUCCESS,
        "E_IFFAILMSG": "",
        "RESPONSE_STRING": payload,
    }))
}

async fn portal_token(State(fixture): State<Fixture>) -> Json<Value> {
    let n = fixture.hits.token_fetches.fetch_add(1, Ordering::SeqCst) + 1;
    let token = format!("bootstrap-{}", n);
    fixture.bootstrap_tokens.lock().insert(token.clone());
    Json(json!({ "jwt_token": token }))
}

async fn csrf(State(fixture): State<Fixture>, headers: HeaderMap) -> Response {
    fixture.hits.csrf_checks.fetch_add(1, Ordering::SeqCst);
    let status = fixture.behaviour.lock().csrf_status;
    if status != StatusCode::OK {
        return (status, "csrf check failed").into_response();
    }

    let known = headers
        .get(wire::CSRF_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|t| fixture.bootstrap_tokens.lock().contains(t))
        .unwrap_or(false);
    if known {
        Json(json!({ "token": "" })).into_response()
    } else {
        (StatusCode::FORBIDDEN, "unknown csrf token").into_response()
    }
}

async fn login(
    State(fixture): State<Fixture>,
    Query(form): Query<HashMap<String, String>>,
) -> Response {
    fixture.hits.logins.fetch_add(1, Ordering::SeqCst);
    let status = fixture.behaviour.lock().login_status;
    if status != StatusCode::OK {
        return (status, "login unavailable").into_response();
    }

    let bootstrap_ok = form
        .get(":cq_csrf_token")
        .map(|t| fixture.bootstrap_tokens.lock().contains(t))
        .unwrap_or(false);
    if !bootstrap_ok {
        return failure("Invalid request token").into_response();
    }

    let creds = &fixture.credentials;
    let matches = form.get("username") == Some(&creds.username)
        && form.get("password") == Some(&creds.password);
    if !matches {
        return failure("Invalid username or password").into_response();
    }

    let token = fixture.issue_session_token();
    success(json!({ "jwt_id": token })).into_response()
}

async fn account(
    State(fixture): State<Fixture>,
    Query(form): Query<HashMap<String, String>>,
) -> Json<Value> {
    fixture.hits.owner_info.fetch_add(1, Ordering::SeqCst);
    if form.get("service").map(String::as_str) != Some(wire::SERVICE_OWNER_INFO) {
        return failure("Unknown service");
    }
    if !fixture.session_valid(&form) {
        return failure("Session expired");
    }

    success(json!({
        "OwnersVehiclesInfo": [
            {
                "VinNumber": "KMHL14JA5PA000099",
                "RegistrationID": "H00099999",
                "VehicleNickName": "Second car",
                "Mileage": "40210",
            },
            {
                "VinNumber": fixture.credentials.vin,
                "RegistrationID": fixture.registration_id,
                "VehicleNickName": "Daily",
                "Mileage": FakePortal::MILEAGE,
            },
        ]
    }))
}

async fn remote_action(
    State(fixture): State<Fixture>,
    Query(form): Query<HashMap<String, String>>,
) -> Json<Value> {
    fixture.hits.remote_calls.fetch_add(1, Ordering::SeqCst);
    *fixture.last_form.lock() = Some(form.clone());

    if !fixture.session_valid(&form) {
        return failure("Session expired");
    }
    if form.get("regId") != Some(&fixture.registration_id) {
        return failure("Vehicle not registered");
    }
    if form.get("pin") != Some(&fixture.credentials.pin) {
        return failure("Invalid PIN");
    }

    let service = form.get("service").map(String::as_str).unwrap_or_default();
    match service {
        wire::SERVICE_CLIMATE_START
        | wire::SERVICE_CLIMATE_STOP
        | wire::SERVICE_DOOR_LOCK
        | wire::SERVICE_DOOR_UNLOCK => {
            let command_failure = fixture.behaviour.lock().command_failure.clone();
            match command_failure {
                Some(message) => failure(&message),
                None => success(json!({})),
            }
        }
        wire::SERVICE_VEHICLE_STATUS => success(json!({
            "vehicleStatus": {
                "battery": { "batSoc": 87 },
                "evStatus": { "batteryStatus": 64 },
            }
        })),
        wire::SERVICE_VEHICLE_LOCATION => success(json!({
            "coord": { "lat": 33.6846, "lon": -117.8265, "alt": 0 },
            "head": 90.0,
            "speed": { "value": 0.0, "unit": 1 },
        })),
        _ => failure("Unknown service"),
    }
}

/// A fake portal server that shuts down when dropped
pub struct FakePortalServer {
    pub addr: SocketAddr,
    fixture: Fixture,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl FakePortalServer {
    /// Start a fake portal issuing tokens against the system clock
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with_clock(Arc::new(SystemClock)).await
    }

    /// Start a fake portal whose token expiries follow `clock`
    pub async fn start_with_clock(clock: Arc<dyn Clock>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let fixture = Arc::new(PortalFixture::new(clock));
        let app = router(fixture.clone());
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            fixture,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn fixture(&self) -> &PortalFixture {
        &self.fixture
    }

    pub fn hits(&self) -> PortalHits {
        self.fixture.hits()
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for FakePortalServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluelink_core::ManualClock;

    #[test]
    fn test_issued_token_carries_expiry() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let fixture = PortalFixture::new(clock);
        let token = fixture.issue_session_token();
        assert_eq!(
            crate::decode_expiry(&token, crate::ClaimsUnit::Seconds),
            Ok(1_700_000_000 + FakePortal::DEFAULT_TTL)
        );

        fixture.set_session_ttl(None);
        let token = fixture.issue_session_token();
        assert!(crate::decode_expiry(&token, crate::ClaimsUnit::Auto).is_err());
    }

    #[test]
    fn test_expire_sessions_invalidates_tokens() {
        let fixture = PortalFixture::new(Arc::new(SystemClock));
        let token = fixture.issue_session_token();
        let form = HashMap::from([("token".to_string(), token)]);
        assert!(fixture.session_valid(&form));
        fixture.expire_sessions();
        assert!(!fixture.session_valid(&form));
    }

    #[test]
    fn test_hits_totals() {
        let hits = PortalHits {
            token_fetches: 1,
            csrf_checks: 1,
            logins: 1,
            owner_info: 1,
            remote_calls: 2,
        };
        assert_eq!(hits.handshake(), 4);
        assert_eq!(hits.total(), 6);
    }
}
