//! Integration tests for the relay API
//!
//! The router is served on an ephemeral port and driven over HTTP, with the
//! in-memory `FakePortal` standing in for the owners portal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bluelink_api::{create_router, ApiKeyHash, AppState, RateLimiter};
use bluelink_core::testing::FakePortal;
use bluelink_core::{
    ClimateSettings, GuardConfig, ManualClock, Portal, RemoteAction, SessionGuard, SessionPhase,
    SessionStore,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::TcpListener;

const NOW: i64 = 1_700_000_000;
const API_KEY: &str = "relay-secret";

// =============================================================================
// Test fixture
// =============================================================================

struct TestFixture {
    addr: SocketAddr,
    http: reqwest::Client,
    portal: Arc<FakePortal>,
    clock: Arc<ManualClock>,
    guard: Arc<SessionGuard>,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_limiter(RateLimiter::new(100.0, 100)).await
    }

    async fn with_limiter(limiter: RateLimiter) -> Self {
        let clock = Arc::new(ManualClock::new(NOW));
        let portal = Arc::new(FakePortal::new(clock.clone()));
        let guard = Arc::new(SessionGuard::with_clock(
            portal.clone(),
            Arc::new(SessionStore::new()),
            FakePortal::credentials(),
            GuardConfig::default(),
            clock.clone(),
        ));

        let state = AppState::new(
            guard.clone(),
            portal.clone() as Arc<dyn Portal>,
            limiter,
            ApiKeyHash::from_plain(API_KEY),
        );
        let router = create_router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .ok();
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        Self {
            addr,
            http: reqwest::Client::new(),
            portal,
            clock,
            guard,
            _shutdown: tx,
        }
    }

    async fn post(&self, path: &str, body: Value) -> (u16, String) {
        let response = self
            .http
            .post(format!("http://{}{}", self.addr, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.text().await.unwrap())
    }

    async fn post_raw(&self, path: &str, body: &'static str) -> u16 {
        self.http
            .post(format!("http://{}{}", self.addr, path))
            .body(body)
            .send()
            .await
            .unwrap()
            .status()
            .as_u16()
    }

    async fn login(&self) {
        self.guard.login().await.unwrap();
    }
}

fn authed(extra: Value) -> Value {
    let mut body = json!({ "api_key": API_KEY });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        body.extend(extra.clone());
    }
    body
}

// =============================================================================
// Middleware
// =============================================================================

#[tokio::test]
async fn test_rate_limited_request_never_reaches_portal() {
    let fixture = TestFixture::with_limiter(RateLimiter::new(0.0, 1)).await;

    let (status, _) = fixture.post("/api/lock_door", authed(json!({}))).await;
    assert_eq!(status, 200);
    let calls_after_first = fixture.portal.calls().total();

    let (status, body) = fixture.post("/api/lock_door", authed(json!({}))).await;
    assert_eq!(status, 429);
    assert!(body.contains("too_many_requests"));
    assert_eq!(fixture.portal.calls().total(), calls_after_first);
}

#[tokio::test]
async fn test_rate_limit_applies_before_auth() {
    let fixture = TestFixture::with_limiter(RateLimiter::new(0.0, 0)).await;

    let (status, _) = fixture.post("/api/lock_door", json!({ "api_key": "wrong" })).await;
    assert_eq!(status, 429);
    assert_eq!(fixture.portal.calls().total(), 0);
}

#[tokio::test]
async fn test_wrong_api_key() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.post("/api/lock_door", json!({ "api_key": "wrong" })).await;
    assert_eq!(status, 401);
    assert!(body.contains("unauthorized"));
    assert_eq!(fixture.portal.calls().total(), 0);
}

#[tokio::test]
async fn test_missing_api_key() {
    let fixture = TestFixture::new().await;
    let (status, _) = fixture.post("/api/lock_door", json!({})).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_malformed_body() {
    let fixture = TestFixture::new().await;
    assert_eq!(fixture.post_raw("/api/lock_door", "{not json").await, 400);
    assert_eq!(fixture.post_raw("/api/lock_door", "[1, 2]").await, 400);
    assert_eq!(fixture.post_raw("/api/lock_door", "").await, 400);
    assert_eq!(fixture.portal.calls().total(), 0);
}

#[tokio::test]
async fn test_health_skips_auth_and_reports_phase() {
    let fixture = TestFixture::new().await;
    let url = format!("http://{}/health", fixture.addr);

    let body: Value = fixture.http.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["session"], "absent");

    fixture.login().await;
    let body: Value = fixture.http.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["session"], "fresh");
    assert_eq!(body["renewals"], 1);
}

// =============================================================================
// Commands
// =============================================================================

#[tokio::test]
async fn test_start_climate_with_settings() {
    let fixture = TestFixture::new().await;
    fixture.login().await;

    let (status, body) = fixture
        .post(
            "/api/start_climate",
            authed(json!({ "temperature": 68, "defrost": true })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, "Climate started");
    assert_eq!(
        fixture.portal.last_action(),
        Some(RemoteAction::StartClimate(ClimateSettings {
            temperature: 68,
            defrost: true,
            ..ClimateSettings::default()
        }))
    );
}

#[tokio::test]
async fn test_start_climate_defaults() {
    let fixture = TestFixture::new().await;
    fixture.login().await;

    let (status, _) = fixture.post("/api/start_climate", authed(json!({}))).await;
    assert_eq!(status, 200);
    assert_eq!(
        fixture.portal.last_action(),
        Some(RemoteAction::StartClimate(ClimateSettings::default()))
    );
}

#[tokio::test]
async fn test_start_climate_rejects_out_of_range_temperature() {
    let fixture = TestFixture::new().await;
    fixture.login().await;
    let before = fixture.portal.calls();

    let (status, body) = fixture
        .post("/api/start_climate", authed(json!({ "temperature": 95 })))
        .await;
    assert_eq!(status, 400);
    assert!(body.contains("out of range"));
    assert_eq!(fixture.portal.calls(), before);
}

#[tokio::test]
async fn test_start_climate_rejects_wrong_type() {
    let fixture = TestFixture::new().await;
    let (status, _) = fixture
        .post("/api/start_climate", authed(json!({ "temperature": "warm" })))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_simple_commands() {
    let fixture = TestFixture::new().await;
    fixture.login().await;

    for (path, expected, action) in [
        ("/api/stop_climate", "Climate stopped", RemoteAction::StopClimate),
        ("/api/lock_door", "Doors locked", RemoteAction::LockDoors),
        ("/api/unlock_door", "Doors unlocked", RemoteAction::UnlockDoors),
    ] {
        let (status, body) = fixture.post(path, authed(json!({}))).await;
        assert_eq!(status, 200, "{}", path);
        assert_eq!(body, expected);
        assert_eq!(fixture.portal.last_action(), Some(action));
    }
}

#[tokio::test]
async fn test_status_reads() {
    let fixture = TestFixture::new().await;
    fixture.login().await;

    let (status, body) = fixture.post("/api/get_odometer", authed(json!({}))).await;
    assert_eq!(status, 200);
    assert_eq!(body, format!("Odometer: {}", FakePortal::MILEAGE));

    let (status, body) = fixture.post("/api/get_battery", authed(json!({}))).await;
    assert_eq!(status, 200);
    assert_eq!(body, "Battery: 87%, EV: 64%");

    let (status, body) = fixture.post("/api/get_location", authed(json!({}))).await;
    assert_eq!(status, 200);
    assert_eq!(body, "Location: 33.6846, -117.8265");
}

// =============================================================================
// Session handling through the API
// =============================================================================

#[tokio::test]
async fn test_fresh_session_makes_no_login_calls() {
    let fixture = TestFixture::new().await;
    fixture.login().await;
    let logins = fixture.portal.calls().logins;

    for _ in 0..3 {
        let (status, _) = fixture.post("/api/lock_door", authed(json!({}))).await;
        assert_eq!(status, 200);
    }
    assert_eq!(fixture.portal.calls().logins, logins);
    assert_eq!(fixture.portal.calls().actions, 3);
}

#[tokio::test]
async fn test_first_command_logs_in_when_no_session() {
    let fixture = TestFixture::new().await;

    let (status, _) = fixture.post("/api/lock_door", authed(json!({}))).await;
    assert_eq!(status, 200);
    assert_eq!(fixture.portal.calls().logins, 1);
    assert_eq!(fixture.guard.phase(), SessionPhase::Fresh);
}

#[tokio::test]
async fn test_expired_session_renewed_before_command() {
    let fixture = TestFixture::new().await;
    fixture.login().await;

    fixture.clock.advance(FakePortal::DEFAULT_TTL + 1);
    let (status, _) = fixture.post("/api/lock_door", authed(json!({}))).await;
    assert_eq!(status, 200);
    assert_eq!(fixture.portal.calls().logins, 2);
    assert_eq!(fixture.guard.renewal_count(), 2);
}

#[tokio::test]
async fn test_failed_renewal_is_generic_500() {
    let fixture = TestFixture::new().await;
    fixture.login().await;
    let token = fixture.guard.store().current().unwrap().token.clone();

    fixture.clock.advance(FakePortal::DEFAULT_TTL + 1);
    fixture.portal.fail_login(true);

    let (status, body) = fixture.post("/api/lock_door", authed(json!({}))).await;
    assert_eq!(status, 500);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["message"], "Request to vehicle service failed");
    assert!(!body.to_string().contains("correct-horse"));

    // Prior session kept
    assert_eq!(fixture.guard.store().current().unwrap().token, token);
    assert_eq!(fixture.guard.phase(), SessionPhase::Failed);
    assert_eq!(fixture.portal.calls().actions, 0);
}

#[tokio::test]
async fn test_rejected_command_is_generic_500() {
    let fixture = TestFixture::new().await;
    fixture.login().await;
    fixture.portal.fail_commands(true);

    let (status, body) = fixture.post("/api/lock_door", authed(json!({}))).await;
    assert_eq!(status, 500);
    assert!(body.contains("upstream_error"));
}
