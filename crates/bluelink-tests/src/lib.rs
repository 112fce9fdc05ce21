//! End-to-end tests for the bluelink relay
//!
//! The harness wires the full stack in-process:
//! - the relay router with rate limiting and API-key auth
//! - the session guard on a manually driven clock
//! - the real portal client talking HTTP to the fake portal server
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bluelink-tests
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bluelink_api::{create_router, ApiKeyHash, AppState, RateLimiter};
use bluelink_core::{GuardConfig, ManualClock, Portal, SessionGuard, SessionStore};
use bluelink_portal::testing::FakePortalServer;
use bluelink_portal::{ClaimsUnit, PortalClient, PortalConfig};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Fixed start time of every harness clock
pub const START: i64 = 1_700_000_000;
/// API key accepted by the harness relay
pub const API_KEY: &str = "relay-secret";

/// Harness tuning
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub guard: GuardConfig,
    pub claims_unit: ClaimsUnit,
    pub rate: f64,
    pub burst: u32,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            guard: GuardConfig::default(),
            claims_unit: ClaimsUnit::Auto,
            rate: 100.0,
            burst: 100,
        }
    }
}

/// Relay and fake portal running side by side
pub struct RelayHarness {
    pub portal: FakePortalServer,
    pub clock: Arc<ManualClock>,
    pub guard: Arc<SessionGuard>,
    pub relay_addr: SocketAddr,
    http: reqwest::Client,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl RelayHarness {
    pub async fn start() -> Self {
        Self::start_with(HarnessOptions::default()).await
    }

    /// Start the fake portal and the relay; no login is performed yet
    pub async fn start_with(options: HarnessOptions) -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let portal = FakePortalServer::start_with_clock(clock.clone())
            .await
            .expect("fake portal should start");

        let client = PortalClient::with_config(PortalConfig {
            base_url: portal.base_url(),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            claims_unit: options.claims_unit,
        })
        .expect("portal client should build");
        let client: Arc<dyn Portal> = Arc::new(client);

        let guard = Arc::new(SessionGuard::with_clock(
            client.clone(),
            Arc::new(SessionStore::new()),
            portal.fixture().credentials(),
            options.guard,
            clock.clone(),
        ));

        let state = AppState::new(
            guard.clone(),
            client,
            RateLimiter::new(options.rate, options.burst),
            ApiKeyHash::from_plain(API_KEY),
        );
        let router = create_router(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("relay should bind");
        let relay_addr = listener.local_addr().expect("relay address");
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        Self {
            portal,
            clock,
            guard,
            relay_addr,
            http: reqwest::Client::new(),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Perform the startup login the daemon runs before serving
    pub async fn login(&self) {
        self.guard.login().await.expect("startup login should succeed");
    }

    /// POST to a relay route with the valid API key plus `extra` fields
    pub async fn command(&self, path: &str, extra: Value) -> (u16, String) {
        let mut body = json!({ "api_key": API_KEY });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            body.extend(extra.clone());
        }
        self.post(path, body).await
    }

    pub async fn post(&self, path: &str, body: Value) -> (u16, String) {
        let response = self
            .http
            .post(format!("http://{}{}", self.relay_addr, path))
            .json(&body)
            .send()
            .await
            .expect("relay request");
        let status = response.status().as_u16();
        let text = response.text().await.expect("relay body");
        (status, text)
    }

    pub async fn health(&self) -> Value {
        self.http
            .get(format!("http://{}/health", self.relay_addr))
            .send()
            .await
            .expect("health request")
            .json()
            .await
            .expect("health body")
    }
}

impl Drop for RelayHarness {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
