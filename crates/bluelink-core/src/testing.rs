//! Test utilities for code built on the session core
//!
//! [`FakePortal`] implements [`Portal`] in memory with call counters and
//! switchable failures, so guards and handlers can be exercised without a
//! network.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::error::{PortalError, PortalResult};
use crate::models::{BatteryStatus, Credentials, OwnedVehicle, RemoteAction, VehicleLocation};
use crate::portal::{LoginGrant, Portal};
use crate::session::Session;

/// Snapshot of how often each upstream operation was called
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub token_fetches: usize,
    pub csrf_checks: usize,
    pub logins: usize,
    pub refreshes: usize,
    pub registrations: usize,
    pub actions: usize,
    pub reads: usize,
}

impl CallCounts {
    /// Total upstream calls of any kind
    pub fn total(&self) -> usize {
        self.token_fetches
            + self.csrf_checks
            + self.logins
            + self.refreshes
            + self.registrations
            + self.actions
            + self.reads
    }
}

#[derive(Default)]
struct Counters {
    token_fetches: AtomicUsize,
    csrf_checks: AtomicUsize,
    logins: AtomicUsize,
    refreshes: AtomicUsize,
    registrations: AtomicUsize,
    actions: AtomicUsize,
    reads: AtomicUsize,
}

/// In-memory portal with switchable failures
pub struct FakePortal {
    clock: Arc<dyn Clock>,
    counters: Counters,
    issued: AtomicUsize,
    vehicles: Mutex<Vec<OwnedVehicle>>,
    last_action: Mutex<Option<RemoteAction>>,
    login_delay: Mutex<Option<Duration>>,
    refresh_enabled: AtomicBool,
    csrf_fails: AtomicBool,
    login_fails: AtomicBool,
    refresh_fails: AtomicBool,
    commands_fail: AtomicBool,
    expiry_omitted: AtomicBool,
}

impl FakePortal {
    pub const USERNAME: &'static str = "owner@example.com";
    pub const VIN: &'static str = "KMHL14JA5PA000001";
    pub const REGISTRATION_ID: &'static str = "H00012345";
    pub const MILEAGE: &'static str = "12345";
    /// Session lifetime granted by each login, in seconds
    pub const DEFAULT_TTL: i64 = 3600;

    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            counters: Counters::default(),
            issued: AtomicUsize::new(0),
            vehicles: Mutex::new(vec![
                OwnedVehicle {
                    vin: "KMHL14JA5PA000099".to_string(),
                    registration_id: "H00099999".to_string(),
                    nickname: Some("Second car".to_string()),
                    mileage: Some("800".to_string()),
                },
                OwnedVehicle {
                    vin: Self::VIN.to_string(),
                    registration_id: Self::REGISTRATION_ID.to_string(),
                    nickname: Some("Ioniq".to_string()),
                    mileage: Some(Self::MILEAGE.to_string()),
                },
            ]),
            last_action: Mutex::new(None),
            login_delay: Mutex::new(None),
            refresh_enabled: AtomicBool::new(false),
            csrf_fails: AtomicBool::new(false),
            login_fails: AtomicBool::new(false),
            refresh_fails: AtomicBool::new(false),
            commands_fail: AtomicBool::new(false),
            expiry_omitted: AtomicBool::new(false),
        }
    }

    /// Credentials matching the fake account
    pub fn credentials() -> Credentials {
        Credentials::new(Self::USERNAME, "correct-horse", "1234", Self::VIN)
    }

    pub fn calls(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            token_fetches: c.token_fetches.load(Ordering::SeqCst),
            csrf_checks: c.csrf_checks.load(Ordering::SeqCst),
            logins: c.logins.load(Ordering::SeqCst),
            refreshes: c.refreshes.load(Ordering::SeqCst),
            registrations: c.registrations.load(Ordering::SeqCst),
            actions: c.actions.load(Ordering::SeqCst),
            reads: c.reads.load(Ordering::SeqCst),
        }
    }

    pub fn last_action(&self) -> Option<RemoteAction> {
        self.last_action.lock().clone()
    }

    pub fn set_vehicles(&self, vehicles: Vec<OwnedVehicle>) {
        *self.vehicles.lock() = vehicles;
    }

    pub fn set_login_delay(&self, delay: Duration) {
        *self.login_delay.lock() = Some(delay);
    }

    pub fn enable_refresh(&self, enabled: bool) {
        self.refresh_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_csrf(&self, fail: bool) {
        self.csrf_fails.store(fail, Ordering::SeqCst);
    }

    pub fn fail_login(&self, fail: bool) {
        self.login_fails.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.refresh_fails.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commands(&self, fail: bool) {
        self.commands_fail.store(fail, Ordering::SeqCst);
    }

    /// Issue tokens whose expiry cannot be decoded
    pub fn omit_expiry(&self, omit: bool) {
        self.expiry_omitted.store(omit, Ordering::SeqCst);
    }

    fn grant(&self) -> LoginGrant {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let expires_at = if self.expiry_omitted.load(Ordering::SeqCst) {
            None
        } else {
            Some(self.clock.now() + Self::DEFAULT_TTL)
        };
        LoginGrant {
            token: format!("JWT-fake-{}", n),
            expires_at,
        }
    }

    fn check_session(&self, session: &Session) -> PortalResult<()> {
        if !session.token.starts_with("JWT-fake-") {
            return Err(PortalError::Credentials("unknown session token".to_string()));
        }
        if session.registration_id != Self::REGISTRATION_ID {
            return Err(PortalError::Rejected(format!(
                "unknown registration {}",
                session.registration_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Portal for FakePortal {
    async fn fetch_portal_token(&self) -> PortalResult<String> {
        self.counters.token_fetches.fetch_add(1, Ordering::SeqCst);
        Ok("portal-bootstrap-token".to_string())
    }

    async fn validate_csrf(&self, _portal_token: &str) -> PortalResult<()> {
        self.counters.csrf_checks.fetch_add(1, Ordering::SeqCst);
        if self.csrf_fails.load(Ordering::SeqCst) {
            return Err(PortalError::status(403, "csrf token rejected"));
        }
        Ok(())
    }

    async fn login(
        &self,
        credentials: &Credentials,
        _portal_token: &str,
    ) -> PortalResult<LoginGrant> {
        self.counters.logins.fetch_add(1, Ordering::SeqCst);
        let delay = *self.login_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.login_fails.load(Ordering::SeqCst) || credentials.username != Self::USERNAME {
            return Err(PortalError::Credentials("invalid username or password".to_string()));
        }
        Ok(self.grant())
    }

    fn supports_refresh(&self) -> bool {
        self.refresh_enabled.load(Ordering::SeqCst)
    }

    async fn refresh(
        &self,
        _credentials: &Credentials,
        session: &Session,
    ) -> PortalResult<LoginGrant> {
        self.counters.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.refresh_fails.load(Ordering::SeqCst) {
            return Err(PortalError::status(401, "refresh rejected"));
        }
        self.check_session(session)?;
        Ok(self.grant())
    }

    async fn list_vehicles(
        &self,
        _credentials: &Credentials,
        token: &str,
    ) -> PortalResult<Vec<OwnedVehicle>> {
        self.counters.registrations.fetch_add(1, Ordering::SeqCst);
        if !token.starts_with("JWT-fake-") {
            return Err(PortalError::Credentials("unknown session token".to_string()));
        }
        Ok(self.vehicles.lock().clone())
    }

    async fn remote_action(
        &self,
        _credentials: &Credentials,
        session: &Session,
        action: &RemoteAction,
    ) -> PortalResult<()> {
        self.counters.actions.fetch_add(1, Ordering::SeqCst);
        self.check_session(session)?;
        if self.commands_fail.load(Ordering::SeqCst) {
            return Err(PortalError::Rejected("E:Failure".to_string()));
        }
        *self.last_action.lock() = Some(action.clone());
        Ok(())
    }

    async fn battery_status(
        &self,
        _credentials: &Credentials,
        session: &Session,
    ) -> PortalResult<BatteryStatus> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        self.check_session(session)?;
        Ok(BatteryStatus {
            state_of_charge: 87,
            ev_charge: Some(64),
        })
    }

    async fn vehicle_location(
        &self,
        _credentials: &Credentials,
        session: &Session,
    ) -> PortalResult<VehicleLocation> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        self.check_session(session)?;
        Ok(VehicleLocation {
            latitude: 33.6846,
            longitude: -117.8265,
            heading: Some(90.0),
            speed: Some(0.0),
        })
    }
}
