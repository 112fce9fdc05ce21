//! Session guard - freshness check and renewal before every authenticated command
//!
//! # Lifecycle
//!
//! ```text
//! Absent ──login()──► Fresh ──(now > expires_at - margin)──► Stale
//!                       ▲                                       │
//!                       │                               ensure_fresh()
//!                       │                                       ▼
//!                       └────────── success ─────────────── Renewing
//!                                                               │
//!                                                     refresh and login fail
//!                                                               ▼
//!                                                            Failed
//! ```
//!
//! Renewal tries a lightweight refresh first when the portal offers one, then
//! falls back to the full handshake once. There is no retry loop beyond that.
//! A failed renewal leaves the stored session untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{PortalError, PortalResult};
use crate::models::Credentials;
use crate::portal::{LoginGrant, Portal};
use crate::session::{Session, SessionStore};

/// Default proactive renewal buffer
pub const DEFAULT_RENEWAL_MARGIN: Duration = Duration::from_secs(15 * 60);

/// Guard tuning
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Buffer before expiry at which a session counts as stale
    pub renewal_margin: Duration,
    /// Serialize renewals so concurrent stale requests share one renewal attempt
    pub single_flight: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            renewal_margin: DEFAULT_RENEWAL_MARGIN,
            single_flight: true,
        }
    }
}

/// Per-request classification of the stored session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No login has succeeded yet
    Absent,
    /// Usable without any upstream call
    Fresh,
    /// Within the renewal margin of expiry, or past it
    Stale,
}

impl Freshness {
    /// Classify `session` at `now` against a renewal margin in seconds
    pub fn classify(session: Option<&Session>, now: i64, margin_secs: i64) -> Self {
        match session {
            None => Freshness::Absent,
            Some(s) if now > s.expires_at.saturating_sub(margin_secs) => Freshness::Stale,
            Some(_) => Freshness::Fresh,
        }
    }

    pub fn needs_renewal(self) -> bool {
        !matches!(self, Freshness::Fresh)
    }
}

/// Last observed phase of the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Absent,
    Fresh,
    Stale,
    Renewing,
    Failed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionPhase::Absent => "absent",
            SessionPhase::Fresh => "fresh",
            SessionPhase::Stale => "stale",
            SessionPhase::Renewing => "renewing",
            SessionPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl From<Freshness> for SessionPhase {
    fn from(freshness: Freshness) -> Self {
        match freshness {
            Freshness::Absent => SessionPhase::Absent,
            Freshness::Fresh => SessionPhase::Fresh,
            Freshness::Stale => SessionPhase::Stale,
        }
    }
}

/// Gates authenticated commands behind a session freshness check
pub struct SessionGuard {
    portal: Arc<dyn Portal>,
    store: Arc<SessionStore>,
    credentials: Credentials,
    config: GuardConfig,
    clock: Arc<dyn Clock>,
    renewal_lock: Mutex<Option<String>>,
    renewal_rounds: AtomicU64,
    phase: RwLock<SessionPhase>,
    renewals: AtomicU64,
}

impl SessionGuard {
    pub fn new(
        portal: Arc<dyn Portal>,
        store: Arc<SessionStore>,
        credentials: Credentials,
        config: GuardConfig,
    ) -> Self {
        Self::with_clock(portal, store, credentials, config, Arc::new(SystemClock))
    }

    /// Create a guard with an explicit time source
    pub fn with_clock(
        portal: Arc<dyn Portal>,
        store: Arc<SessionStore>,
        credentials: Credentials,
        config: GuardConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let phase = if store.is_empty() {
            SessionPhase::Absent
        } else {
            SessionPhase::Stale
        };
        Self {
            portal,
            store,
            credentials,
            config,
            clock,
            renewal_lock: Mutex::new(None),
            renewal_rounds: AtomicU64::new(0),
            phase: RwLock::new(phase),
            renewals: AtomicU64::new(0),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Last observed state-machine phase
    pub fn phase(&self) -> SessionPhase {
        *self.phase.read()
    }

    /// Number of successful renewals (including the startup login)
    pub fn renewal_count(&self) -> u64 {
        self.renewals.load(Ordering::Relaxed)
    }

    /// Classify the stored session right now
    pub fn classify(&self) -> Freshness {
        let session = self.store.current();
        Freshness::classify(session.as_deref(), self.clock.now(), self.margin_secs())
    }

    /// Return a session that is usable for a command, renewing it first if needed.
    ///
    /// On failure the request must be aborted; the stored session is left as it was.
    pub async fn ensure_fresh(&self) -> PortalResult<Arc<Session>> {
        let current = self.store.current();
        let freshness =
            Freshness::classify(current.as_deref(), self.clock.now(), self.margin_secs());

        if let (Freshness::Fresh, Some(session)) = (freshness, current.as_ref()) {
            self.set_phase(SessionPhase::Fresh);
            return Ok(session.clone());
        }

        self.set_phase(freshness.into());
        debug!(?freshness, "Session needs renewal");

        if !self.config.single_flight {
            return self.renew(current).await;
        }

        let round = self.renewal_rounds.load(Ordering::SeqCst);
        let mut last_error = self.renewal_lock.lock().await;

        // Another task may have renewed while this one waited for the lock
        let current = self.store.current();
        if let (Freshness::Fresh, Some(session)) = (
            Freshness::classify(current.as_deref(), self.clock.now(), self.margin_secs()),
            current.as_ref(),
        ) {
            debug!("Session renewed by a concurrent request");
            self.set_phase(SessionPhase::Fresh);
            return Ok(session.clone());
        }

        // A renewal round finished while this one waited and it failed
        if self.renewal_rounds.load(Ordering::SeqCst) != round {
            if let Some(error) = last_error.as_ref() {
                debug!(error = %error, "Sharing failed renewal from a concurrent request");
                self.set_phase(SessionPhase::Failed);
                return Err(PortalError::StaleSession(error.clone()));
            }
        }

        let outcome = self.renew(current).await;
        *last_error = match &outcome {
            Ok(_) => None,
            Err(PortalError::StaleSession(reason)) => Some(reason.clone()),
            Err(e) => Some(e.to_string()),
        };
        self.renewal_rounds.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    /// Run the full login handshake and store the resulting session.
    ///
    /// Used for the startup login; errors are returned as-is.
    pub async fn login(&self) -> PortalResult<Arc<Session>> {
        let previous = self.store.current();
        self.set_phase(SessionPhase::Renewing);
        match self.full_login(previous.as_deref()).await {
            Ok(session) => Ok(self.commit(session)),
            Err(e) => {
                self.set_phase(SessionPhase::Failed);
                Err(e)
            }
        }
    }

    async fn renew(&self, previous: Option<Arc<Session>>) -> PortalResult<Arc<Session>> {
        self.set_phase(SessionPhase::Renewing);

        if let Some(prev) = previous.as_deref() {
            if self.portal.supports_refresh() {
                match self.try_refresh(prev).await {
                    Ok(session) => return Ok(self.commit(session)),
                    Err(e) => warn!(
                        kind = e.kind(),
                        error = %e,
                        "Session refresh failed, falling back to login"
                    ),
                }
            }
        }

        match self.full_login(previous.as_deref()).await {
            Ok(session) => Ok(self.commit(session)),
            Err(e) => {
                self.set_phase(SessionPhase::Failed);
                warn!(kind = e.kind(), error = %e, "Session renewal failed");
                Err(PortalError::StaleSession(e.to_string()))
            }
        }
    }

    async fn try_refresh(&self, previous: &Session) -> PortalResult<Session> {
        let grant = self.portal.refresh(&self.credentials, previous).await?;
        let expires_at = self.resolve_expiry(&grant, Some(previous));
        Ok(Session::new(
            grant.token,
            expires_at,
            previous.registration_id.clone(),
        ))
    }

    async fn full_login(&self, previous: Option<&Session>) -> PortalResult<Session> {
        let portal_token = self.portal.fetch_portal_token().await?;
        self.portal.validate_csrf(&portal_token).await?;

        let grant = self.portal.login(&self.credentials, &portal_token).await?;
        let registration_id = self
            .portal
            .resolve_registration(&self.credentials, &grant.token, &self.credentials.vin)
            .await?;

        let expires_at = self.resolve_expiry(&grant, previous);
        Ok(Session::new(grant.token, expires_at, registration_id))
    }

    fn resolve_expiry(&self, grant: &LoginGrant, previous: Option<&Session>) -> i64 {
        match grant.expires_at {
            Some(expires_at) => expires_at,
            None => {
                let inherited = previous.map(|s| s.expires_at).unwrap_or(0);
                warn!(
                    expires_at = inherited,
                    "Session token carried no usable expiry, keeping previous value"
                );
                inherited
            }
        }
    }

    fn commit(&self, session: Session) -> Arc<Session> {
        let remaining = session.remaining(self.clock.now());
        let session = self.store.replace(session);
        self.renewals.fetch_add(1, Ordering::Relaxed);
        self.set_phase(SessionPhase::Fresh);
        info!(
            expires_at = session.expires_at,
            remaining_secs = remaining,
            registration_id = %session.registration_id,
            "Session renewed"
        );
        session
    }

    fn set_phase(&self, phase: SessionPhase) {
        if *self.phase.read() != phase {
            *self.phase.write() = phase;
        }
    }

    fn margin_secs(&self) -> i64 {
        i64::try_from(self.config.renewal_margin.as_secs()).unwrap_or(i64::MAX)
    }
}
