//! Application state for the relay API

use std::sync::Arc;

use bluelink_core::{Credentials, Portal, SessionGuard};

use crate::auth::ApiKeyHash;
use crate::rate_limit::RateLimiter;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    guard: Arc<SessionGuard>,
    portal: Arc<dyn Portal>,
    limiter: Arc<RateLimiter>,
    api_key: Arc<ApiKeyHash>,
}

impl AppState {
    /// `portal` must be the same upstream the guard renews against
    pub fn new(
        guard: Arc<SessionGuard>,
        portal: Arc<dyn Portal>,
        limiter: RateLimiter,
        api_key: ApiKeyHash,
    ) -> Self {
        Self {
            guard,
            portal,
            limiter: Arc::new(limiter),
            api_key: Arc::new(api_key),
        }
    }

    pub fn guard(&self) -> &SessionGuard {
        &self.guard
    }

    pub fn portal(&self) -> &dyn Portal {
        self.portal.as_ref()
    }

    pub fn credentials(&self) -> &Credentials {
        self.guard.credentials()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn api_key(&self) -> &ApiKeyHash {
        &self.api_key
    }
}
