//! bluelink-api - HTTP relay API
//!
//! Every `/api/*` route is a `POST` with a JSON body carrying `api_key`.
//! Requests pass the rate limiter first, then the API-key check, and only
//! then reach a handler, which asks the [`SessionGuard`] for a fresh
//! session before talking to the portal.
//!
//! # Usage
//!
//! ```ignore
//! use bluelink_api::{create_router, ApiKeyHash, AppState, RateLimiter};
//!
//! let limiter = RateLimiter::new(1.0, 5);
//! let state = AppState::new(guard, portal, limiter, ApiKeyHash::from_plain("secret"));
//! let router = create_router(state);
//! axum::serve(listener, router).await?;
//! ```
//!
//! [`SessionGuard`]: bluelink_core::SessionGuard

pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod state;

pub use auth::{ApiKeyHash, RequestParams};
pub use error::ApiError;
pub use rate_limit::RateLimiter;
pub use state::AppState;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Create the relay router with the given application state
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Climate
        .route("/api/start_climate", post(handlers::climate::start_climate))
        .route("/api/stop_climate", post(handlers::climate::stop_climate))
        // Doors
        .route("/api/lock_door", post(handlers::doors::lock_door))
        .route("/api/unlock_door", post(handlers::doors::unlock_door))
        // Status reads
        .route("/api/get_odometer", post(handlers::status::get_odometer))
        .route("/api/get_battery", post(handlers::status::get_battery))
        .route("/api/get_location", post(handlers::status::get_location))
        // Outermost layer runs first: rate limit, then auth
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_requests,
        ));

    Router::new()
        .route("/health", get(handlers::health::health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
