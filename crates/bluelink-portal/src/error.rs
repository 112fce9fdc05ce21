//! Error types for portal client construction and transport failures

use bluelink_core::PortalError;
use thiserror::Error;

/// Errors raised while building a [`crate::PortalClient`]
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP client could not be built
    #[error("HTTP client setup failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid base URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Base URL cannot carry paths (e.g. `mailto:`)
    #[error("Base URL cannot be used for HTTP requests: {0}")]
    UnsupportedUrl(String),
}

/// Map a transport failure onto the portal error taxonomy
pub(crate) fn network_error(err: reqwest::Error) -> PortalError {
    if err.is_timeout() {
        PortalError::Network(format!("request timed out: {}", err))
    } else if err.is_decode() {
        PortalError::Decode(err.to_string())
    } else {
        PortalError::Network(err.to_string())
    }
}
