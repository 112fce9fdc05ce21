//! Error types for upstream portal interaction

use thiserror::Error;

/// Result type for portal and session operations
pub type PortalResult<T> = Result<T, PortalError>;

/// Errors that can occur while talking to the owners portal or renewing the session
#[derive(Debug, Error)]
pub enum PortalError {
    /// Connection failure or timeout reaching the portal
    #[error("Network error: {0}")]
    Network(String),

    /// Portal answered with a shape we could not decode
    #[error("Decode error: {0}")]
    Decode(String),

    /// Portal rejected the account credentials
    #[error("Credentials rejected: {0}")]
    Credentials(String),

    /// Configured VIN is not among the account's vehicles
    #[error("Not found: {0}")]
    NotFound(String),

    /// Renewal was attempted and every path failed
    #[error("Session renewal failed: {0}")]
    StaleSession(String),

    /// Portal answered with an unexpected HTTP status
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Vehicle command reached the portal but was not carried out
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// Operation not offered by this portal client
    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl PortalError {
    /// Stable short name used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            PortalError::Network(_) => "network",
            PortalError::Decode(_) => "decode",
            PortalError::Credentials(_) => "credentials",
            PortalError::NotFound(_) => "not_found",
            PortalError::StaleSession(_) => "stale_session",
            PortalError::Status { .. } => "status",
            PortalError::Rejected(_) => "rejected",
            PortalError::NotSupported(_) => "not_supported",
        }
    }

    /// Create a status error from an HTTP code and response body
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = PortalError::status(403, "forbidden");
        assert_eq!(err.to_string(), "Unexpected status 403: forbidden");
        assert_eq!(err.kind(), "status");
    }
}
