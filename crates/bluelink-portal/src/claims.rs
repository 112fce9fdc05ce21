//! Expiry decoding from the session token's embedded JWT claims
//!
//! The signature is not verified; the relay only needs the expiry to decide
//! when to renew, and the portal remains the authority on validity.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wire::SESSION_TOKEN_PREFIX;

/// Claims values above this are taken to be milliseconds in `Auto` mode
const MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

/// Unit of the `exp` claim
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimsUnit {
    /// Guess from magnitude
    #[default]
    Auto,
    Seconds,
    Milliseconds,
}

/// Reasons the expiry could not be read from a token
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token is not a JWT")]
    NotJwt,
    #[error("claims segment is not base64url: {0}")]
    Base64(String),
    #[error("claims segment is not JSON: {0}")]
    Json(String),
    #[error("claims carry no numeric exp")]
    MissingExp,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<serde_json::Value>,
}

/// Decode the `exp` claim of a session token into seconds since the epoch
pub fn decode_expiry(token: &str, unit: ClaimsUnit) -> Result<i64, ClaimsError> {
    let jwt = token.strip_prefix(SESSION_TOKEN_PREFIX).unwrap_or(token);

    let mut segments = jwt.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(header), Some(payload)) if !header.is_empty() && !payload.is_empty() => payload,
        _ => return Err(ClaimsError::NotJwt),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ClaimsError::Base64(e.to_string()))?;
    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|e| ClaimsError::Json(e.to_string()))?;

    let exp = match claims.exp {
        Some(serde_json::Value::Number(n)) => n.as_f64().ok_or(ClaimsError::MissingExp)?,
        Some(serde_json::Value::String(s)) => {
            s.trim().parse::<f64>().map_err(|_| ClaimsError::MissingExp)?
        }
        _ => return Err(ClaimsError::MissingExp),
    };

    let seconds = match unit {
        ClaimsUnit::Seconds => exp,
        ClaimsUnit::Milliseconds => exp / 1000.0,
        ClaimsUnit::Auto if exp > MILLIS_THRESHOLD => exp / 1000.0,
        ClaimsUnit::Auto => exp,
    };

    Ok(seconds as i64)
}

/// Build an unsigned session token carrying the given claims (for fakes and tests)
pub fn encode_unsigned_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}{}.{}.unsigned", SESSION_TOKEN_PREFIX, header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_millisecond_claims() {
        let token = encode_unsigned_token(&json!({ "exp": 1_700_000_000_000i64 }));
        assert_eq!(
            decode_expiry(&token, ClaimsUnit::Milliseconds),
            Ok(1_700_000_000)
        );
        assert_eq!(decode_expiry(&token, ClaimsUnit::Auto), Ok(1_700_000_000));
    }

    #[test]
    fn test_second_claims() {
        let token = encode_unsigned_token(&json!({ "exp": 1_700_000_000i64 }));
        assert_eq!(decode_expiry(&token, ClaimsUnit::Seconds), Ok(1_700_000_000));
        assert_eq!(decode_expiry(&token, ClaimsUnit::Auto), Ok(1_700_000_000));
    }

    #[test]
    fn test_explicit_unit_overrides_magnitude() {
        let token = encode_unsigned_token(&json!({ "exp": 1_700_000_000i64 }));
        assert_eq!(
            decode_expiry(&token, ClaimsUnit::Milliseconds),
            Ok(1_700_000)
        );
    }

    #[test]
    fn test_float_and_string_exp() {
        let token = encode_unsigned_token(&json!({ "exp": 1.7e12 }));
        assert_eq!(decode_expiry(&token, ClaimsUnit::Auto), Ok(1_700_000_000));

        let token = encode_unsigned_token(&json!({ "exp": "1700000000" }));
        assert_eq!(decode_expiry(&token, ClaimsUnit::Auto), Ok(1_700_000_000));
    }

    #[test]
    fn test_prefix_is_optional() {
        let token = encode_unsigned_token(&json!({ "exp": 1_700_000_000i64 }));
        let bare = token.strip_prefix("JWT-").unwrap();
        assert_eq!(decode_expiry(bare, ClaimsUnit::Auto), Ok(1_700_000_000));
    }

    #[test]
    fn test_malformed_tokens() {
        assert_eq!(
            decode_expiry("JWT-opaque", ClaimsUnit::Auto),
            Err(ClaimsError::NotJwt)
        );
        assert!(matches!(
            decode_expiry("JWT-aaa.!!!.sig", ClaimsUnit::Auto),
            Err(ClaimsError::Base64(_))
        ));

        let not_json = format!("JWT-aaa.{}.sig", URL_SAFE_NO_PAD.encode("not json"));
        assert!(matches!(
            decode_expiry(&not_json, ClaimsUnit::Auto),
            Err(ClaimsError::Json(_))
        ));

        let token = encode_unsigned_token(&json!({ "sub": "owner" }));
        assert_eq!(
            decode_expiry(&token, ClaimsUnit::Auto),
            Err(ClaimsError::MissingExp)
        );
    }
}
