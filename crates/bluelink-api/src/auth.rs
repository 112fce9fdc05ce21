//! API-key authentication middleware
//!
//! The key travels in the JSON body (`{"api_key": "..."}`), so the middleware
//! buffers the body, checks the key against the configured SHA-256 digest and
//! hands the parsed object to handlers as [`RequestParams`].

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::state::AppState;

/// Largest request body accepted by the relay
pub const MAX_BODY_BYTES: usize = 16 * 1024;

/// SHA-256 digest of the configured API key
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeyHash([u8; 32]);

impl ApiKeyHash {
    pub fn from_plain(key: &str) -> Self {
        Self(Sha256::digest(key.as_bytes()).into())
    }

    /// Parse a hex-encoded SHA-256 digest
    pub fn from_hex(digest: &str) -> Result<Self, String> {
        let bytes = hex::decode(digest.trim()).map_err(|e| e.to_string())?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| format!("expected 32 bytes, got {}", b.len()))?;
        Ok(Self(digest))
    }

    /// Compare the digest of `candidate` without early exit
    pub fn matches(&self, candidate: &str) -> bool {
        let digest: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        digest
            .iter()
            .zip(self.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for ApiKeyHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKeyHash(..)")
    }
}

/// Validated JSON body of an authenticated request
#[derive(Debug, Clone)]
pub struct RequestParams(Arc<Map<String, Value>>);

impl RequestParams {
    /// Deserialize the command-specific fields of the body
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let value = Value::Object(self.0.as_ref().clone());
        serde_json::from_value(value).map_err(|e| ApiError::BadRequest(e.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Check the body's `api_key` and attach the parsed body for handlers
///
/// Returns 400 when the body is not a JSON object and 401 when the key is
/// missing or does not match.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();
    let (mut parts, body) = request.into_parts();

    let bytes = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
        tracing::debug!(%path, error = %e, "Unreadable request body");
        ApiError::BadRequest("Unreadable request body".to_string())
    })?;

    let params: Map<String, Value> = serde_json::from_slice(&bytes).map_err(|e| {
        tracing::warn!(%path, error = %e, "Error decoding JSON body");
        ApiError::BadRequest("Body must be a JSON object".to_string())
    })?;

    let provided = params.get("api_key").and_then(Value::as_str).unwrap_or("");
    if !state.api_key().matches(provided) {
        tracing::warn!(%path, "API key doesn't match");
        return Err(ApiError::Unauthorized);
    }

    parts.extensions.insert(RequestParams(Arc::new(params)));
    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "relay-secret";
    fn key_hex() -> String {
        hex::encode(Sha256::digest(KEY.as_bytes()))
    }

    #[test]
    fn test_plain_and_hex_agree() {
        let from_hex = ApiKeyHash::from_hex(&key_hex()).unwrap();
        assert_eq!(from_hex, ApiKeyHash::from_plain(KEY));
        assert!(from_hex.matches(KEY));
        assert!(!from_hex.matches("relay-secret "));
        assert!(!from_hex.matches(""));
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(ApiKeyHash::from_hex("zz").is_err());
        assert!(ApiKeyHash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_debug_hides_digest() {
        let hash = ApiKeyHash::from_plain(KEY);
        assert_eq!(format!("{:?}", hash), "ApiKeyHash(..)");
    }

    #[test]
    fn test_params_parse() {
        #[derive(serde::Deserialize)]
        struct Climate {
            temperature: u8,
        }

        let mut map = Map::new();
        map.insert("api_key".into(), Value::from(KEY));
        map.insert("temperature".into(), Value::from(70));
        let params = RequestParams(Arc::new(map));

        let climate: Climate = params.parse().unwrap();
        assert_eq!(climate.temperature, 70);
        assert_eq!(params.get("api_key"), Some(&Value::from(KEY)));
    }

    #[test]
    fn test_params_parse_type_mismatch() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Climate {
            temperature: u8,
        }

        let mut map = Map::new();
        map.insert("temperature".into(), Value::from("warm"));
        let params = RequestParams(Arc::new(map));
        assert!(matches!(
            params.parse::<Climate>(),
            Err(ApiError::BadRequest(_))
        ));
    }
}
