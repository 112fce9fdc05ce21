//! Daemon configuration
//!
//! Loaded once at startup from TOML or JSON (chosen by file extension):
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 8080
//!
//! [rate_limit]
//! rate = 1.0
//! burst = 5
//!
//! [auth]
//! api_key = "change-me"          # or api_key_sha256 = "<hex digest>"
//!
//! [account]
//! username = "owner@example.com"
//! password = "..."
//! pin = "1234"
//! vin = "KMHL14JA5PA000001"
//!
//! [session]
//! renewal_margin_secs = 900
//! claims_unit = "auto"
//! single_flight = true
//!
//! [portal]
//! base_url = "https://owners.hyundaiusa.com"
//! timeout_secs = 30
//! connect_timeout_secs = 10
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bluelink_api::ApiKeyHash;
use bluelink_core::{Credentials, GuardConfig};
use bluelink_portal::{ClaimsUnit, PortalConfig};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// File names probed next to the executable when no path is given
pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["config.toml", "config.json"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported config format '{0}' (expected .toml or .json)")]
    UnsupportedFormat(String),

    #[error("No config file found, looked for: {0}")]
    NotFound(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
    pub account: AccountConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub portal: PortalSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Token bucket parameters
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Tokens added per second
    #[serde(default = "default_rate")]
    pub rate: f64,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            burst: default_burst(),
        }
    }
}

fn default_rate() -> f64 {
    1.0
}

fn default_burst() -> u32 {
    5
}

/// Relay API key, plain or as a hex SHA-256 digest
#[derive(Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_sha256: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_sha256", &self.api_key_sha256)
            .finish()
    }
}

/// Owners portal account and the vehicle to control
#[derive(Clone, Deserialize)]
pub struct AccountConfig {
    pub username: String,
    pub password: String,
    #[serde(deserialize_with = "deserialize_pin")]
    pub pin: String,
    pub vin: String,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("pin", &"<redacted>")
            .field("vin", &self.vin)
            .finish()
    }
}

/// Accept the PIN as either a JSON/TOML integer or a string
fn deserialize_pin<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Pin {
        Number(u64),
        Text(String),
    }

    Ok(match Pin::deserialize(deserializer)? {
        Pin::Number(n) => n.to_string(),
        Pin::Text(s) => s,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_renewal_margin_secs")]
    pub renewal_margin_secs: u64,
    #[serde(default)]
    pub claims_unit: ClaimsUnit,
    #[serde(default = "default_true")]
    pub single_flight: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            renewal_margin_secs: default_renewal_margin_secs(),
            claims_unit: ClaimsUnit::default(),
            single_flight: true,
        }
    }
}

fn default_renewal_margin_secs() -> u64 {
    900
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortalSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for PortalSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    bluelink_portal::wire::DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl RelayConfig {
    /// Load and validate a config file; the format follows the extension
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("toml")
            .to_ascii_lowercase();

        let parsed = match extension.as_str() {
            "toml" => toml::from_str::<Self>(&content).map_err(|e| e.to_string()),
            "json" => serde_json::from_str::<Self>(&content).map_err(|e| e.to_string()),
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        let config = parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the daemon cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let account = &self.account;
        if account.username.trim().is_empty() {
            return Err(ConfigError::Invalid("account.username is empty".into()));
        }
        if account.password.is_empty() {
            return Err(ConfigError::Invalid("account.password is empty".into()));
        }
        if account.vin.trim().is_empty() {
            return Err(ConfigError::Invalid("account.vin is empty".into()));
        }
        if account.pin.is_empty() || !account.pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Invalid(
                "account.pin must contain only digits".into(),
            ));
        }

        if self.rate_limit.burst == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.burst must be at least 1".into(),
            ));
        }
        if !self.rate_limit.rate.is_finite() || self.rate_limit.rate < 0.0 {
            return Err(ConfigError::Invalid(
                "rate_limit.rate must be a non-negative number".into(),
            ));
        }

        if self.portal.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "portal.timeout_secs must be at least 1".into(),
            ));
        }
        if self.portal.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "portal.connect_timeout_secs must be at least 1".into(),
            ));
        }

        self.bind_addr()?;
        self.api_key_hash()?;
        Ok(())
    }

    /// Digest the relay compares incoming API keys against
    pub fn api_key_hash(&self) -> Result<ApiKeyHash, ConfigError> {
        match (&self.auth.api_key, &self.auth.api_key_sha256) {
            (Some(key), None) if !key.is_empty() => Ok(ApiKeyHash::from_plain(key)),
            (None, Some(digest)) => ApiKeyHash::from_hex(digest)
                .map_err(|e| ConfigError::Invalid(format!("auth.api_key_sha256: {}", e))),
            (Some(_), Some(_)) => Err(ConfigError::Invalid(
                "set only one of auth.api_key and auth.api_key_sha256".into(),
            )),
            _ => Err(ConfigError::Invalid(
                "auth.api_key or auth.api_key_sha256 is required".into(),
            )),
        }
    }

    fn bind_addr(&self) -> Result<IpAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(format!(
                    "server.bind '{}' is not an IP address",
                    self.server.bind
                ))
            })
    }

    /// Listen address, with an optional port override from the command line
    pub fn socket_addr(&self, port_override: Option<u16>) -> Result<SocketAddr, ConfigError> {
        let ip = self.bind_addr()?;
        Ok(SocketAddr::new(ip, port_override.unwrap_or(self.server.port)))
    }

    pub fn credentials(&self) -> Credentials {
        let a = &self.account;
        Credentials::new(
            a.username.clone(),
            a.password.clone(),
            a.pin.clone(),
            a.vin.clone(),
        )
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            renewal_margin: Duration::from_secs(self.session.renewal_margin_secs),
            single_flight: self.session.single_flight,
        }
    }

    pub fn portal_config(&self) -> PortalConfig {
        PortalConfig {
            base_url: self.portal.base_url.clone(),
            timeout: Duration::from_secs(self.portal.timeout_secs),
            connect_timeout: Duration::from_secs(self.portal.connect_timeout_secs),
            claims_unit: self.session.claims_unit,
        }
    }
}

/// Resolve the config path: the explicit one, or the first default file
/// found next to the executable
pub fn locate(explicit: Option<&str>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }

    let dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    locate_in(&dir)
}

fn locate_in(dir: &Path) -> Result<PathBuf, ConfigError> {
    let candidates: Vec<PathBuf> = DEFAULT_CONFIG_FILES.iter().map(|f| dir.join(f)).collect();
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| {
            let names: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
            ConfigError::NotFound(names.join(", "))
        })
}
