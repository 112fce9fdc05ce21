//! Account credentials for the owners portal

use std::fmt;

/// Account credentials, loaded once at startup and never mutated
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Remote-command PIN (digits only)
    pub pin: String,
    /// VIN of the vehicle this relay controls
    pub vin: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        pin: impl Into<String>,
        vin: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            pin: pin.into(),
            vin: vin.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("pin", &"<redacted>")
            .field("vin", &self.vin)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::new("owner@example.com", "hunter2", "1234", "KMHTEST0000000001");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("owner@example.com"));
        assert!(debug.contains("KMHTEST0000000001"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("1234"));
    }
}
