//! Owners portal client
//!
//! Implements [`bluelink_core::Portal`] against the browser-oriented owners
//! portal: the bootstrap token / CSRF / credential login handshake, the
//! owner-info lookup that maps a VIN to a registration id, and the remote
//! action service used for vehicle commands.
//!
//! # Example
//!
//! ```rust,no_run
//! use bluelink_core::{Credentials, Portal};
//! use bluelink_portal::PortalClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = PortalClient::new("https://owners.hyundaiusa.com")?;
//!     let creds = Credentials::new("owner@example.com", "password", "1234", "KMHL14JA5PA000001");
//!
//!     let bootstrap = client.fetch_portal_token().await?;
//!     client.validate_csrf(&bootstrap).await?;
//!     let grant = client.login(&creds, &bootstrap).await?;
//!     let reg_id = client.resolve_registration(&creds, &grant.token, &creds.vin).await?;
//!     println!("registration id: {}", reg_id);
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module serves a fake portal over HTTP so the client can be
//! exercised end to end:
//!
//! ```rust,ignore
//! use bluelink_portal::testing::FakePortalServer;
//!
//! let server = FakePortalServer::start().await?;
//! let client = PortalClient::new(&server.base_url())?;
//! ```

pub mod claims;
mod client;
mod error;
pub mod testing;
mod types;
pub mod wire;

pub use claims::{decode_expiry, ClaimsError, ClaimsUnit};
pub use client::{PortalClient, PortalConfig};
pub use error::ClientError;
