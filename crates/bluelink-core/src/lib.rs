//! bluelink-core - Session lifecycle core for the bluelink relay
//!
//! This crate owns the authenticated session against the owners portal:
//! the [`SessionStore`] holding the single live session, the [`SessionGuard`]
//! deciding before each command whether that session is usable or must be
//! renewed, and the [`Portal`] trait that upstream clients implement.

pub mod clock;
pub mod error;
pub mod guard;
pub mod models;
pub mod portal;
pub mod session;
pub mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{PortalError, PortalResult};
pub use guard::{Freshness, GuardConfig, SessionGuard, SessionPhase};
pub use models::*;
pub use portal::{find_registration, LoginGrant, Portal};
pub use session::{Session, SessionStore};
