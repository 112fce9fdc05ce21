//! bluelinkd - bluelink relay daemon
//!
//! The binary lives in `main.rs`; this library half exposes the
//! configuration loader so it can be tested and reused.

pub mod config;

pub use config::{ConfigError, RelayConfig};
