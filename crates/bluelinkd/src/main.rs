//! bluelinkd - bluelink relay daemon
//!
//! Authenticated HTTP front for a single vehicle on the owners portal.
//!
//! Usage:
//!   bluelinkd [OPTIONS] [config.toml|config.json]
//!
//! Without a config path, `config.toml` or `config.json` next to the
//! executable is used.

use std::sync::Arc;

use anyhow::Context;
use bluelink_api::{create_router, AppState, RateLimiter};
use bluelink_core::{Portal, SessionGuard, SessionStore};
use bluelink_portal::PortalClient;
use bluelinkd::config::{self, RelayConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str =
    "bluelinkd=info,bluelink_api=info,bluelink_portal=info,bluelink_core=info";

/// Parsed command-line arguments
struct Args {
    /// Config file (TOML or JSON)
    config_path: Option<String>,
    /// Overrides `server.port`
    port: Option<u16>,
    log_json: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut result = Args {
        config_path: None,
        port: None,
        log_json: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    result.port = Some(
                        args[i + 1]
                            .parse()
                            .with_context(|| format!("Invalid port: {}", args[i + 1]))?,
                    );
                    i += 2;
                } else {
                    anyhow::bail!("Missing argument for --port");
                }
            }
            "--log-json" => {
                result.log_json = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                result.config_path = Some(arg.to_string());
                i += 1;
            }
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    Ok(result)
}

fn print_help() {
    eprintln!(
        r#"bluelinkd - bluelink relay daemon

Usage: bluelinkd [OPTIONS] [config.toml|config.json]

Options:
  -p, --port <PORT>   Listen port (overrides server.port)
      --log-json      Emit logs as JSON lines
  -h, --help          Print this help message

Without a config path, config.toml or config.json next to the
executable is used. RUST_LOG overrides the default log filter.
"#
    );
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    init_tracing(args.log_json);

    tracing::info!("Starting bluelinkd");

    let path = config::locate(args.config_path.as_deref())?;
    tracing::info!("Loading config from: {}", path.display());
    let config = RelayConfig::load(&path)?;
    tracing::info!(
        rate = config.rate_limit.rate,
        burst = config.rate_limit.burst,
        renewal_margin_secs = config.session.renewal_margin_secs,
        single_flight = config.session.single_flight,
        portal = %config.portal.base_url,
        "Config loaded"
    );

    let client = PortalClient::with_config(config.portal_config())
        .context("Failed to create portal client")?;
    let portal: Arc<dyn Portal> = Arc::new(client);

    let guard = Arc::new(SessionGuard::new(
        portal.clone(),
        Arc::new(SessionStore::new()),
        config.credentials(),
        config.guard_config(),
    ));

    let session = guard.login().await.context("Initial login failed")?;
    tracing::info!(
        registration_id = %session.registration_id,
        expires_at = session.expires_at,
        "Logged in to owners portal"
    );

    let state = AppState::new(
        guard,
        portal,
        RateLimiter::new(config.rate_limit.rate, config.rate_limit.burst),
        config.api_key_hash()?,
    );
    let app = create_router(state);

    let addr = config.socket_addr(args.port)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("bluelinkd stopped");
    Ok(())
}
