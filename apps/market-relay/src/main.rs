//! Market Relay Binary
//!
//! Starts the venue session, the client gateway, and the health server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `VENUE_URL`: Venue WebSocket URL
//! - `VENUE_KEY`: Venue API key
//! - `VENUE_SECRET`: Venue API secret
//!
//! ## Optional
//! - `RELAY_GATEWAY_PORT`: Client WebSocket port (default: 8765)
//! - `RELAY_HEALTH_PORT`: Health check and metrics port (default: 8082)
//! - `RELAY_HEARTBEAT_INTERVAL_SECS`, `RELAY_HEARTBEAT_TIMEOUT_SECS`
//! - `RELAY_RECONNECT_DELAY_INITIAL_MS`, `RELAY_RECONNECT_DELAY_MAX_SECS`,
//!   `RELAY_RECONNECT_GRACE_SECS`, `RELAY_MAX_RECONNECT_ATTEMPTS`
//! - `RELAY_STALE_THRESHOLD_SECS`, `RELAY_RPC_TIMEOUT_SECS`
//! - `RELAY_CLIENT_QUEUE_CAPACITY`: Per-client queue size (default: 1024)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `RUST_LOG`: Log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use market_relay::application::ports::UpstreamPort;
use market_relay::domain::streaming::SessionEvent;
use market_relay::infrastructure::broadcast::ClientHub;
use market_relay::infrastructure::gateway::{Gateway, GatewayServer};
use market_relay::infrastructure::health::{HealthServer, HealthServerState};
use market_relay::infrastructure::telemetry;
use market_relay::infrastructure::venue::UpstreamSession;
use market_relay::{RelayConfig, init_metrics};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the session → gateway event channel.
const SESSION_EVENT_CAPACITY: usize = 4096;

/// Bound on waiting for the servers to drain after shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    #[allow(clippy::expect_used)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP)
    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting market relay");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = RelayConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Upstream session
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(SESSION_EVENT_CAPACITY);
    let session = Arc::new(UpstreamSession::new(
        config.session_config(),
        event_tx,
        shutdown_token.child_token(),
    ));

    // Gateway and dispatcher
    let hub = Arc::new(ClientHub::new(config.server.client_queue_capacity));
    let upstream: Arc<dyn UpstreamPort> = session.clone();
    let gateway = Arc::new(Gateway::new(Arc::clone(&upstream), hub));
    let dispatcher = tokio::spawn(
        Arc::clone(&gateway).run_dispatcher(event_rx, shutdown_token.clone()),
    );

    session.start();

    // Client WebSocket server
    let gateway_server = GatewayServer::new(
        config.server.gateway_port,
        Arc::clone(&gateway),
        shutdown_token.clone(),
    );
    let gateway_task = tokio::spawn(async move {
        if let Err(e) = gateway_server.run().await {
            tracing::error!(error = %e, "Gateway server error");
        }
    });

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        upstream,
        Arc::clone(&gateway),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Market relay ready");

    await_shutdown(shutdown_token).await;
    session.stop();

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = tokio::join!(gateway_task, health_task, dispatcher);
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out, exiting"
        );
    }

    tracing::info!("Market relay stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        venue_url = %config.venue.url,
        gateway_port = config.server.gateway_port,
        health_port = config.server.health_port,
        client_queue_capacity = config.server.client_queue_capacity,
        "Configuration loaded"
    );
    tracing::debug!(
        heartbeat_interval_secs = config.session.heartbeat_interval.as_secs(),
        heartbeat_timeout_secs = config.session.heartbeat_timeout.as_secs(),
        stale_threshold_secs = config.session.stale_threshold.as_secs(),
        max_reconnect_attempts = config.session.max_reconnect_attempts,
        "Session settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
    tracing::info!("Graceful shutdown started");
}
