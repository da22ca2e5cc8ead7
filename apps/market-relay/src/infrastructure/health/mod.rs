//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, upstream session reporting, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (venue session ready)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::UpstreamPort;
use crate::domain::streaming::{SessionInfo, SessionState};
use crate::infrastructure::gateway::{Gateway, GatewayStats};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Venue session status.
    pub session: SessionStatus,
    /// Connected client information.
    pub clients: ClientStatus,
    /// Subscription statistics.
    pub subscriptions: SubscriptionStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Venue session ready.
    Healthy,
    /// Venue session down but still retrying.
    Degraded,
    /// Venue session has given up.
    Unhealthy,
}

/// Venue session status.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Transport state.
    pub state: &'static str,
    /// Whether frames can be exchanged with the venue.
    pub ready: bool,
    /// Authenticated account.
    pub account: Option<String>,
    /// Time of the last inbound frame.
    pub last_activity: Option<DateTime<Utc>>,
    /// Consecutive reconnect attempts.
    pub reconnect_attempts: u32,
    /// Milliseconds until the next reconnect attempt.
    pub next_retry_ms: Option<u64>,
    /// Reason the session gave up, if it has.
    pub fatal_error: Option<String>,
}

/// Connected client information.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    /// Connected WebSocket clients.
    pub total: usize,
    /// Frames dropped on full client queues since start.
    pub frames_dropped: u64,
}

/// Subscription statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatus {
    /// Symbols held upstream.
    pub symbols: usize,
    /// Total client subscriptions.
    pub total: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    upstream: Arc<dyn UpstreamPort>,
    gateway: Arc<Gateway>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, upstream: Arc<dyn UpstreamPort>, gateway: Arc<Gateway>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            upstream,
            gateway,
        }
    }

    fn snapshot(&self) -> HealthResponse {
        build_health_response(
            &self.version,
            self.started_at.elapsed().as_secs(),
            &self.upstream.session_info(),
            &self.gateway.stats(),
        )
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError::ServerFailed` if the HTTP server stops
    /// with an error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "Health server listening");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = state.snapshot();
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.upstream.session_info().state == SessionState::Ready {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(
    version: &str,
    uptime_secs: u64,
    info: &SessionInfo,
    stats: &GatewayStats,
) -> HealthResponse {
    HealthResponse {
        status: determine_health_status(info),
        version: version.to_string(),
        uptime_secs,
        current_time: Utc::now(),
        session: SessionStatus {
            state: info.state.as_str(),
            ready: info.state == SessionState::Ready,
            account: info.account.clone(),
            last_activity: info.last_activity,
            reconnect_attempts: info.reconnect_attempts,
            next_retry_ms: info
                .next_retry_in
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            fatal_error: info.fatal_error.clone(),
        },
        clients: ClientStatus {
            total: stats.clients,
            frames_dropped: stats.frames_dropped,
        },
        subscriptions: SubscriptionStatus {
            symbols: stats.subscriptions.symbol_count,
            total: stats.subscriptions.subscription_count,
        },
    }
}

const fn determine_health_status(info: &SessionInfo) -> HealthStatus {
    if info.fatal_error.is_some() {
        HealthStatus::Unhealthy
    } else if matches!(info.state, SessionState::Ready) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
