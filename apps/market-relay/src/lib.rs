#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Relay - Venue Tick Multiplexer
//!
//! A relay that keeps one authenticated WebSocket session to a trading
//! venue and fans ticks and closed bars out to many WebSocket clients,
//! each holding its own symbol subscriptions. A symbol is subscribed
//! upstream only while at least one client wants it.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `streaming`: Ticks, bars, session state and events
//!   - `subscription`: Client↔symbol index
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: The upstream session contract
//!   - `services`: Subscription registry, staleness monitor, today cache
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `venue`: Transport, handshake, heartbeat, reconnection, session
//!   - `gateway`: Client protocol, fan-out, axum WebSocket server
//!   - `broadcast`: Bounded per-client queues
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                 ┌──────────────┐  SessionEvent  ┌─────────────┐
//! Venue WS ◄─────►│   Upstream   │───────────────►│   Gateway   │──► Client 1
//!                 │   Session    │◄───────────────│ + Registry  │──► Client 2
//!                 └──────────────┘ subscribe/snap └─────────────┘──► Client N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{
    Bar, ConnectionStatus, Quote, SessionEvent, SessionInfo, SessionState, StatusUpdate, Symbol,
    SymbolInfo, SymbolSnapshot, Tick,
};
pub use domain::subscription::{ClientId, SubscriptionStats};

// Application
pub use application::ports::{SessionError, UpstreamPort};
pub use application::services::SubscriptionRegistry;

// Infrastructure config
pub use infrastructure::config::{ConfigError, RelayConfig};

// Venue session
pub use infrastructure::venue::{Credentials, SessionConfig, UpstreamSession};

// Gateway
pub use infrastructure::broadcast::ClientHub;
pub use infrastructure::gateway::{Gateway, GatewayServer, GatewayServerError};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
