//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Venue WebSocket session (transport, auth, heartbeat, reconnect).
pub mod venue;

/// Client WebSocket gateway (protocol, fan-out, server).
pub mod gateway;

/// Per-client bounded queues for frame delivery.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
