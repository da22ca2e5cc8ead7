//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (upstream venue session).
pub mod ports;

/// Application services for subscriptions, staleness, and the bar cache.
pub mod services;
