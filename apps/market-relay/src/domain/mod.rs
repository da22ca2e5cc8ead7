//! Domain Layer - Core market data types and subscription bookkeeping.
//!
//! This layer contains the core domain types for the relay with no I/O.
//! Everything here is plain data plus pure state transitions.

/// Market data types (symbols, ticks, bars) and session events.
pub mod streaming;

/// Client↔symbol subscription index.
pub mod subscription;
