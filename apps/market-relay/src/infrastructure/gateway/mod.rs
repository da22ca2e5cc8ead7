//! Downstream Gateway
//!
//! Client-facing side of the relay: the JSON protocol, per-client
//! subscription handling and fan-out, and the axum WebSocket server.

pub mod protocol;
pub mod server;
pub mod service;

pub use protocol::{ClientFrame, ProtocolError, ServerFrame, SubscribeResult, SubscribeStatus};
pub use server::{GatewayServer, GatewayServerError};
pub use service::{Gateway, GatewayStats};
