//! Venue WebSocket Adapter
//!
//! The single upstream connection to the trading venue:
//!
//! - [`transport`]: one connection's state machine, handshake, and heartbeat
//! - [`session`]: reconnects, symbol directory, snapshot RPCs, staleness,
//!   and translation into [`SessionEvent`](crate::domain::streaming::SessionEvent)s
//! - [`messages`] / [`codec`]: the venue's JSON wire format

pub mod auth;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod session;
pub mod transport;

pub use auth::{AUTH_TIMEOUT, AuthError, AuthHandler, AuthState, Credentials};
pub use codec::{CodecError, JsonCodec};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use messages::{SymbolId, VenueBar, VenueMessage, VenueRequest, VenueSymbol};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use session::{SessionConfig, UpstreamSession};
pub use transport::{TransportConfig, TransportError, TransportEvent, TransportSession};
