//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`UpstreamPort`]: the single venue session the registry and the
//!   gateway drive. Implemented by
//!   [`UpstreamSession`](crate::infrastructure::venue::UpstreamSession).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::streaming::{SessionInfo, StatusUpdate, Symbol, SymbolSnapshot};

// =============================================================================
// Errors
// =============================================================================

/// Errors returned to callers of upstream request operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The session is not `Ready`.
    #[error("upstream session is not connected")]
    NotConnected,

    /// The venue did not answer within the bounded wait.
    #[error("upstream request timed out after {0:?}")]
    UpstreamTimeout(Duration),

    /// The symbol is not in the venue's available-symbol list.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(Symbol),

    /// The venue answered the request with an error.
    #[error("snapshot request failed ({code}): {message}")]
    SnapshotFailed {
        /// Venue error code.
        code: u16,
        /// Venue error message.
        message: String,
    },
}

// =============================================================================
// Upstream Port
// =============================================================================

/// The relay's view of the upstream venue session.
///
/// Subscribe/unsubscribe are fire-and-forget and idempotent; they must not
/// block, since the registry calls them inside its critical section.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamPort: Send + Sync {
    /// Ensure `symbol` is subscribed upstream.
    fn subscribe_upstream(&self, symbol: &str);

    /// Ensure `symbol` is no longer subscribed upstream.
    fn unsubscribe_upstream(&self, symbol: &str);

    /// Fetch today's bars, the current quote, and the precision for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when the session is not ready,
    /// `UnknownSymbol` when the venue does not list the symbol, and
    /// `UpstreamTimeout` when the venue does not answer in time.
    async fn request_snapshot(&self, symbol: &str) -> Result<SymbolSnapshot, SessionError>;

    /// Symbols the venue makes available, sorted.
    fn available_symbols(&self) -> Vec<Symbol>;

    /// Whether `symbol` is in the available-symbol list.
    fn is_available(&self, symbol: &str) -> bool {
        self.available_symbols().iter().any(|s| s == symbol)
    }

    /// The status a newly connected client should see.
    fn current_status(&self) -> StatusUpdate;

    /// Observable session state.
    fn session_info(&self) -> SessionInfo;
}
