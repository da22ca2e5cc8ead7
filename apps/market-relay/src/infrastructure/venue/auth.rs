//! Venue WebSocket Authentication
//!
//! Handles the venue handshake. After the socket opens the client has a
//! bounded window to authenticate and fetch the symbol list; only then is
//! the session usable.
//!
//! # Authentication Flow
//!
//! 1. Connect to the WebSocket endpoint
//! 2. Send `{"type":"auth","key":"...","secret":"..."}`
//! 3. Receive `{"type":"authenticated","account":"..."}` or an error
//! 4. Send `{"type":"symbolsRequest","requestId":"..."}`
//! 5. Receive `{"type":"symbols",...}` with the same request id
//!
//! # Error Codes
//!
//! - 401: Not authenticated
//! - 402: Invalid credentials
//! - 403: Account not permitted
//!
//! These are credential rejections and are never retried. Any other
//! error code during the handshake is treated as a server-side failure.

use std::time::Duration;

use thiserror::Error;

use super::messages::VenueRequest;

// =============================================================================
// Constants
// =============================================================================

/// Default time allowed for the whole handshake.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authentication.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The venue reports the connection as unauthenticated.
    #[error("not authenticated: credentials were not accepted")]
    NotAuthenticated,

    /// Invalid API key or secret.
    #[error("authentication failed: invalid API key or secret")]
    InvalidCredentials,

    /// Credentials valid but the account may not stream.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Invalid credential configuration.
    #[error("invalid credentials: {0}")]
    InvalidMessage(String),

    /// Other error reported by the venue during the handshake.
    #[error("server error ({code}): {message}")]
    ServerError {
        /// Error code from the venue
        code: u16,
        /// Error message from the venue
        message: String,
    },
}

impl AuthError {
    /// Map a venue error frame received during the handshake.
    #[must_use]
    pub fn from_code(code: u16, message: &str) -> Self {
        match code {
            401 => Self::NotAuthenticated,
            402 => Self::InvalidCredentials,
            403 => Self::Forbidden(message.to_string()),
            code => Self::ServerError {
                code,
                message: message.to_string(),
            },
        }
    }

    /// Whether retrying with the same credentials is pointless.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::ServerError { .. })
    }
}

// =============================================================================
// Authentication State
// =============================================================================

/// Current state of authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Nothing sent yet.
    #[default]
    Idle,

    /// Auth request sent, awaiting response.
    Authenticating,

    /// Credentials accepted, symbol list requested.
    AwaitingSymbols,

    /// Handshake complete.
    Authenticated,

    /// Authentication failed.
    Failed,
}

impl AuthState {
    /// Check if the handshake is complete.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Venue API credentials.
///
/// The `Debug` implementation redacts the secret for safe logging.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    key: String,
    secret: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if either key or secret is empty.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Result<Self, AuthError> {
        let key = key.into();
        let secret = secret.into();

        if key.is_empty() {
            return Err(AuthError::InvalidMessage(
                "API key cannot be empty".to_string(),
            ));
        }
        if secret.is_empty() {
            return Err(AuthError::InvalidMessage(
                "API secret cannot be empty".to_string(),
            ));
        }

        Ok(Self { key, secret })
    }

    /// Get the API key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the API secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Authentication Handler
// =============================================================================

/// Drives the handshake state machine for one connection.
#[derive(Debug)]
pub struct AuthHandler {
    credentials: Credentials,
    state: AuthState,
    account: Option<String>,
    symbols_request_id: Option<String>,
}

impl AuthHandler {
    /// Create a handler for a fresh connection.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: AuthState::Idle,
            account: None,
            symbols_request_id: None,
        }
    }

    /// Get the current authentication state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Account accepted by the venue.
    #[must_use]
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Build the auth frame and move to `Authenticating`.
    #[must_use]
    pub fn create_auth_request(&mut self) -> VenueRequest {
        self.state = AuthState::Authenticating;
        VenueRequest::Auth {
            key: self.credentials.key.clone(),
            secret: self.credentials.secret.clone(),
        }
    }

    /// Record the accepted account and build the symbol-list request.
    ///
    /// Returns `None` if no auth request is outstanding.
    pub fn on_authenticated(&mut self, account: &str) -> Option<VenueRequest> {
        if self.state != AuthState::Authenticating {
            return None;
        }
        let request_id = uuid::Uuid::new_v4().to_string();
        self.account = Some(account.to_string());
        self.symbols_request_id = Some(request_id.clone());
        self.state = AuthState::AwaitingSymbols;
        Some(VenueRequest::SymbolsRequest { request_id })
    }

    /// Whether a `symbols` response with `request_id` completes the handshake.
    ///
    /// Completes the handshake when it does.
    pub fn on_symbols(&mut self, request_id: &str) -> bool {
        let matches = self.state == AuthState::AwaitingSymbols
            && self.symbols_request_id.as_deref() == Some(request_id);
        if matches {
            self.state = AuthState::Authenticated;
        }
        matches
    }

    /// Process an error frame received during the handshake.
    pub fn on_error(&mut self, code: u16, message: &str) -> AuthError {
        self.state = AuthState::Failed;
        AuthError::from_code(code, message)
    }
}
