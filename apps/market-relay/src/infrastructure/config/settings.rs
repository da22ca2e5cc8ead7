//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.

use std::time::Duration;

use crate::infrastructure::venue::{
    Credentials, HeartbeatConfig, ReconnectConfig, SessionConfig, TransportConfig,
};

/// Venue connection settings.
#[derive(Debug, Clone)]
pub struct VenueSettings {
    /// WebSocket URL (`ws://` or `wss://`).
    pub url: String,
    /// API credentials.
    pub credentials: Credentials,
}

/// Upstream session timing settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Heartbeat frame interval.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout before considering the connection dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Time a connection must stay ready before backoff resets.
    pub reconnect_grace: Duration,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Tick silence after which a symbol is reported stale.
    pub stale_threshold: Duration,
    /// Bounded wait for snapshot responses.
    pub rpc_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let heartbeat = HeartbeatConfig::default();
        let reconnect = ReconnectConfig::default();
        Self {
            heartbeat_interval: heartbeat.ping_interval,
            heartbeat_timeout: heartbeat.pong_timeout,
            reconnect_delay_initial: reconnect.initial_delay,
            reconnect_delay_max: reconnect.max_delay,
            reconnect_grace: reconnect.grace_period,
            max_reconnect_attempts: reconnect.max_attempts,
            stale_threshold: Duration::from_secs(15),
            rpc_timeout: Duration::from_secs(10),
        }
    }
}

/// Server port and fan-out settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Client WebSocket gateway port.
    pub gateway_port: u16,
    /// Health check and metrics HTTP port.
    pub health_port: u16,
    /// Per-client outbound queue capacity.
    pub client_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            gateway_port: 8765,
            health_port: 8082,
            client_queue_capacity: 1024,
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Venue connection settings.
    pub venue: VenueSettings,
    /// Session timing settings.
    pub session: SessionSettings,
    /// Server settings.
    pub server: ServerSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, empty, or the
    /// venue URL is not a WebSocket URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`RelayConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = required(&lookup, "VENUE_URL")?;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue("VENUE_URL".to_string(), url));
        }
        let key = required(&lookup, "VENUE_KEY")?;
        let secret = required(&lookup, "VENUE_SECRET")?;
        let credentials = Credentials::new(key, secret)
            .map_err(|e| ConfigError::InvalidValue("VENUE_KEY".to_string(), e.to_string()))?;

        let defaults = SessionSettings::default();
        let session = SessionSettings {
            heartbeat_interval: parse_duration_secs(
                &lookup,
                "RELAY_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            heartbeat_timeout: parse_duration_secs(
                &lookup,
                "RELAY_HEARTBEAT_TIMEOUT_SECS",
                defaults.heartbeat_timeout,
            ),
            reconnect_delay_initial: parse_duration_millis(
                &lookup,
                "RELAY_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_duration_secs(
                &lookup,
                "RELAY_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_grace: parse_duration_secs(
                &lookup,
                "RELAY_RECONNECT_GRACE_SECS",
                defaults.reconnect_grace,
            ),
            max_reconnect_attempts: parse_or(
                &lookup,
                "RELAY_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            stale_threshold: parse_duration_secs(
                &lookup,
                "RELAY_STALE_THRESHOLD_SECS",
                defaults.stale_threshold,
            ),
            rpc_timeout: parse_duration_secs(
                &lookup,
                "RELAY_RPC_TIMEOUT_SECS",
                defaults.rpc_timeout,
            ),
        };

        let defaults = ServerSettings::default();
        let server = ServerSettings {
            gateway_port: parse_or(&lookup, "RELAY_GATEWAY_PORT", defaults.gateway_port),
            health_port: parse_or(&lookup, "RELAY_HEALTH_PORT", defaults.health_port),
            client_queue_capacity: parse_or(
                &lookup,
                "RELAY_CLIENT_QUEUE_CAPACITY",
                defaults.client_queue_capacity,
            )
            .max(1),
        };

        Ok(Self {
            venue: VenueSettings { url, credentials },
            session,
            server,
        })
    }

    /// Build the upstream session configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let mut transport =
            TransportConfig::new(self.venue.url.clone(), self.venue.credentials.clone());
        transport.heartbeat = HeartbeatConfig::new(
            self.session.heartbeat_interval,
            self.session.heartbeat_timeout,
        );

        let reconnect = ReconnectConfig {
            initial_delay: self.session.reconnect_delay_initial,
            max_delay: self.session.reconnect_delay_max,
            max_attempts: self.session.max_reconnect_attempts,
            grace_period: self.session.reconnect_grace,
            ..ReconnectConfig::default()
        };

        SessionConfig {
            transport,
            reconnect,
            stale_threshold: self.session.stale_threshold,
            rpc_timeout: self.session.rpc_timeout,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value.to_string())
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RelayConfig::from_lookup(|key| env.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("VENUE_URL", "wss://venue.example:443/stream"),
        ("VENUE_KEY", "key123"),
        ("VENUE_SECRET", "secret456"),
    ];

    #[test]
    fn defaults_apply_when_only_required_vars_set() {
        let config = load(&REQUIRED).unwrap();

        assert_eq!(config.venue.url, "wss://venue.example:443/stream");
        assert_eq!(config.venue.credentials.key(), "key123");
        assert_eq!(config.session, SessionSettings::default());
        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.session.heartbeat_timeout, Duration::from_secs(20));
        assert_eq!(config.server, ServerSettings::default());
        assert_eq!(config.server.gateway_port, 8765);
        assert_eq!(config.server.health_port, 8082);
    }

    #[test]
    fn missing_url_is_reported() {
        let err = load(&REQUIRED[1..]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "VENUE_URL"));
    }

    #[test]
    fn empty_secret_is_reported() {
        let err = load(&[REQUIRED[0], REQUIRED[1], ("VENUE_SECRET", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(ref key) if key == "VENUE_SECRET"));
    }

    #[test]
    fn non_websocket_url_is_rejected() {
        let err = load(&[
            ("VENUE_URL", "https://venue.example"),
            REQUIRED[1],
            REQUIRED[2],
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref key, _) if key == "VENUE_URL"));
    }

    #[test]
    fn overrides_and_bad_values() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("RELAY_HEARTBEAT_INTERVAL_SECS", "5"),
            ("RELAY_RECONNECT_DELAY_INITIAL_MS", "250"),
            ("RELAY_MAX_RECONNECT_ATTEMPTS", "3"),
            ("RELAY_GATEWAY_PORT", "not-a-port"),
            ("RELAY_CLIENT_QUEUE_CAPACITY", "0"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(
            config.session.reconnect_delay_initial,
            Duration::from_millis(250)
        );
        assert_eq!(config.session.max_reconnect_attempts, 3);
        assert_eq!(config.server.gateway_port, 8765);
        assert_eq!(config.server.client_queue_capacity, 1);
    }

    #[test]
    fn session_config_carries_settings() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("RELAY_HEARTBEAT_TIMEOUT_SECS", "40"),
            ("RELAY_RECONNECT_GRACE_SECS", "60"),
            ("RELAY_RPC_TIMEOUT_SECS", "3"),
        ]);
        let session = load(&vars).unwrap().session_config();

        assert_eq!(session.transport.url, "wss://venue.example:443/stream");
        assert_eq!(
            session.transport.heartbeat.pong_timeout,
            Duration::from_secs(40)
        );
        assert_eq!(session.reconnect.grace_period, Duration::from_secs(60));
        assert_eq!(session.rpc_timeout, Duration::from_secs(3));
        assert_eq!(session.stale_threshold, Duration::from_secs(15));
    }

    #[test]
    fn credentials_secret_redacted_in_debug() {
        let config = load(&REQUIRED).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret456"));
        assert!(debug.contains("[REDACTED]"));
    }
}
